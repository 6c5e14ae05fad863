//! Role Entry Points
//!
//! Static table deciding where each role enters the cascade and what it sees
//! at levels it holds no grant for. Adding a role means adding a table row;
//! the resolver's transition logic never branches on roles.
//!
//! ```text
//! admin, back-office,
//! contract-line-owner, channel-owner ──► Channel ──► ContractLine ──► ...
//! agent ─────────────────────────────────────────► ContractLine ──► ...
//!                                   (union of lines across granted channels)
//! guest ──► nothing (inert cascade)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{EntityCatalog, EntityId, EntityRef, Level};
use crate::config::CascadeConfig;
use crate::error::{CascadeError, ConfigError};
use crate::scope::{AuthorizationGrant, AuthorizationScope, Role, Scope, UngrantedScope, UserContext};

/// Levels a role may enter the cascade at
const ENTRY_LEVELS: [Level; 2] = [Level::Channel, Level::ContractLine];

/// Configuration row for one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub entry: Level,
    #[serde(default)]
    pub ungranted: UngrantedScope,
}

impl RoleProfile {
    pub fn new(entry: Level, ungranted: UngrantedScope) -> Self {
        Self { entry, ungranted }
    }
}

/// Role → profile mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTable {
    roles: BTreeMap<Role, RoleProfile>,
}

impl RoleTable {
    /// Role table of the embedded default configuration
    pub fn builtin() -> Result<Self, ConfigError> {
        CascadeConfig::embedded().map(|config| config.roles)
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = (Role, RoleProfile)>) -> Self {
        Self {
            roles: profiles.into_iter().collect(),
        }
    }

    pub fn get(&self, role: Role) -> Option<&RoleProfile> {
        self.roles.get(&role)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Check the table is exhaustive and every entry level is enterable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<String> = Role::ALL
            .into_iter()
            .filter(|role| !self.roles.contains_key(role))
            .map(|role| role.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingRoles { roles: missing });
        }

        for (role, profile) in &self.roles {
            if !ENTRY_LEVELS.contains(&profile.entry) {
                return Err(ConfigError::InvalidEntryLevel {
                    role: role.to_string(),
                    level: profile.entry,
                });
            }
        }
        Ok(())
    }
}

/// Decides where a role enters the cascade and what it is offered first
#[derive(Debug, Clone)]
pub struct RoleEntryPointStrategy {
    table: RoleTable,
}

impl RoleEntryPointStrategy {
    /// Wrap a role table; partial tables are accepted and report
    /// `UnmappedRole` for the missing roles at lookup time
    pub fn new(table: RoleTable) -> Self {
        Self { table }
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        RoleTable::builtin().map(Self::new)
    }

    pub fn table(&self) -> &RoleTable {
        &self.table
    }

    pub fn profile(&self, role: Role) -> Result<&RoleProfile, CascadeError> {
        self.table
            .get(role)
            .ok_or_else(|| CascadeError::UnmappedRole {
                role: role.to_string(),
            })
    }

    pub fn entry_level(&self, role: Role) -> Result<Level, CascadeError> {
        Ok(self.profile(role)?.entry)
    }

    /// Build the acting user's authorization from their role profile
    pub fn authorize(
        &self,
        user: UserContext,
        grants: impl IntoIterator<Item = AuthorizationGrant>,
    ) -> Result<AuthorizationScope, CascadeError> {
        let profile = self.profile(user.role)?;
        Ok(AuthorizationScope::new(user, profile.ungranted, grants))
    }

    /// Channels whose contract lines must be in the catalog before seeding
    pub fn channels_to_expand(
        &self,
        authorization: &AuthorizationScope,
        catalog: &EntityCatalog,
    ) -> Result<Vec<EntityId>, CascadeError> {
        let entry = self.entry_level(authorization.role())?;

        if authorization.has_grants_at(Level::Channel)
            && (entry == Level::ContractLine || authorization.aggregates_contract_lines())
        {
            return Ok(authorization
                .granted_ids(Level::Channel)
                .iter()
                .filter(|id| catalog.contains(Level::Channel, id))
                .cloned()
                .collect());
        }

        if entry == Level::ContractLine
            && !authorization
                .scope_for(Level::ContractLine, catalog)
                .is_empty()
        {
            return Ok(catalog
                .all(Level::Channel)
                .into_iter()
                .map(|channel| channel.id)
                .collect());
        }

        Ok(Vec::new())
    }

    /// Options offered at the role's entry level
    pub fn initial_options(
        &self,
        authorization: &AuthorizationScope,
        catalog: &EntityCatalog,
    ) -> Result<Vec<EntityRef>, CascadeError> {
        let entry = self.entry_level(authorization.role())?;
        Ok(seed_options(entry, authorization, catalog))
    }
}

/// Entry-level option set; ordering follows the scope when it is explicit
/// at ContractLine (first-seen across channels), the catalog otherwise
pub(crate) fn seed_options(
    entry: Level,
    authorization: &AuthorizationScope,
    catalog: &EntityCatalog,
) -> Vec<EntityRef> {
    let scope = authorization.scope_for(entry, catalog);
    match (entry, scope) {
        (Level::ContractLine, Scope::Only(ids)) => ids
            .iter()
            .filter_map(|id| catalog.get(Level::ContractLine, id).cloned())
            .collect(),
        (level, scope) if ENTRY_LEVELS.contains(&level) => scope.restrict(catalog.all(level)),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> EntityCatalog {
        let mut catalog = EntityCatalog::new();
        catalog.record_channels([
            EntityRef::new("A", "Channel A"),
            EntityRef::new("B", "Channel B"),
        ]);
        catalog
            .record_children(
                Level::Channel,
                &"A".into(),
                [EntityRef::new("1", "Line 1"), EntityRef::new("2", "Line 2")],
            )
            .unwrap();
        catalog
            .record_children(
                Level::Channel,
                &"B".into(),
                [EntityRef::new("2", "Line 2"), EntityRef::new("3", "Line 3")],
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_builtin_table_is_exhaustive() {
        assert!(RoleTable::builtin().unwrap().validate().is_ok());
    }

    #[test]
    fn test_missing_roles_are_listed() {
        let table = RoleTable::from_profiles([(
            Role::Admin,
            RoleProfile::new(Level::Channel, UngrantedScope::All),
        )]);
        let Err(ConfigError::MissingRoles { roles }) = table.validate() else {
            panic!("expected missing roles");
        };
        assert_eq!(roles.len(), Role::ALL.len() - 1);
        assert!(roles.contains(&"agent".to_string()));
    }

    #[test]
    fn test_deep_entry_level_rejected() {
        let mut profiles: Vec<(Role, RoleProfile)> = Role::ALL
            .into_iter()
            .map(|r| (r, RoleProfile::new(Level::Channel, UngrantedScope::All)))
            .collect();
        profiles.push((
            Role::Agent,
            RoleProfile::new(Level::Service, UngrantedScope::All),
        ));
        let table = RoleTable::from_profiles(profiles);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidEntryLevel { level: Level::Service, .. })
        ));
    }

    #[test]
    fn test_unmapped_role_is_an_error_not_an_empty_set() {
        let strategy = RoleEntryPointStrategy::new(RoleTable::from_profiles([(
            Role::Admin,
            RoleProfile::new(Level::Channel, UngrantedScope::All),
        )]));
        assert!(matches!(
            strategy.entry_level(Role::Agent),
            Err(CascadeError::UnmappedRole { role }) if role == "agent"
        ));

        let result = strategy.authorize(UserContext::new("u-1", Role::Agent), []);
        assert!(matches!(result, Err(CascadeError::UnmappedRole { .. })));
    }

    #[test]
    fn test_guest_is_mapped_but_inert() {
        let strategy = RoleEntryPointStrategy::builtin().unwrap();
        let authorization = strategy
            .authorize(UserContext::new("anon", Role::Guest), [])
            .unwrap();
        let options = strategy.initial_options(&authorization, &catalog()).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn test_agent_aggregates_lines_across_channels() {
        let strategy = RoleEntryPointStrategy::builtin().unwrap();
        let authorization = strategy
            .authorize(
                UserContext::new("u-7", Role::Agent),
                [
                    AuthorizationGrant::for_user("u-7", Level::Channel, "A"),
                    AuthorizationGrant::for_user("u-7", Level::Channel, "B"),
                ],
            )
            .unwrap();
        let catalog = catalog();

        let expand = strategy.channels_to_expand(&authorization, &catalog).unwrap();
        assert_eq!(expand, vec![EntityId::from("A"), EntityId::from("B")]);

        let options = strategy.initial_options(&authorization, &catalog).unwrap();
        let ids: Vec<&str> = options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_channel_owner_sees_granted_channels_only() {
        let strategy = RoleEntryPointStrategy::builtin().unwrap();
        let authorization = strategy
            .authorize(
                UserContext::new("u-1", Role::ChannelOwner),
                [AuthorizationGrant::for_user("u-1", Level::Channel, "B")],
            )
            .unwrap();
        let options = strategy.initial_options(&authorization, &catalog()).unwrap();
        assert_eq!(options, vec![EntityRef::new("B", "Channel B")]);
    }

    #[test]
    fn test_admin_needs_no_channel_expansion() {
        let strategy = RoleEntryPointStrategy::builtin().unwrap();
        let authorization = strategy
            .authorize(UserContext::new("root", Role::Admin), [])
            .unwrap();
        assert!(strategy
            .channels_to_expand(&authorization, &catalog())
            .unwrap()
            .is_empty());
    }
}
