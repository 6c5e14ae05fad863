//! Authorization Scope
//!
//! Computes, per level, which catalog entities the acting user may see.
//!
//! A user's scope at a level is:
//! 1. the ids of the grants addressed to the user (or their role) at that level, or
//! 2. for ContractLine, when grants exist only at Channel level, the union of
//!    the contract lines authorized by every granted channel (first-seen order,
//!    duplicates collapsed), or
//! 3. the role's ungranted default: everything or nothing.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{EntityCatalog, EntityId, EntityRef, Level};
use crate::error::CascadeError;

// =============================================================================
// ROLES & PRINCIPALS
// =============================================================================

/// Roles known to the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    BackOffice,
    ContractLineOwner,
    ChannelOwner,
    /// Works across several channels at once
    Agent,
    Guest,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::BackOffice,
        Role::ContractLineOwner,
        Role::ChannelOwner,
        Role::Agent,
        Role::Guest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::BackOffice => "back-office",
            Role::ContractLineOwner => "contract-line-owner",
            Role::ChannelOwner => "channel-owner",
            Role::Agent => "agent",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CascadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| CascadeError::UnmappedRole {
                role: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The acting user of a cascade session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: UserId,
    pub role: Role,
}

impl UserContext {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Who a grant is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    Role(Role),
    User(UserId),
}

/// A (principal, level, entity) authorization tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    pub principal: Principal,
    pub level: Level,
    pub entity_id: EntityId,
}

impl AuthorizationGrant {
    pub fn for_user(
        user_id: impl Into<UserId>,
        level: Level,
        entity_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            principal: Principal::User(user_id.into()),
            level,
            entity_id: entity_id.into(),
        }
    }

    pub fn for_role(role: Role, level: Level, entity_id: impl Into<EntityId>) -> Self {
        Self {
            principal: Principal::Role(role),
            level,
            entity_id: entity_id.into(),
        }
    }

    pub fn applies_to(&self, user: &UserContext) -> bool {
        match &self.principal {
            Principal::Role(role) => *role == user.role,
            Principal::User(id) => *id == user.user_id,
        }
    }
}

// =============================================================================
// SCOPES
// =============================================================================

/// Scope applied at levels where the user holds no explicit grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UngrantedScope {
    /// Admin-equivalent: every entity of the level
    #[default]
    All,
    /// Unauthorized: nothing at this level
    #[serde(rename = "none")]
    Nothing,
}

/// Ordered, duplicate-free set of entity ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedIds {
    order: Vec<EntityId>,
    members: HashSet<EntityId>,
}

impl ScopedIds {
    /// Insert an id; returns false if it was already present
    pub fn insert(&mut self, id: EntityId) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.members.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<EntityId> for ScopedIds {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut ids = ScopedIds::default();
        for id in iter {
            ids.insert(id);
        }
        ids
    }
}

/// What a user may see at one level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Only(ScopedIds),
}

impl Scope {
    pub fn none() -> Self {
        Scope::Only(ScopedIds::default())
    }

    pub fn permits(&self, id: &EntityId) -> bool {
        match self {
            Scope::All => true,
            Scope::Only(ids) => ids.contains(id),
        }
    }

    /// Keep the candidates this scope permits, in candidate order
    pub fn restrict(&self, candidates: Vec<EntityRef>) -> Vec<EntityRef> {
        match self {
            Scope::All => candidates,
            Scope::Only(ids) => candidates
                .into_iter()
                .filter(|candidate| ids.contains(&candidate.id))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Scope::Only(ids) if ids.is_empty())
    }
}

/// Per-user authorization predicate over catalog levels
#[derive(Debug, Clone)]
pub struct AuthorizationScope {
    user: UserContext,
    ungranted: UngrantedScope,
    /// Grants applicable to `user`, in source order
    grants: Vec<AuthorizationGrant>,
}

impl AuthorizationScope {
    /// Build a scope keeping only the grants addressed to `user` or their role
    pub fn new(
        user: UserContext,
        ungranted: UngrantedScope,
        grants: impl IntoIterator<Item = AuthorizationGrant>,
    ) -> Self {
        let mut scope = Self {
            user,
            ungranted,
            grants: Vec::new(),
        };
        scope.replace_grants(grants);
        scope
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn ungranted(&self) -> UngrantedScope {
        self.ungranted
    }

    pub fn grants(&self) -> &[AuthorizationGrant] {
        &self.grants
    }

    /// Swap in a fresh grant list (grants changed mid-session)
    pub fn replace_grants(&mut self, grants: impl IntoIterator<Item = AuthorizationGrant>) {
        let user = &self.user;
        self.grants = grants.into_iter().filter(|g| g.applies_to(user)).collect();
    }

    pub fn has_grants_at(&self, level: Level) -> bool {
        self.grants.iter().any(|g| g.level == level)
    }

    /// Granted ids at a level, first-seen order, duplicates collapsed
    pub fn granted_ids(&self, level: Level) -> ScopedIds {
        self.grants
            .iter()
            .filter(|g| g.level == level)
            .map(|g| g.entity_id.clone())
            .collect()
    }

    /// True when contract-line scope is derived from channel grants
    ///
    /// Only when authorization is expressed solely at the Channel level; a
    /// grant at any deeper level disables aggregation.
    pub fn aggregates_contract_lines(&self) -> bool {
        self.has_grants_at(Level::Channel)
            && Level::Channel
                .below()
                .all(|level| !self.has_grants_at(level))
    }

    /// Scope at `level`
    ///
    /// The catalog is consulted only for multi-channel aggregation; granted
    /// channels whose contract lines have not been loaded contribute nothing.
    pub fn scope_for(&self, level: Level, catalog: &EntityCatalog) -> Scope {
        if self.has_grants_at(level) {
            return Scope::Only(self.granted_ids(level));
        }

        if level == Level::ContractLine && self.aggregates_contract_lines() {
            return Scope::Only(self.aggregate_contract_lines(catalog));
        }

        match self.ungranted {
            UngrantedScope::All => Scope::All,
            UngrantedScope::Nothing => Scope::none(),
        }
    }

    fn aggregate_contract_lines(&self, catalog: &EntityCatalog) -> ScopedIds {
        let mut lines = ScopedIds::default();
        for channel in self.granted_ids(Level::Channel).iter() {
            match catalog.children_of(Level::Channel, channel) {
                Ok(children) => {
                    for line in children {
                        lines.insert(line.id);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        channel = %channel,
                        error = %err,
                        "Granted channel skipped during contract-line aggregation"
                    );
                }
            }
        }
        lines
    }

    /// First channel, in grant order, through which `contract_line` is visible
    ///
    /// Without channel grants every known channel is considered, in catalog order.
    pub fn origin_channel(
        &self,
        contract_line: &EntityId,
        catalog: &EntityCatalog,
    ) -> Option<EntityId> {
        let channels: Vec<EntityId> = match self.scope_for(Level::Channel, catalog) {
            Scope::Only(ids) => ids.iter().cloned().collect(),
            Scope::All => catalog
                .all(Level::Channel)
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        channels.into_iter().find(|channel| {
            catalog
                .children_of(Level::Channel, channel)
                .map(|lines| lines.iter().any(|line| &line.id == contract_line))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_overlap() -> EntityCatalog {
        let mut catalog = EntityCatalog::new();
        catalog.record_channels([
            EntityRef::new("A", "Channel A"),
            EntityRef::new("B", "Channel B"),
            EntityRef::new("C", "Channel C"),
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
            .record_children(Level::Channel, &"C".into(), [EntityRef::new("4", "Line 4")])
            .unwrap();
        catalog
    }

    fn agent() -> UserContext {
        UserContext::new("u-7", Role::Agent)
    }

    #[test]
    fn test_role_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!(matches!(
            "auditor".parse::<Role>(),
            Err(CascadeError::UnmappedRole { .. })
        ));
    }

    #[test]
    fn test_grants_for_other_principals_are_dropped() {
        let scope = AuthorizationScope::new(
            agent(),
            UngrantedScope::All,
            [
                AuthorizationGrant::for_user("u-7", Level::Channel, "A"),
                AuthorizationGrant::for_user("u-8", Level::Channel, "B"),
                AuthorizationGrant::for_role(Role::Agent, Level::Channel, "C"),
                AuthorizationGrant::for_role(Role::Admin, Level::Channel, "B"),
            ],
        );
        let granted = scope.granted_ids(Level::Channel);
        let ids: Vec<&str> = granted
            .iter()
            .map(|id| id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_multi_channel_aggregation_dedupes_first_seen() {
        let catalog = catalog_with_overlap();
        let scope = AuthorizationScope::new(
            agent(),
            UngrantedScope::Nothing,
            [
                AuthorizationGrant::for_user("u-7", Level::Channel, "A"),
                AuthorizationGrant::for_user("u-7", Level::Channel, "B"),
            ],
        );

        let Scope::Only(lines) = scope.scope_for(Level::ContractLine, &catalog) else {
            panic!("expected an explicit contract-line scope");
        };
        let ids: Vec<&str> = lines.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_explicit_contract_line_grants_win_over_aggregation() {
        let catalog = catalog_with_overlap();
        let scope = AuthorizationScope::new(
            agent(),
            UngrantedScope::All,
            [
                AuthorizationGrant::for_user("u-7", Level::Channel, "A"),
                AuthorizationGrant::for_user("u-7", Level::ContractLine, "2"),
            ],
        );
        assert!(!scope.aggregates_contract_lines());
        let scope_at_line = scope.scope_for(Level::ContractLine, &catalog);
        assert!(scope_at_line.permits(&"2".into()));
        assert!(!scope_at_line.permits(&"1".into()));
    }

    #[test]
    fn test_deeper_grants_disable_aggregation() {
        let catalog = catalog_with_overlap();
        let scope = AuthorizationScope::new(
            agent(),
            UngrantedScope::Nothing,
            [
                AuthorizationGrant::for_user("u-7", Level::Channel, "A"),
                AuthorizationGrant::for_user("u-7", Level::Service, "svc-9"),
            ],
        );
        assert!(!scope.aggregates_contract_lines());
        assert!(scope.scope_for(Level::ContractLine, &catalog).is_empty());
        assert!(scope
            .scope_for(Level::Service, &catalog)
            .permits(&"svc-9".into()));
    }

    #[test]
    fn test_ungranted_levels_follow_role_default() {
        let catalog = catalog_with_overlap();
        let admin = AuthorizationScope::new(
            UserContext::new("root", Role::Admin),
            UngrantedScope::All,
            [],
        );
        assert_eq!(admin.scope_for(Level::Service, &catalog), Scope::All);

        let guest = AuthorizationScope::new(
            UserContext::new("anon", Role::Guest),
            UngrantedScope::Nothing,
            [],
        );
        assert!(guest.scope_for(Level::Channel, &catalog).is_empty());
    }

    #[test]
    fn test_origin_channel_follows_grant_order() {
        let catalog = catalog_with_overlap();
        let scope = AuthorizationScope::new(
            agent(),
            UngrantedScope::Nothing,
            [
                AuthorizationGrant::for_user("u-7", Level::Channel, "B"),
                AuthorizationGrant::for_user("u-7", Level::Channel, "A"),
            ],
        );
        assert_eq!(
            scope.origin_channel(&"2".into(), &catalog),
            Some(EntityId::from("B"))
        );
        assert_eq!(
            scope.origin_channel(&"1".into(), &catalog),
            Some(EntityId::from("A"))
        );
        assert_eq!(scope.origin_channel(&"4".into(), &catalog), None);
    }

    #[test]
    fn test_restrict_keeps_candidate_order() {
        let scope = Scope::Only([EntityId::from("3"), EntityId::from("1")].into_iter().collect());
        let kept = scope.restrict(vec![
            EntityRef::new("1", "One"),
            EntityRef::new("2", "Two"),
            EntityRef::new("3", "Three"),
        ]);
        let ids: Vec<&str> = kept.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
