//! Catalog source abstraction
//!
//! The `CatalogSource` trait is the resolver's only window onto the backend
//! catalog and grant store. Implementations must be Send + Sync so a fetch
//! can run while the session keeps accepting selection events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{ContractCategory, EntityId, EntityRef, Level, SegmentKind};
use crate::error::{ConfigError, SourceError};
use crate::scope::{AuthorizationGrant, Principal, UserId};

/// Backend catalog and grant collaborator
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the entities at `level` whose parent is `parent_id`
    ///
    /// `parent_id` names an entity at `level.parent()`; it is `None` only
    /// when fetching channels.
    async fn fetch_children(
        &self,
        level: Level,
        parent_id: Option<&EntityId>,
    ) -> Result<Vec<EntityRef>, SourceError>;

    /// Fetch every grant addressed to the user or to any role
    async fn fetch_user_grants(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<AuthorizationGrant>, SourceError>;
}

type ChildKey = (Level, Option<EntityId>);

/// In-memory catalog source, used by tests and demos
#[derive(Debug, Default)]
pub struct StaticCatalogSource {
    children: HashMap<ChildKey, Vec<EntityRef>>,
    grants: Vec<AuthorizationGrant>,
    /// One-shot failures injected for a given fetch key
    failures: Mutex<HashMap<ChildKey, SourceError>>,
    fetches: AtomicUsize,
}

impl StaticCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(self, channel: EntityRef) -> Self {
        self.with_child(Level::Channel, None, channel)
    }

    /// Register `entity` at `level` under the parent `parent_id`
    pub fn with_child(mut self, level: Level, parent_id: Option<&str>, entity: EntityRef) -> Self {
        self.children
            .entry((level, parent_id.map(EntityId::from)))
            .or_default()
            .push(entity);
        self
    }

    pub fn with_grant(mut self, grant: AuthorizationGrant) -> Self {
        self.grants.push(grant);
        self
    }

    /// Make the next fetch of `(level, parent_id)` fail with `error`
    pub async fn fail_next(&self, level: Level, parent_id: Option<&str>, error: SourceError) {
        self.failures
            .lock()
            .await
            .insert((level, parent_id.map(EntityId::from)), error);
    }

    /// Number of `fetch_children` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Build a source from a YAML fixture
    ///
    /// ```yaml
    /// channels:
    ///   - { id: ch-x, label: North Agency, contract_lines: [cl-1] }
    /// contract_lines:
    ///   - id: cl-1
    ///     label: Mobile
    ///     children:
    ///       - id: svc-1
    ///         label: Mobile Plans
    /// grants:
    ///   - { principal: { user: u-1 }, level: channel, entity_id: ch-x }
    /// ```
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let fixture: CatalogFixture = serde_yaml::from_str(content)?;
        let mut source = Self::new();

        for channel in fixture.channels {
            for line in &channel.contract_lines {
                let Some(node) = fixture.contract_lines.iter().find(|n| &n.id == line) else {
                    return Err(ConfigError::Parse(format!(
                        "channel '{}' references unknown contract line '{}'",
                        channel.id, line
                    )));
                };
                source = source.with_child(
                    Level::ContractLine,
                    Some(channel.id.as_str()),
                    node.entity(),
                );
            }
            source = source.with_channel(EntityRef::new(channel.id, channel.label));
        }

        for line in &fixture.contract_lines {
            source.add_subtree(Level::ContractLine, line);
        }
        source.grants = fixture.grants;
        Ok(source)
    }

    fn add_subtree(&mut self, level: Level, node: &FixtureNode) {
        let Some(child_level) = level.child() else {
            return;
        };
        // A parent listed with no children is a loaded, empty branch.
        let key = (child_level, Some(node.id.clone()));
        self.children.entry(key.clone()).or_default();
        for child in &node.children {
            if let Some(bucket) = self.children.get_mut(&key) {
                bucket.push(child.entity());
            }
            self.add_subtree(child_level, child);
        }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch_children(
        &self,
        level: Level,
        parent_id: Option<&EntityId>,
    ) -> Result<Vec<EntityRef>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = (level, parent_id.cloned());
        if let Some(error) = self.failures.lock().await.remove(&key) {
            return Err(error);
        }
        Ok(self.children.get(&key).cloned().unwrap_or_default())
    }

    async fn fetch_user_grants(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<AuthorizationGrant>, SourceError> {
        Ok(self
            .grants
            .iter()
            .filter(|grant| match &grant.principal {
                Principal::User(id) => id == user_id,
                Principal::Role(_) => true,
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// YAML FIXTURE
// =============================================================================

#[derive(Debug, Deserialize)]
struct CatalogFixture {
    #[serde(default)]
    channels: Vec<ChannelFixture>,
    #[serde(default)]
    contract_lines: Vec<FixtureNode>,
    #[serde(default)]
    grants: Vec<AuthorizationGrant>,
}

#[derive(Debug, Deserialize)]
struct ChannelFixture {
    id: EntityId,
    label: String,
    #[serde(default)]
    contract_lines: Vec<EntityId>,
}

#[derive(Debug, Deserialize)]
struct FixtureNode {
    id: EntityId,
    label: String,
    #[serde(default)]
    category: Option<ContractCategory>,
    #[serde(default)]
    kind: Option<SegmentKind>,
    #[serde(default)]
    children: Vec<FixtureNode>,
}

impl FixtureNode {
    fn entity(&self) -> EntityRef {
        EntityRef {
            id: self.id.clone(),
            label: self.label.clone(),
            category: self.category,
            kind: self.kind,
        }
    }
}
