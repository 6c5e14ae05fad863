//! Entity Catalog
//!
//! Read-only lookup tables for the six cascade levels:
//!
//! ```text
//! Channel ──(authorization list)──► ContractLine ──► Service ──► ContractType ──► Segment ──► Offer
//! ```
//!
//! Channel → ContractLine is a grant relationship (a line may be visible
//! through several channels); every other edge is structural (one parent).
//!
//! The catalog is a per-session cache. It is filled from a [`CatalogSource`]
//! as the cascade advances and never mutated by the resolver beyond
//! recording freshly fetched children.

pub mod source;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CascadeError;

pub use source::{CatalogSource, StaticCatalogSource};

// =============================================================================
// LEVELS & REFERENCES
// =============================================================================

/// A level of the commercial configuration hierarchy, top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Channel,
    ContractLine,
    Service,
    ContractType,
    Segment,
    Offer,
}

impl Level {
    /// All levels in cascade order
    pub const ALL: [Level; 6] = [
        Level::Channel,
        Level::ContractLine,
        Level::Service,
        Level::ContractType,
        Level::Segment,
        Level::Offer,
    ];

    /// Position in the cascade (Channel = 0)
    pub fn index(self) -> usize {
        self as usize
    }

    /// The level immediately above, if any
    pub fn parent(self) -> Option<Level> {
        self.index().checked_sub(1).map(|i| Level::ALL[i])
    }

    /// The level immediately below, if any
    pub fn child(self) -> Option<Level> {
        Level::ALL.get(self.index() + 1).copied()
    }

    /// Levels strictly below this one, in cascade order
    pub fn below(self) -> impl Iterator<Item = Level> {
        Level::ALL.into_iter().skip(self.index() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Channel => "channel",
            Level::ContractLine => "contract-line",
            Level::Service => "service",
            Level::ContractType => "contract-type",
            Level::Segment => "segment",
            Level::Offer => "offer",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend identifier of a catalog entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic category of a contract type, drives conditional form fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractCategory {
    Telephony,
    Energy,
    #[default]
    #[serde(other)]
    Other,
}

/// Semantic kind of a customer segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    #[default]
    Private,
    Business,
}

/// A catalog entity as seen by the cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    /// Human-readable label, unique within its level
    pub label: String,
    /// Only meaningful for contract types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ContractCategory>,
    /// Only meaningful for segments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SegmentKind>,
}

impl EntityRef {
    pub fn new(id: impl Into<EntityId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            category: None,
            kind: None,
        }
    }

    pub fn with_category(mut self, category: ContractCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_kind(mut self, kind: SegmentKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

// =============================================================================
// CATALOG CACHE
// =============================================================================

/// Per-session cache of catalog entities and their parent linkage
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    /// Entities per level, in first-recorded order
    entities: HashMap<Level, Vec<EntityRef>>,
    /// (level, id) -> position in `entities[level]`
    positions: HashMap<(Level, EntityId), usize>,
    /// (parent level, parent id) -> child ids in source order
    children: HashMap<(Level, EntityId), Vec<EntityId>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the top-level channels
    pub fn record_channels(&mut self, channels: impl IntoIterator<Item = EntityRef>) {
        for channel in channels {
            self.insert(Level::Channel, channel);
        }
    }

    /// Record the children fetched for a parent
    ///
    /// The parent must already be known. Duplicate child ids in the batch
    /// are collapsed, keeping the first occurrence.
    pub fn record_children(
        &mut self,
        parent_level: Level,
        parent_id: &EntityId,
        children: impl IntoIterator<Item = EntityRef>,
    ) -> Result<(), CascadeError> {
        let not_found = || CascadeError::NotFound {
            level: parent_level,
            id: parent_id.clone(),
        };
        let child_level = parent_level.child().ok_or_else(not_found)?;
        if !self.contains(parent_level, parent_id) {
            return Err(not_found());
        }

        let mut ids: Vec<EntityId> = Vec::new();
        for child in children {
            if ids.contains(&child.id) {
                continue;
            }
            ids.push(child.id.clone());
            self.insert(child_level, child);
        }

        self.children.insert((parent_level, parent_id.clone()), ids);
        Ok(())
    }

    fn insert(&mut self, level: Level, entity: EntityRef) {
        let key = (level, entity.id.clone());
        if self.positions.contains_key(&key) {
            return;
        }
        let bucket = self.entities.entry(level).or_default();
        self.positions.insert(key, bucket.len());
        bucket.push(entity);
    }

    pub fn contains(&self, level: Level, id: &EntityId) -> bool {
        self.positions.contains_key(&(level, id.clone()))
    }

    pub fn get(&self, level: Level, id: &EntityId) -> Option<&EntityRef> {
        let position = *self.positions.get(&(level, id.clone()))?;
        self.entities.get(&level)?.get(position)
    }

    /// Whether children of this parent have been fetched
    pub fn is_loaded(&self, parent_level: Level, parent_id: &EntityId) -> bool {
        self.children
            .contains_key(&(parent_level, parent_id.clone()))
    }

    /// Children of `parent_id` (an entity at `parent_level`), in source order
    pub fn children_of(
        &self,
        parent_level: Level,
        parent_id: &EntityId,
    ) -> Result<Vec<EntityRef>, CascadeError> {
        if !self.contains(parent_level, parent_id) {
            return Err(CascadeError::NotFound {
                level: parent_level,
                id: parent_id.clone(),
            });
        }
        let ids = self
            .children
            .get(&(parent_level, parent_id.clone()))
            .ok_or_else(|| CascadeError::NotLoaded {
                level: parent_level,
                id: parent_id.clone(),
            })?;

        let Some(child_level) = parent_level.child() else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.get(child_level, id).cloned())
            .collect())
    }

    /// Every known entity at a level, in first-recorded order
    pub fn all(&self, level: Level) -> Vec<EntityRef> {
        self.entities.get(&level).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
