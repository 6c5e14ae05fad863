//! Canonical backend tokens
//!
//! Maps user-facing selection values to stable backend tokens. Levels listed
//! in the [`CanonicalTable`] are looked up by normalized display label;
//! every other level carries its catalog identifier end-to-end.
//!
//! The label lookup is a data-migration shim: it only exists because older
//! form layers stored display labels instead of catalog ids. Unmapped labels
//! fail with `UnknownCanonicalValue` and are never passed through.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::catalog::{EntityCatalog, EntityId, EntityRef, Level};
use crate::error::{CascadeError, ConfigError};
use crate::resolver::ResolvedSelection;

/// Normalize a display label for lookup
///
/// NFKC fold, lowercase, punctuation to spaces, whitespace collapsed:
/// `"Telephony / Mobile"` and `"telephony mobile"` are the same key.
pub fn normalize_label(label: &str) -> String {
    let folded: String = label.nfkc().collect();
    let stripped: String = folded
        .chars()
        .flat_map(|c| {
            let c = if c.is_alphanumeric() { c } else { ' ' };
            c.to_lowercase()
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One token and the labels that map to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub token: String,
    pub label: String,
    /// Alternative labels explicitly sharing the token
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CanonicalEntry {
    pub fn new(token: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            label: label.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.label.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Entries per level, as written in configuration
pub type CanonicalEntries = BTreeMap<Level, Vec<CanonicalEntry>>;

/// Label → token lookup per level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CanonicalEntries", into = "CanonicalEntries")]
pub struct CanonicalTable {
    entries: CanonicalEntries,
    /// (level, normalized label) -> token
    index: HashMap<(Level, String), String>,
}

impl CanonicalTable {
    /// Build a table, rejecting duplicate labels or tokens within a level
    pub fn from_entries(entries: CanonicalEntries) -> Result<Self, ConfigError> {
        let mut index = HashMap::new();

        for (level, level_entries) in &entries {
            let mut tokens = HashSet::new();
            for entry in level_entries {
                if !tokens.insert(entry.token.as_str()) {
                    return Err(ConfigError::DuplicateCanonicalToken {
                        level: *level,
                        token: entry.token.clone(),
                    });
                }
                for label in entry.labels() {
                    let key = (*level, normalize_label(label));
                    if index.insert(key, entry.token.clone()).is_some() {
                        return Err(ConfigError::DuplicateCanonicalLabel {
                            level: *level,
                            label: label.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self { entries, index })
    }

    /// Whether `level` is canonicalized by label
    pub fn covers(&self, level: Level) -> bool {
        self.entries
            .get(&level)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    pub fn entries(&self, level: Level) -> &[CanonicalEntry] {
        self.entries.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Token for a display label at a covered level
    pub fn token_for(&self, level: Level, label: &str) -> Result<&str, CascadeError> {
        self.index
            .get(&(level, normalize_label(label)))
            .map(String::as_str)
            .ok_or_else(|| CascadeError::UnknownCanonicalValue {
                level,
                label: label.to_string(),
            })
    }

    /// Canonical value of a catalog entity
    pub fn canonicalize(
        &self,
        level: Level,
        entity: &EntityRef,
    ) -> Result<CanonicalValue, CascadeError> {
        let token = if self.covers(level) {
            self.token_for(level, &entity.label)?.to_string()
        } else {
            entity.id.to_string()
        };
        Ok(CanonicalValue {
            level,
            id: entity.id.clone(),
            token,
        })
    }

    /// Canonicalize a raw UI value that is either a catalog id or a label
    pub fn canonicalize_ui_value(
        &self,
        level: Level,
        raw: &str,
        catalog: &EntityCatalog,
    ) -> Result<CanonicalValue, CascadeError> {
        if let Some(entity) = catalog.get(level, &EntityId::from(raw)) {
            return self.canonicalize(level, entity);
        }

        let wanted = normalize_label(raw);
        let by_label = catalog
            .all(level)
            .into_iter()
            .find(|entity| normalize_label(&entity.label) == wanted);
        match by_label {
            Some(entity) => {
                tracing::debug!(level = %level, raw, id = %entity.id, "UI value resolved by label");
                self.canonicalize(level, &entity)
            }
            None => Err(CascadeError::UnknownCanonicalValue {
                level,
                label: raw.to_string(),
            }),
        }
    }

    /// Canonicalize every level of a completed cascade
    pub fn canonicalize_selection(
        &self,
        selection: &ResolvedSelection,
    ) -> Result<CanonicalSelection, CascadeError> {
        let values = selection
            .entities()
            .into_iter()
            .map(|(level, entity)| self.canonicalize(level, entity))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CanonicalSelection { values })
    }
}

impl TryFrom<CanonicalEntries> for CanonicalTable {
    type Error = ConfigError;

    fn try_from(entries: CanonicalEntries) -> Result<Self, Self::Error> {
        Self::from_entries(entries)
    }
}

impl From<CanonicalTable> for CanonicalEntries {
    fn from(table: CanonicalTable) -> Self {
        table.entries
    }
}

/// A selected entity with its backend token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalValue {
    pub level: Level,
    pub id: EntityId,
    pub token: String,
}

/// The canonical selection handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSelection {
    values: Vec<CanonicalValue>,
}

impl CanonicalSelection {
    pub fn get(&self, level: Level) -> Option<&CanonicalValue> {
        self.values.iter().find(|value| value.level == level)
    }

    pub fn token(&self, level: Level) -> Option<&str> {
        self.get(level).map(|value| value.token.as_str())
    }

    pub fn values(&self) -> &[CanonicalValue] {
        &self.values
    }
}
