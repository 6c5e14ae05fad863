//! Selection state types
//!
//! `SelectionState` is the ordered partial function level → chosen entity.
//! Selections are always contiguous from the entry level downwards: a level
//! is only ever set while its parent is set, and clearing a level clears
//! everything below it.

use serde::Serialize;

use crate::catalog::{ContractCategory, EntityId, EntityRef, Level, SegmentKind};
use crate::error::CascadeError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    slots: [Option<EntityRef>; 6],
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, level: Level) -> Option<&EntityRef> {
        self.slots[level.index()].as_ref()
    }

    pub fn selected_id(&self, level: Level) -> Option<&EntityId> {
        self.get(level).map(|entity| &entity.id)
    }

    pub fn is_selected(&self, level: Level) -> bool {
        self.slots[level.index()].is_some()
    }

    /// Deepest selected level
    pub fn deepest(&self) -> Option<Level> {
        Level::ALL
            .into_iter()
            .rev()
            .find(|level| self.is_selected(*level))
    }

    /// Selected levels with their entities, top to bottom
    pub fn iter(&self) -> impl Iterator<Item = (Level, &EntityRef)> {
        Level::ALL
            .into_iter()
            .filter_map(|level| self.get(level).map(|entity| (level, entity)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub(crate) fn set(&mut self, level: Level, entity: EntityRef) {
        self.slots[level.index()] = Some(entity);
    }

    /// Unset `level` and every level below it
    pub(crate) fn clear_from(&mut self, level: Level) {
        for slot in &mut self.slots[level.index()..] {
            *slot = None;
        }
    }
}

/// Option set held for one level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OptionSet {
    /// Not selectable: the level is below the frontier or outside the cascade
    #[default]
    Empty,
    /// Waiting on a catalog fetch issued at `generation`
    Pending { generation: u64 },
    Ready(Vec<EntityRef>),
}

impl OptionSet {
    pub fn entities(&self) -> &[EntityRef] {
        match self {
            OptionSet::Ready(entities) => entities,
            _ => &[],
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OptionSet::Pending { .. })
    }
}

/// A completed cascade, ready for schema derivation and canonicalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSelection {
    /// Selected channel, or the channel the contract line was reached through
    pub channel: Option<EntityRef>,
    pub contract_line: EntityRef,
    pub service: EntityRef,
    pub contract_type: EntityRef,
    pub segment: EntityRef,
    pub offer: EntityRef,
}

impl ResolvedSelection {
    pub(crate) fn from_state(
        state: &SelectionState,
        origin_channel: Option<EntityRef>,
    ) -> Result<Self, CascadeError> {
        let take = |level: Level| {
            state
                .get(level)
                .cloned()
                .ok_or(CascadeError::Incomplete { missing: level })
        };

        Ok(Self {
            channel: state.get(Level::Channel).cloned().or(origin_channel),
            contract_line: take(Level::ContractLine)?,
            service: take(Level::Service)?,
            contract_type: take(Level::ContractType)?,
            segment: take(Level::Segment)?,
            offer: take(Level::Offer)?,
        })
    }

    /// Category of the contract type; uncategorised types count as `Other`
    pub fn category(&self) -> ContractCategory {
        self.contract_type.category.unwrap_or_default()
    }

    /// Kind of the segment; segments without a kind count as `Private`
    pub fn segment_kind(&self) -> SegmentKind {
        self.segment.kind.unwrap_or_default()
    }

    /// Entities per level, top to bottom, channel included when known
    pub fn entities(&self) -> Vec<(Level, &EntityRef)> {
        let mut entities = Vec::with_capacity(6);
        if let Some(channel) = &self.channel {
            entities.push((Level::Channel, channel));
        }
        entities.extend([
            (Level::ContractLine, &self.contract_line),
            (Level::Service, &self.service),
            (Level::ContractType, &self.contract_type),
            (Level::Segment, &self.segment),
            (Level::Offer, &self.offer),
        ]);
        entities
    }
}
