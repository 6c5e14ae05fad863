//! Cascade Resolver
//!
//! Level-ordered state machine behind the offer assignment form. One
//! frontier pointer replaces the dropdown-to-dropdown callbacks:
//!
//! ```text
//! entry ──select──► entry+1 ──select──► ... ──select──► Offer (complete)
//!   ▲                  │
//!   └──── select at any level ≤ frontier resets everything below it
//! ```
//!
//! Invariants:
//! - options offered at level L are `children(selected parent) ∩ scope(L)`;
//!   the entry level is seeded by [`RoleEntryPointStrategy`]
//! - after `select(L, _)` every level below L is unselected
//! - re-selecting the current id is a no-op (no reset, no fetch) while it
//!   and its ancestors are still offered
//! - a fetch result is applied only if its ticket's generation still matches
//!   the pending option set it was issued for
//!
//! Fetching is not done here: `select` hands back a [`FetchTicket`] and the
//! caller (usually [`CascadeSession`]) reports the result via `apply_fetch`.

pub mod session;
pub mod state;

use tracing::{debug, error, info, warn};

use crate::catalog::{EntityCatalog, EntityId, EntityRef, Level};
use crate::entry::{seed_options, RoleEntryPointStrategy};
use crate::error::{CascadeError, SourceError};
use crate::scope::{AuthorizationGrant, AuthorizationScope};

pub use session::{CascadeSession, FetchedChildren, Fetcher};
pub use state::{OptionSet, ResolvedSelection, SelectionState};

/// Request to load the options of `level` for a newly selected parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    /// Level whose options are being loaded
    pub level: Level,
    /// Selected entity at `level.parent()`
    pub parent_id: EntityId,
    pub generation: u64,
}

/// Result of a `select` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Same id re-selected; nothing changed
    Unchanged,
    /// Next level's options were served from the session cache
    OptionsReady { level: Level, count: usize },
    /// Next level's options need a catalog fetch
    FetchRequired(FetchTicket),
    /// Offer selected; the cascade is complete
    Complete,
}

/// Result of applying a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { level: Level, count: usize },
    /// The ticket was superseded; the result was discarded
    Stale,
}

pub struct CascadeResolver {
    entry: Level,
    catalog: EntityCatalog,
    authorization: AuthorizationScope,
    state: SelectionState,
    options: [OptionSet; 6],
    generation: u64,
    /// First fatal error; once set every mutation reports it
    aborted: Option<CascadeError>,
}

impl CascadeResolver {
    /// Open a cascade for the authorized user over a pre-loaded catalog
    ///
    /// The catalog must hold the channels, plus the contract lines of every
    /// channel named by [`RoleEntryPointStrategy::channels_to_expand`].
    pub fn open(
        strategy: &RoleEntryPointStrategy,
        authorization: AuthorizationScope,
        catalog: EntityCatalog,
    ) -> Result<Self, CascadeError> {
        let entry = strategy.entry_level(authorization.role())?;
        let initial = strategy.initial_options(&authorization, &catalog)?;

        if initial.is_empty() {
            info!(role = %authorization.role(), entry = %entry, "Cascade opened with no options");
        } else {
            debug!(role = %authorization.role(), entry = %entry, count = initial.len(), "Cascade opened");
        }

        let mut options: [OptionSet; 6] = Default::default();
        options[entry.index()] = OptionSet::Ready(initial);

        Ok(Self {
            entry,
            catalog,
            authorization,
            state: SelectionState::new(),
            options,
            generation: 0,
            aborted: None,
        })
    }

    pub fn entry_level(&self) -> Level {
        self.entry
    }

    pub fn selection(&self) -> &SelectionState {
        &self.state
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn authorization(&self) -> &AuthorizationScope {
        &self.authorization
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn aborted(&self) -> Option<&CascadeError> {
        self.aborted.as_ref()
    }

    /// The entry level offers nothing: unauthorized roles
    pub fn is_inert(&self) -> bool {
        self.state.is_empty() && self.options[self.entry.index()].entities().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_selected(Level::Offer)
    }

    /// Lowest unselected level whose parent is selected; `None` once complete
    pub fn frontier(&self) -> Option<Level> {
        match self.state.deepest() {
            None => Some(self.entry),
            Some(level) => level.child(),
        }
    }

    /// Selectable options at `level`
    ///
    /// Levels between the entry and the frontier keep their option set so an
    /// upstream choice can be changed; levels below the frontier, or above
    /// the entry, are empty.
    pub fn current_options(&self, level: Level) -> &[EntityRef] {
        if !self.within_reach(level) {
            return &[];
        }
        self.options[level.index()].entities()
    }

    pub fn option_set(&self, level: Level) -> &OptionSet {
        &self.options[level.index()]
    }

    fn within_reach(&self, level: Level) -> bool {
        level >= self.entry && self.frontier().map_or(true, |frontier| level <= frontier)
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Select `id` at `level`, resetting every level below it
    pub fn select(&mut self, level: Level, id: &EntityId) -> Result<SelectOutcome, CascadeError> {
        self.ensure_live()?;

        if !self.within_reach(level) {
            return Err(self.abort(CascadeError::OutOfOrderSelection {
                level,
                frontier: self.frontier(),
            }));
        }

        self.verify_ancestors(level)?;

        let Some(entity) = self
            .current_options(level)
            .iter()
            .find(|option| &option.id == id)
            .cloned()
        else {
            warn!(level = %level, id = %id, "Selection not among current options");
            return Err(CascadeError::InvalidSelection {
                level,
                id: id.clone(),
            });
        };

        if self.state.selected_id(level) == Some(id) {
            debug!(level = %level, id = %id, "Re-selection ignored");
            return Ok(SelectOutcome::Unchanged);
        }

        self.state.clear_from(level);
        self.state.set(level, entity);
        for below in level.below() {
            self.options[below.index()] = OptionSet::Empty;
        }
        self.generation += 1;
        debug!(level = %level, id = %id, generation = self.generation, "Selected");

        let Some(next) = level.child() else {
            info!(offer = %id, "Cascade complete");
            return Ok(SelectOutcome::Complete);
        };

        if self.catalog.is_loaded(level, id) {
            let count = self.fill_options(next, id)?;
            debug!(level = %next, count, "Options served from cache");
            return Ok(SelectOutcome::OptionsReady { level: next, count });
        }

        self.options[next.index()] = OptionSet::Pending {
            generation: self.generation,
        };
        Ok(SelectOutcome::FetchRequired(FetchTicket {
            level: next,
            parent_id: id.clone(),
            generation: self.generation,
        }))
    }

    /// Unselect `from` and every level below it
    ///
    /// Levels above the entry are not part of the cascade; resetting from
    /// one of them resets from the entry level.
    pub fn reset(&mut self, from: Level) -> Result<(), CascadeError> {
        self.ensure_live()?;
        let from = from.max(self.entry);

        self.state.clear_from(from);
        for below in from.below() {
            self.options[below.index()] = OptionSet::Empty;
        }
        self.generation += 1;
        debug!(from = %from, generation = self.generation, "Cascade reset");
        Ok(())
    }

    /// Apply fetched children for a ticket; superseded tickets are discarded
    pub fn apply_fetch(
        &mut self,
        ticket: &FetchTicket,
        children: Vec<EntityRef>,
    ) -> Result<ApplyOutcome, CascadeError> {
        if !self.is_current(ticket) {
            warn!(
                level = %ticket.level,
                parent = %ticket.parent_id,
                ticket_generation = ticket.generation,
                generation = self.generation,
                "Discarding stale fetch result"
            );
            return Ok(ApplyOutcome::Stale);
        }

        let Some(parent_level) = ticket.level.parent() else {
            return Ok(ApplyOutcome::Stale);
        };
        self.catalog
            .record_children(parent_level, &ticket.parent_id, children)?;
        let count = self.fill_options(ticket.level, &ticket.parent_id)?;
        debug!(level = %ticket.level, count, "Fetched options applied");
        Ok(ApplyOutcome::Applied {
            level: ticket.level,
            count,
        })
    }

    /// Report a failed fetch for `ticket`
    ///
    /// Failures of superseded tickets are dropped. A current ticket stays
    /// pending so it can be retried; a malformed response aborts the cascade.
    pub fn fail_fetch(
        &mut self,
        ticket: &FetchTicket,
        source_error: SourceError,
    ) -> Result<ApplyOutcome, CascadeError> {
        if !self.is_current(ticket) {
            warn!(
                level = %ticket.level,
                parent = %ticket.parent_id,
                error = %source_error,
                "Ignoring failure of stale fetch"
            );
            return Ok(ApplyOutcome::Stale);
        }

        let err = CascadeError::from(source_error);
        if err.is_fatal() {
            return Err(self.abort(err));
        }
        warn!(level = %ticket.level, parent = %ticket.parent_id, error = %err, "Fetch failed");
        Err(err)
    }

    /// Whether `ticket` still matches the pending option set it was issued for
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        let pending_matches = matches!(
            self.options[ticket.level.index()],
            OptionSet::Pending { generation } if generation == ticket.generation
        );
        let parent_matches = ticket
            .level
            .parent()
            .and_then(|parent| self.state.selected_id(parent))
            == Some(&ticket.parent_id);
        pending_matches && parent_matches
    }

    /// Ticket for the frontier's pending fetch, to retry a failed load
    pub fn pending_ticket(&self) -> Option<FetchTicket> {
        let level = self.frontier()?;
        let OptionSet::Pending { generation } = self.options[level.index()] else {
            return None;
        };
        let parent_id = self.state.selected_id(level.parent()?)?.clone();
        Some(FetchTicket {
            level,
            parent_id,
            generation,
        })
    }

    /// Recompute scopes after the user's grants changed
    ///
    /// Selections are kept; the next `select` or `resolved` re-validates
    /// the selected chain and reports `InvalidSelection` for the first level
    /// that fell out of scope.
    pub fn refresh_grants(
        &mut self,
        grants: impl IntoIterator<Item = AuthorizationGrant>,
    ) -> Result<(), CascadeError> {
        self.ensure_live()?;
        self.authorization.replace_grants(grants);
        self.generation += 1;

        self.options[self.entry.index()] =
            OptionSet::Ready(seed_options(self.entry, &self.authorization, &self.catalog));
        for level in self.entry.below() {
            if !matches!(self.options[level.index()], OptionSet::Ready(_)) {
                continue;
            }
            let Some(parent_id) = level
                .parent()
                .and_then(|parent| self.state.selected_id(parent))
                .cloned()
            else {
                continue;
            };
            self.fill_options(level, &parent_id)?;
        }
        info!(
            grants = self.authorization.grants().len(),
            generation = self.generation,
            "Grants refreshed"
        );
        Ok(())
    }

    /// Swap in catalog data loaded outside of a ticket (grant refresh)
    pub(crate) fn catalog_mut(&mut self) -> &mut EntityCatalog {
        &mut self.catalog
    }

    /// Resolved selection, once the offer is chosen
    ///
    /// Every selected level, offer included, must still be in scope.
    pub fn resolved(&self) -> Result<ResolvedSelection, CascadeError> {
        if !self.is_complete() {
            return Err(CascadeError::Incomplete {
                missing: self.frontier().unwrap_or(Level::Offer),
            });
        }
        self.verify_chain(self.state.iter())?;

        let origin = match self.state.get(Level::Channel) {
            Some(_) => None,
            None => self
                .state
                .selected_id(Level::ContractLine)
                .and_then(|line| self.authorization.origin_channel(line, &self.catalog))
                .and_then(|channel| self.catalog.get(Level::Channel, &channel).cloned()),
        };
        ResolvedSelection::from_state(&self.state, origin)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn fill_options(&mut self, level: Level, parent_id: &EntityId) -> Result<usize, CascadeError> {
        let Some(parent_level) = level.parent() else {
            return Ok(0);
        };
        let children = self.catalog.children_of(parent_level, parent_id)?;
        let options = self
            .authorization
            .scope_for(level, &self.catalog)
            .restrict(children);
        let count = options.len();
        self.options[level.index()] = OptionSet::Ready(options);
        Ok(count)
    }

    /// Every selected level above `level` must still be among its options
    fn verify_ancestors(&self, level: Level) -> Result<(), CascadeError> {
        self.verify_chain(
            self.state
                .iter()
                .take_while(|(ancestor, _)| *ancestor < level),
        )
    }

    fn verify_chain<'a>(
        &self,
        chain: impl Iterator<Item = (Level, &'a EntityRef)>,
    ) -> Result<(), CascadeError> {
        for (selected, entity) in chain {
            let still_offered = self
                .current_options(selected)
                .iter()
                .any(|option| option.id == entity.id);
            if !still_offered {
                warn!(level = %selected, id = %entity.id, "Selection fell out of scope");
                return Err(CascadeError::InvalidSelection {
                    level: selected,
                    id: entity.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), CascadeError> {
        match &self.aborted {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn abort(&mut self, err: CascadeError) -> CascadeError {
        error!(error = %err, "Cascade aborted");
        self.aborted = Some(err.clone());
        err
    }
}
