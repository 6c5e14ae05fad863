//! Cascade Session
//!
//! Async driver binding a [`CascadeResolver`] to its collaborators.
//!
//! ```text
//! UI event ──► begin_select ──► FetchRequired(ticket)
//!                                   │
//!                 Fetcher::fetch ◄──┘   (runs without borrowing the session)
//!                       │
//!                       ▼
//!                     apply ──► Applied | Stale
//! ```
//!
//! Grants are fetched once when the session opens. The session is the only
//! writer of its resolver; fetches may be in flight while further selection
//! events arrive, and generation tickets decide which results still apply.

use std::sync::Arc;

use tracing::{debug, info, Instrument, Span};
use uuid::Uuid;

use super::{ApplyOutcome, CascadeResolver, FetchTicket, ResolvedSelection, SelectOutcome};
use crate::catalog::{CatalogSource, EntityCatalog, EntityId, EntityRef, Level};
use crate::entry::RoleEntryPointStrategy;
use crate::error::{CascadeError, SourceError};
use crate::persist::{RecordId, RecordSink};
use crate::schema::{CanonicalTable, CustomerRecord, DynamicFormSchemaBuilder, FormSchema};
use crate::scope::{AuthorizationScope, UserContext};

/// Executes fetch tickets against the catalog source
pub struct Fetcher<S> {
    source: Arc<S>,
}

impl<S> Clone for Fetcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: CatalogSource> Fetcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub async fn fetch(&self, ticket: FetchTicket) -> FetchedChildren {
        let result = self
            .source
            .fetch_children(ticket.level, Some(&ticket.parent_id))
            .await;
        FetchedChildren { ticket, result }
    }
}

/// Outcome of one ticket's fetch, ready to hand back to the session
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedChildren {
    pub ticket: FetchTicket,
    pub result: Result<Vec<EntityRef>, SourceError>,
}

/// One user's cascade, from open to submit
pub struct CascadeSession<S> {
    id: Uuid,
    span: Span,
    strategy: RoleEntryPointStrategy,
    resolver: CascadeResolver,
    fetcher: Fetcher<S>,
}

impl<S: CatalogSource> CascadeSession<S> {
    /// Open a cascade: fetch grants and channels, expand the channels the
    /// entry level needs, seed the entry options
    pub async fn open(
        source: Arc<S>,
        strategy: &RoleEntryPointStrategy,
        user: UserContext,
    ) -> Result<Self, CascadeError> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!(
            "cascade_session",
            session_id = %id,
            user = %user.user_id,
            role = %user.role
        );

        let resolver = Self::open_resolver(&source, strategy, user)
            .instrument(span.clone())
            .await?;

        Ok(Self {
            id,
            span,
            strategy: strategy.clone(),
            resolver,
            fetcher: Fetcher::new(source),
        })
    }

    async fn open_resolver(
        source: &Arc<S>,
        strategy: &RoleEntryPointStrategy,
        user: UserContext,
    ) -> Result<CascadeResolver, CascadeError> {
        if let Err(err) = strategy.profile(user.role) {
            tracing::error!(error = %err, "Cannot open cascade");
            return Err(err);
        }

        let grants = source.fetch_user_grants(&user.user_id).await?;
        let authorization = strategy.authorize(user, grants)?;

        let mut catalog = EntityCatalog::new();
        catalog.record_channels(source.fetch_children(Level::Channel, None).await?);
        expand_channels(source.as_ref(), strategy, &authorization, &mut catalog).await?;

        let resolver = CascadeResolver::open(strategy, authorization, catalog)?;
        info!(
            entry = %resolver.entry_level(),
            options = resolver.current_options(resolver.entry_level()).len(),
            "Cascade session opened"
        );
        Ok(resolver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn resolver(&self) -> &CascadeResolver {
        &self.resolver
    }

    pub fn frontier(&self) -> Option<Level> {
        self.resolver.frontier()
    }

    pub fn current_options(&self, level: Level) -> &[EntityRef] {
        self.resolver.current_options(level)
    }

    /// A fetcher to run tickets concurrently with further selection events
    pub fn fetcher(&self) -> Fetcher<S> {
        self.fetcher.clone()
    }

    // =========================================================================
    // SPLIT API
    // =========================================================================

    /// Apply a selection without fetching; a returned ticket must be run by
    /// a [`Fetcher`] and handed back through [`CascadeSession::apply`]
    pub fn begin_select(
        &mut self,
        level: Level,
        id: &EntityId,
    ) -> Result<SelectOutcome, CascadeError> {
        let _entered = self.span.enter();
        self.resolver.select(level, id)
    }

    /// Hand a finished fetch back to the resolver
    pub fn apply(&mut self, fetched: FetchedChildren) -> Result<ApplyOutcome, CascadeError> {
        let _entered = self.span.enter();
        match fetched.result {
            Ok(children) => self.resolver.apply_fetch(&fetched.ticket, children),
            Err(err) => self.resolver.fail_fetch(&fetched.ticket, err),
        }
    }

    // =========================================================================
    // AWAITING API
    // =========================================================================

    /// Select and, if needed, load the next level's options before returning
    pub async fn select(
        &mut self,
        level: Level,
        id: &EntityId,
    ) -> Result<SelectOutcome, CascadeError> {
        let ticket = match self.begin_select(level, id)? {
            SelectOutcome::FetchRequired(ticket) => ticket,
            outcome => return Ok(outcome),
        };

        let fetched = self
            .fetcher
            .fetch(ticket.clone())
            .instrument(self.span.clone())
            .await;
        match self.apply(fetched)? {
            ApplyOutcome::Applied { level, count } => {
                Ok(SelectOutcome::OptionsReady { level, count })
            }
            ApplyOutcome::Stale => Ok(SelectOutcome::FetchRequired(ticket)),
        }
    }

    /// Re-run the frontier's pending fetch after a retryable failure
    pub async fn retry(&mut self) -> Result<Option<ApplyOutcome>, CascadeError> {
        let Some(ticket) = self.resolver.pending_ticket() else {
            return Ok(None);
        };
        debug!(
            parent: &self.span,
            level = %ticket.level,
            parent_id = %ticket.parent_id,
            "Retrying fetch"
        );
        let fetched = self.fetcher.fetch(ticket).instrument(self.span.clone()).await;
        self.apply(fetched).map(Some)
    }

    pub fn reset(&mut self, from: Level) -> Result<(), CascadeError> {
        let _entered = self.span.enter();
        self.resolver.reset(from)
    }

    /// Re-fetch the user's grants and recompute every option set
    pub async fn refresh_grants(&mut self) -> Result<(), CascadeError> {
        let span = self.span.clone();
        self.reload_grants().instrument(span).await
    }

    async fn reload_grants(&mut self) -> Result<(), CascadeError> {
        let user = self.resolver.authorization().user().clone();
        let source = Arc::clone(&self.fetcher.source);
        let grants = source.fetch_user_grants(&user.user_id).await?;

        let refreshed = self.strategy.authorize(user, grants.clone())?;
        expand_channels(
            source.as_ref(),
            &self.strategy,
            &refreshed,
            self.resolver.catalog_mut(),
        )
        .await?;
        self.resolver.refresh_grants(grants)
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    pub fn resolved(&self) -> Result<ResolvedSelection, CascadeError> {
        self.resolver.resolved()
    }

    pub fn build_schema(
        &self,
        builder: &DynamicFormSchemaBuilder,
    ) -> Result<FormSchema, CascadeError> {
        Ok(builder.build(&self.resolved()?))
    }

    /// Canonicalize the selection, validate the record and persist both
    pub async fn submit<R: RecordSink + ?Sized>(
        &self,
        sink: &R,
        builder: &DynamicFormSchemaBuilder,
        canonical: &CanonicalTable,
        record: CustomerRecord,
    ) -> Result<RecordId, CascadeError> {
        let resolved = self.resolved()?;
        let schema = builder.build(&resolved);
        let record = schema.validate(record)?;
        let selection = canonical.canonicalize_selection(&resolved)?;

        let id = sink
            .persist_selection(&selection, &record)
            .instrument(self.span.clone())
            .await?;
        info!(parent: &self.span, record_id = %id, offer = %resolved.offer.id, "Cascade submitted");
        Ok(id)
    }
}

/// Load the contract lines of every channel the entry level needs
async fn expand_channels<S: CatalogSource + ?Sized>(
    source: &S,
    strategy: &RoleEntryPointStrategy,
    authorization: &AuthorizationScope,
    catalog: &mut EntityCatalog,
) -> Result<(), CascadeError> {
    for channel in strategy.channels_to_expand(authorization, catalog)? {
        if catalog.is_loaded(Level::Channel, &channel) {
            continue;
        }
        let lines = source
            .fetch_children(Level::ContractLine, Some(&channel))
            .await?;
        debug!(channel = %channel, count = lines.len(), "Channel expanded");
        catalog.record_children(Level::Channel, &channel, lines)?;
    }
    Ok(())
}

impl<S> std::fmt::Debug for CascadeSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeSession")
            .field("id", &self.id)
            .field("frontier", &self.resolver.frontier())
            .field("generation", &self.resolver.generation())
            .finish()
    }
}
