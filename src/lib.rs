//! Offer Cascade - Authorization-scoped offer assignment resolver
//!
//! Resolves the commercial configuration assigned to a new customer record
//! by walking a strictly ordered cascade of dependent selections, narrowed at
//! every step by the acting user's authorization scope.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Form layer: dropdowns, record form, submit                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   CascadeSession (async)                        │
//! │     open ─► select/reset ─► build_schema ─► submit              │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌─────────────────┐ ┌───────────────────┐ ┌──────────────────────┐
//! │ RoleEntryPoint  │ │ CascadeResolver   │ │ DynamicFormSchema    │
//! │ Strategy        │ │ (frontier, tickets│ │ Builder +            │
//! │ + Authorization │ │  generations)     │ │ CanonicalTable       │
//! │   Scope         │ │                   │ │                      │
//! └─────────────────┘ └───────────────────┘ └──────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Collaborators: CatalogSource (children, grants), RecordSink    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use offer_cascade::{CascadeConfig, CascadeSession, DynamicFormSchemaBuilder, Level};
//!
//! let config = CascadeConfig::load()?;
//! offer_cascade::telemetry::init(&config.log_filter);
//!
//! let mut session = CascadeSession::open(source, &config.strategy(), user).await?;
//! session.select(Level::Channel, &"ch-x".into()).await?;
//! // ... down to the offer
//! let schema = session.build_schema(&DynamicFormSchemaBuilder::new())?;
//! let record_id = session
//!     .submit(&sink, &DynamicFormSchemaBuilder::new(), &config.canonical, record)
//!     .await?;
//! ```

pub mod catalog;
pub mod config;
pub mod entry;
pub mod error;
pub mod persist;
pub mod resolver;
pub mod schema;
pub mod scope;
pub mod telemetry;

pub use catalog::{
    CatalogSource, ContractCategory, EntityCatalog, EntityId, EntityRef, Level, SegmentKind,
    StaticCatalogSource,
};
pub use config::CascadeConfig;
pub use entry::{RoleEntryPointStrategy, RoleProfile, RoleTable};
pub use error::{CascadeError, ConfigError, ErrorClass, PersistError, SourceError};
pub use persist::{InMemoryRecordSink, RecordId, RecordSink};
pub use resolver::{
    ApplyOutcome, CascadeResolver, CascadeSession, FetchTicket, FetchedChildren, Fetcher,
    OptionSet, ResolvedSelection, SelectOutcome, SelectionState,
};
pub use schema::{
    CanonicalSelection, CanonicalTable, CustomerRecord, DynamicFormSchemaBuilder, FieldRule,
    FormField, FormSchema,
};
pub use scope::{
    AuthorizationGrant, AuthorizationScope, Principal, Role, Scope, UngrantedScope, UserContext,
    UserId,
};
