//! Record persistence collaborator
//!
//! The cascade ends by handing the canonical selection and the validated
//! customer record to a [`RecordSink`]. The resolver only guarantees the
//! selection part of the payload is consistent and canonical; everything
//! else about storage belongs to the sink.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PersistError;
use crate::schema::{CanonicalSelection, CustomerRecord};

/// Identifier of a persisted customer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creates customer records from a completed cascade
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist_selection(
        &self,
        selection: &CanonicalSelection,
        record: &CustomerRecord,
    ) -> Result<RecordId, PersistError>;
}

/// A record accepted by [`InMemoryRecordSink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedRecord {
    pub id: RecordId,
    pub selection: CanonicalSelection,
    pub record: CustomerRecord,
}

/// Sink keeping records in memory, for tests and demos
#[derive(Debug, Default)]
pub struct InMemoryRecordSink {
    records: Mutex<Vec<PersistedRecord>>,
    rejection: Mutex<Option<PersistError>>,
}

impl InMemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `persist_selection` call fail with `error`
    pub async fn reject_next(&self, error: PersistError) {
        *self.rejection.lock().await = Some(error);
    }

    pub async fn records(&self) -> Vec<PersistedRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn persist_selection(
        &self,
        selection: &CanonicalSelection,
        record: &CustomerRecord,
    ) -> Result<RecordId, PersistError> {
        if let Some(error) = self.rejection.lock().await.take() {
            return Err(error);
        }

        let id = RecordId::new();
        self.records.lock().await.push(PersistedRecord {
            id,
            selection: selection.clone(),
            record: record.clone(),
        });
        tracing::info!(record_id = %id, "Customer record persisted");
        Ok(id)
    }
}
