//! Storage ports consumed by the engine, plus the adapters that implement them.
//!
//! The engine only ever talks to the traits below. `SqliteStore` is the production
//! adapter, `MemoryStore` keeps everything in process for embedding and tests.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::types::{
    Event, EventOutcome, EventStatus, ExecutionUpdate, FailureRecord, Mapping,
    ReactionExecutionRecord, UserServiceConfig,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events in `status`, oldest first.
    async fn find_by_status(&self, status: EventStatus, limit: i64)
        -> Result<Vec<Event>, StoreError>;

    /// Moves a `received` event to its terminal status.
    ///
    /// Returns `false` when the event had already left `received`, in which case nothing
    /// is written.
    async fn save_outcome(&self, outcome: &EventOutcome) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn find_active(&self, owner: i64, action_type: &str)
        -> Result<Vec<Mapping>, StoreError>;

    /// Active mappings of `action_type` regardless of owner.
    async fn find_active_shared(&self, action_type: &str) -> Result<Vec<Mapping>, StoreError>;

    async fn find_one_active(&self, id: Uuid, owner: i64) -> Result<Option<Mapping>, StoreError>;
}

#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    async fn create_pending(
        &self,
        event_id: Uuid,
        reaction_name: &str,
    ) -> Result<ReactionExecutionRecord, StoreError>;

    /// Applies the single terminal update to a pending record.
    async fn finish(&self, record_id: Uuid, update: &ExecutionUpdate) -> Result<(), StoreError>;

    async fn record_failure(&self, failure: &FailureRecord) -> Result<(), StoreError>;

    async fn list_executions(&self, event_id: Uuid)
        -> Result<Vec<ReactionExecutionRecord>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user_service_config(
        &self,
        user_id: i64,
        service: &str,
    ) -> Result<Option<UserServiceConfig>, StoreError>;
}

pub(crate) fn now_utc() -> String {
    format_utc(Utc::now())
}

pub(crate) fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ensure_terminal(outcome: &EventOutcome) -> Result<(), StoreError> {
    if outcome.status.is_terminal() {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "event {} outcome must be terminal",
            outcome.event_id
        )))
    }
}
