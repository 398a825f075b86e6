use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A persisted inbound trigger occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Dotted `{service}.{action}` type.
    pub action_type: String,
    pub user_id: i64,
    /// Narrows matching to a single mapping when the webhook is known to belong to it.
    pub mapping_id: Option<Uuid>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub payload: Value,

    pub status: EventStatus,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,

    pub user_agent: Option<String>,
    pub signature_verified: bool,

    pub created_at: String,
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Received,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Received => "received",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Received)
    }
}

/// Terminal bookkeeping written back once an event has been dispatched.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub event_id: Uuid,
    pub status: EventStatus,
    pub processing_time_ms: i64,
    pub error_message: Option<String>,
}

/// Ingestion-side shape of an event, before the store assigns status and timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEvent {
    pub action_type: String,
    pub user_id: i64,
    pub mapping_id: Option<Uuid>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub payload: Value,
    pub user_agent: Option<String>,
    pub signature_verified: bool,
}
