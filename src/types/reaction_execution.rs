use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One logical reaction invocation, shared by all of its retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionExecutionRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub reaction_name: String,
    pub status: ReactionExecutionStatus,
    pub output_data: Option<Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub executed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReactionExecutionStatus {
    Pending,
    Completed,
    Failed,
}

impl ReactionExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionExecutionStatus::Pending => "pending",
            ReactionExecutionStatus::Completed => "completed",
            ReactionExecutionStatus::Failed => "failed",
        }
    }
}

/// Terminal update applied to a pending record.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: ReactionExecutionStatus,
    pub output_data: Option<Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
}

/// Permanent-failure audit entry. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub action_type: String,
    pub payload: Value,
    pub error_message: String,
    pub retry_count: u32,
    pub user_agent: Option<String>,
    pub created_at: String,
}
