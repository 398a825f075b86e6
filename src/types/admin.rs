use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ScheduledReactionView {
    pub id: String,
    pub fire_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListScheduledResponse {
    pub reactions: Vec<ScheduledReactionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CancelScheduledResponse {
    pub id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct EngineStatusResponse {
    pub running: bool,
    pub scheduled: i64,
}
