use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A user's binding of one trigger type to an ordered list of reactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub action: Action,
    /// Execution order is list order.
    pub reactions: Vec<Reaction>,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Seconds to wait before executing. Absent or non-positive means immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
}

impl Reaction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: Map::new(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = Some(seconds);
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// The configured delay, if it is long enough to need a timer.
    pub fn effective_delay(&self) -> Option<Duration> {
        match self.delay {
            Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
                Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
            }
            _ => None,
        }
    }
}

pub(crate) fn service_prefix(kind: &str) -> &str {
    kind.split('.').next().unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMapping {
    pub name: String,
    pub description: Option<String>,
    pub action: Action,
    pub reactions: Vec<Reaction>,
    pub is_active: bool,
    pub created_by: i64,
}
