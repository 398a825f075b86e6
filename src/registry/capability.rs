use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{Event, Mapping, Reaction, UserServiceConfig};

/// Performs the concrete side effect for every reaction type of one service.
#[async_trait]
pub trait ReactionExecutor: Send + Sync {
    async fn execute(&self, ctx: &ReactionContext) -> anyhow::Result<ReactionOutcome>;
}

/// Live credential accessor for a service, e.g. one backed by an OAuth token store.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, user_id: i64) -> anyhow::Result<BTreeMap<String, String>>;
}

/// Narrows the candidates of a shared action to the mappings interested in one event.
#[async_trait]
pub trait SharedEventFilter: Send + Sync {
    async fn matches(&self, event: &Event, mapping: &Mapping) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionContext {
    /// The reaction with its config already interpolated against the event payload.
    pub reaction: Reaction,
    pub event: EventContext,
    pub mapping: MappingContext,
    pub service_config: UserServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub id: Uuid,
    pub action_type: String,
    pub user_id: i64,
    pub payload: Value,
    pub created_at: String,
}

impl From<&Event> for EventContext {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            action_type: event.action_type.clone(),
            user_id: event.user_id,
            payload: event.payload.clone(),
            created_at: event.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingContext {
    pub id: Uuid,
    pub name: String,
    pub created_by: i64,
}

impl From<&Mapping> for MappingContext {
    fn from(mapping: &Mapping) -> Self {
        Self {
            id: mapping.id,
            name: mapping.name.clone(),
            created_by: mapping.created_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionOutcome {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ReactionOutcome {
    pub fn succeeded(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(reason.into()),
        }
    }
}

#[derive(Clone)]
pub struct ActionDefinition {
    /// Full dotted type, e.g. `github.push`.
    pub id: String,
    pub name: String,
    pub description: String,
    /// One inbound event may serve mappings of every owner.
    pub shared_events: bool,
    pub shared_filter: Option<Arc<dyn SharedEventFilter>>,
}

impl ActionDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            shared_events: false,
            shared_filter: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared_events = true;
        self
    }

    pub fn shared_filter(mut self, filter: Arc<dyn SharedEventFilter>) -> Self {
        self.shared_events = true;
        self.shared_filter = Some(filter);
        self
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shared_events", &self.shared_events)
            .field("shared_filter", &self.shared_filter.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ReactionDefinition {
    /// Full dotted type, e.g. `slack.post`.
    pub id: String,
    pub name: String,
    pub description: String,
}

impl ReactionDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
