pub mod admin;
pub mod api_error;
pub mod event;
pub mod mapping;
pub mod reaction_execution;
pub mod service_config;

pub use admin::{
    CancelScheduledResponse, EngineStatusResponse, ListScheduledResponse, ScheduledReactionView,
};
pub use api_error::{ApiErrorCode, ApiErrorResponse};
pub use event::{Event, EventOutcome, EventStatus, NewEvent};
pub use mapping::{Action, Mapping, NewMapping, Reaction};
pub use reaction_execution::{
    ExecutionUpdate, FailureRecord, ReactionExecutionRecord, ReactionExecutionStatus,
};
pub use service_config::UserServiceConfig;
