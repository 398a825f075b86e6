use crate::store::StoreError;

/// Pipeline-level failure of one event. These, and only these, end an event as `failed`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown action type: {0}")]
    UnknownAction(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of one logical reaction invocation, after any retries.
#[derive(Debug, thiserror::Error)]
pub enum ReactionError {
    #[error("Unknown reaction type: {0}")]
    UnknownReaction(String),
    #[error("{message}")]
    Exhausted { attempts: u32, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
