use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::config::RetryPolicy;
use super::credentials::CredentialResolver;
use super::error::ReactionError;
use super::interpolate::interpolate_config;
use crate::registry::{ReactionContext, ServiceRegistry};
use crate::store::{ExecutionRecorder, StoreError, now_utc};
use crate::types::{
    Event, ExecutionUpdate, FailureRecord, Mapping, Reaction, ReactionExecutionRecord,
    ReactionExecutionStatus,
};

/// Invokes one reaction through its capability with bounded retry, recording the
/// outcome on a single execution record.
#[derive(Clone)]
pub struct RetryExecutor {
    registry: Arc<ServiceRegistry>,
    recorder: Arc<dyn ExecutionRecorder>,
    credentials: CredentialResolver,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        recorder: Arc<dyn ExecutionRecorder>,
        credentials: CredentialResolver,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            recorder,
            credentials,
            policy,
        }
    }

    /// Creates the pending record the attempts will report to.
    pub async fn begin(
        &self,
        event: &Event,
        reaction: &Reaction,
    ) -> Result<ReactionExecutionRecord, StoreError> {
        self.recorder.create_pending(event.id, &reaction.kind).await
    }

    pub async fn run(
        &self,
        event: &Event,
        mapping: &Mapping,
        reaction: &Reaction,
    ) -> Result<Option<Value>, ReactionError> {
        let record = self.begin(event, reaction).await?;
        self.execute(&record, event, mapping, reaction).await
    }

    /// Drives the attempts for an already-created pending record.
    pub async fn execute(
        &self,
        record: &ReactionExecutionRecord,
        event: &Event,
        mapping: &Mapping,
        reaction: &Reaction,
    ) -> Result<Option<Value>, ReactionError> {
        let started = Instant::now();

        let Some(resolved) = self.registry.reaction(&reaction.kind) else {
            let err = ReactionError::UnknownReaction(reaction.kind.clone());
            warn!(
                event_id = %event.id,
                mapping_id = %mapping.id,
                reaction_type = %reaction.kind,
                "unknown reaction type, not retrying",
            );
            self.fail(record, event, &err.to_string(), 0, started).await?;
            return Err(err);
        };
        let reaction_name = resolved.definition.name.clone();
        let executor = resolved.executor;

        let service_config = self
            .credentials
            .resolve(&reaction.kind, mapping.created_by)
            .await;
        let ctx = ReactionContext {
            reaction: Reaction {
                kind: reaction.kind.clone(),
                config: interpolate_config(&reaction.config, &event.payload),
                delay: reaction.delay,
            },
            event: event.into(),
            mapping: mapping.into(),
            service_config,
        };

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            let message = match executor.execute(&ctx).await {
                Ok(outcome) if outcome.success => {
                    self.recorder
                        .finish(
                            record.id,
                            &ExecutionUpdate {
                                status: ReactionExecutionStatus::Completed,
                                output_data: outcome.output.clone(),
                                error_message: None,
                                execution_time_ms: elapsed_ms(started),
                            },
                        )
                        .await?;
                    info!(
                        event_id = %event.id,
                        mapping_id = %mapping.id,
                        reaction_type = %reaction.kind,
                        reaction = %reaction_name,
                        attempt,
                        "reaction completed",
                    );
                    return Ok(outcome.output);
                }
                Ok(outcome) => outcome
                    .error
                    .unwrap_or_else(|| format!("reaction {} reported failure", reaction.kind)),
                Err(e) => format!("{e:#}"),
            };

            if attempt >= self.policy.max_attempts {
                break message;
            }

            let backoff = self.policy.backoff_after(attempt);
            warn!(
                event_id = %event.id,
                reaction_type = %reaction.kind,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %message,
                "reaction attempt failed, retrying",
            );
            tokio::time::sleep(backoff).await;
        };

        error!(
            event_id = %event.id,
            mapping_id = %mapping.id,
            reaction_type = %reaction.kind,
            reaction = %reaction_name,
            attempts = attempt,
            error = %last_error,
            "reaction failed permanently",
        );
        self.fail(record, event, &last_error, attempt, started)
            .await?;
        Err(ReactionError::Exhausted {
            attempts: attempt,
            message: last_error,
        })
    }

    async fn fail(
        &self,
        record: &ReactionExecutionRecord,
        event: &Event,
        message: &str,
        retry_count: u32,
        started: Instant,
    ) -> Result<(), StoreError> {
        self.recorder
            .finish(
                record.id,
                &ExecutionUpdate {
                    status: ReactionExecutionStatus::Failed,
                    output_data: None,
                    error_message: Some(message.to_string()),
                    execution_time_ms: elapsed_ms(started),
                },
            )
            .await?;

        self.recorder
            .record_failure(&FailureRecord {
                action_type: event.action_type.clone(),
                payload: event.payload.clone(),
                error_message: message.to_string(),
                retry_count,
                user_agent: event.user_agent.clone(),
                created_at: now_utc(),
            })
            .await
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
