use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::error::EngineError;
use super::matcher::MappingMatcher;
use super::scheduler::ReactionScheduler;
use crate::registry::ServiceRegistry;
use crate::store::{EventStore, StoreError};
use crate::types::{Event, EventOutcome, EventStatus};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub fetched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Events whose terminal status could not be written.
    pub errored: usize,
}

/// Pulls received events and drives each through matching and reaction fan-out.
#[derive(Clone)]
pub struct Dispatcher {
    events: Arc<dyn EventStore>,
    registry: Arc<ServiceRegistry>,
    matcher: MappingMatcher,
    scheduler: ReactionScheduler,
    batch_size: i64,
}

impl Dispatcher {
    pub fn new(
        events: Arc<dyn EventStore>,
        registry: Arc<ServiceRegistry>,
        matcher: MappingMatcher,
        scheduler: ReactionScheduler,
        batch_size: i64,
    ) -> Self {
        Self {
            events,
            registry,
            matcher,
            scheduler,
            batch_size,
        }
    }

    /// One dispatch pass. Events of the batch are processed concurrently and independently.
    pub async fn run_pass(&self) -> Result<PassSummary, StoreError> {
        let events = self
            .events
            .find_by_status(EventStatus::Received, self.batch_size)
            .await?;

        let mut summary = PassSummary {
            fetched: events.len(),
            ..Default::default()
        };
        if events.is_empty() {
            return Ok(summary);
        }

        let mut tasks = JoinSet::new();
        for event in events {
            let dispatcher = self.clone();
            tasks.spawn(async move {
                let event_id = event.id;
                (event_id, dispatcher.process_event(event).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(EventStatus::Completed))) => summary.completed += 1,
                Ok((_, Ok(_))) => summary.failed += 1,
                Ok((event_id, Err(e))) => {
                    error!(event_id = %event_id, error = %e, "failed to record event outcome");
                    summary.errored += 1;
                }
                Err(e) => {
                    error!(error = %e, "event task aborted");
                    summary.errored += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Processes one event and writes its terminal status. Reaction failures never make
    /// the event fail, only pipeline errors do.
    pub async fn process_event(&self, event: Event) -> Result<EventStatus, StoreError> {
        let started = Instant::now();
        let event = Arc::new(event);

        let (status, error_message) = match self.dispatch(&event).await {
            Ok(()) => (EventStatus::Completed, None),
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    action_type = %event.action_type,
                    error = %e,
                    "event processing failed",
                );
                (EventStatus::Failed, Some(e.to_string()))
            }
        };

        let outcome = EventOutcome {
            event_id: event.id,
            status,
            processing_time_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
            error_message,
        };
        if !self.events.save_outcome(&outcome).await? {
            warn!(event_id = %event.id, "event already left received, outcome not written");
        }

        Ok(status)
    }

    async fn dispatch(&self, event: &Arc<Event>) -> Result<(), EngineError> {
        let action = self
            .registry
            .action(&event.action_type)
            .ok_or_else(|| EngineError::UnknownAction(event.action_type.clone()))?;

        let mappings = self.matcher.resolve(event, action).await?;
        if mappings.is_empty() {
            debug!(event_id = %event.id, action_type = %event.action_type, "no matching mappings");
            return Ok(());
        }

        info!(
            event_id = %event.id,
            action_type = %event.action_type,
            mappings = mappings.len(),
            "dispatching event",
        );

        let mut fan_out = JoinSet::new();
        for mapping in mappings {
            let scheduler = self.scheduler.clone();
            let event = Arc::clone(event);
            fan_out.spawn(async move {
                let mapping_id = mapping.id;
                (mapping_id, scheduler.run_mapping(event, Arc::new(mapping)).await)
            });
        }

        while let Some(joined) = fan_out.join_next().await {
            match joined {
                Ok((mapping_id, run)) if !run.is_success() => {
                    warn!(
                        event_id = %event.id,
                        mapping_id = %mapping_id,
                        failed = run.failures.len(),
                        executed = run.executed,
                        scheduled = run.scheduled,
                        skipped = run.skipped,
                        "mapping reactions failed",
                    );
                }
                Ok((mapping_id, run)) => {
                    debug!(
                        event_id = %event.id,
                        mapping_id = %mapping_id,
                        executed = run.executed,
                        scheduled = run.scheduled,
                        skipped = run.skipped,
                        "mapping reactions finished",
                    );
                }
                Err(e) => {
                    error!(event_id = %event.id, error = %e, "mapping fan-out aborted");
                }
            }
        }

        Ok(())
    }
}
