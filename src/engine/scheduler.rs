use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::error::ReactionError;
use super::executor::RetryExecutor;
use super::timers::{TimerRegistry, handle_id};
use crate::types::{Event, Mapping, Reaction};

/// Result of fanning out one mapping's reaction list.
#[derive(Debug, Default)]
pub struct MappingRun {
    pub executed: usize,
    pub scheduled: usize,
    /// Delayed reactions dropped because the engine was stopped.
    pub skipped: usize,
    pub failures: Vec<ReactionError>,
}

impl MappingRun {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs a mapping's reactions in list order, immediately or behind a cancellable timer.
#[derive(Clone)]
pub struct ReactionScheduler {
    timers: TimerRegistry,
    executor: RetryExecutor,
}

impl ReactionScheduler {
    pub fn new(timers: TimerRegistry, executor: RetryExecutor) -> Self {
        Self { timers, executor }
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Immediate reactions are awaited one after another. A failed reaction does not stop
    /// the ones after it. Delayed reactions are only registered here and fire later,
    /// outside the caller's lifetime.
    pub async fn run_mapping(&self, event: Arc<Event>, mapping: Arc<Mapping>) -> MappingRun {
        let mut run = MappingRun::default();

        for (index, reaction) in mapping.reactions.iter().enumerate() {
            match reaction.effective_delay() {
                Some(delay) => {
                    match self
                        .schedule_delayed(&event, &mapping, index, reaction, delay)
                        .await
                    {
                        Ok(true) => run.scheduled += 1,
                        Ok(false) => run.skipped += 1,
                        Err(e) => run.failures.push(e),
                    }
                }
                None => {
                    run.executed += 1;
                    if let Err(e) = self.executor.run(&event, &mapping, reaction).await {
                        run.failures.push(e);
                    }
                }
            }
        }

        run
    }

    async fn schedule_delayed(
        &self,
        event: &Arc<Event>,
        mapping: &Arc<Mapping>,
        index: usize,
        reaction: &Reaction,
        delay: Duration,
    ) -> Result<bool, ReactionError> {
        let id = handle_id(event.id, mapping.id, index);
        if self.timers.is_closed() {
            warn!(
                handle = %id,
                reaction_type = %reaction.kind,
                "engine stopped, delayed reaction skipped",
            );
            return Ok(false);
        }
        let record = self.executor.begin(event, reaction).await?;

        info!(
            handle = %id,
            reaction_type = %reaction.kind,
            delay_ms = delay.as_millis() as u64,
            "scheduled delayed reaction",
        );

        let executor = self.executor.clone();
        let event = Arc::clone(event);
        let mapping = Arc::clone(mapping);
        let reaction = reaction.clone();
        let handle = id.clone();
        let scheduled = self.timers.schedule(id.clone(), delay, async move {
            debug!(handle = %handle, "delayed reaction fired");
            if let Err(e) = executor.execute(&record, &event, &mapping, &reaction).await {
                error!(handle = %handle, error = %e, "delayed reaction failed");
            }
        });
        if !scheduled {
            warn!(handle = %id, "engine stopped while scheduling, delayed reaction left pending");
        }

        Ok(scheduled)
    }
}
