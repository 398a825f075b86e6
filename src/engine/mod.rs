//! The event processing and reaction execution engine.
//!
//! ```text
//! Engine (poll loop)
//!     └─► Dispatcher ─► MappingMatcher
//!             └─► ReactionScheduler ─► TimerRegistry (delayed)
//!                     └─► RetryExecutor ─► ExecutionRecorder
//! ```

mod config;
mod credentials;
mod dispatcher;
mod error;
mod executor;
mod interpolate;
mod matcher;
mod scheduler;
mod timers;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use config::{EngineConfig, RetryPolicy};
pub use credentials::CredentialResolver;
pub use dispatcher::{Dispatcher, PassSummary};
pub use error::{EngineError, ReactionError};
pub use executor::RetryExecutor;
pub use interpolate::{interpolate_config, interpolate_str};
pub use matcher::MappingMatcher;
pub use scheduler::{MappingRun, ReactionScheduler};
pub use timers::{ScheduledReaction, TimerRegistry, handle_id};

use crate::registry::ServiceRegistry;
use crate::store::{CredentialStore, EventStore, ExecutionRecorder, MappingStore, StoreError};

/// The stores the engine reads from and writes to.
#[derive(Clone)]
pub struct EngineStores {
    pub events: Arc<dyn EventStore>,
    pub mappings: Arc<dyn MappingStore>,
    pub recorder: Arc<dyn ExecutionRecorder>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl EngineStores {
    /// All four ports backed by one store.
    pub fn shared<S>(store: S) -> Self
    where
        S: EventStore + MappingStore + ExecutionRecorder + CredentialStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            events: store.clone(),
            mappings: store.clone(),
            recorder: store.clone(),
            credentials: store,
        }
    }
}

pub struct Engine {
    dispatcher: Dispatcher,
    timers: TimerRegistry,
    poll_interval: Duration,
    lifecycle: Mutex<Option<CancellationToken>>,
}

impl Engine {
    pub fn new(stores: EngineStores, registry: Arc<ServiceRegistry>, config: EngineConfig) -> Self {
        Self::with_timers(stores, registry, config, TimerRegistry::new())
    }

    pub fn with_timers(
        stores: EngineStores,
        registry: Arc<ServiceRegistry>,
        config: EngineConfig,
        timers: TimerRegistry,
    ) -> Self {
        let credentials = CredentialResolver::new(registry.clone(), stores.credentials);
        let executor = RetryExecutor::new(
            registry.clone(),
            stores.recorder,
            credentials,
            config.retry,
        );
        let scheduler = ReactionScheduler::new(timers.clone(), executor);
        let matcher = MappingMatcher::new(stores.mappings);
        let dispatcher = Dispatcher::new(
            stores.events,
            registry,
            matcher,
            scheduler,
            config.batch_size,
        );

        Self {
            dispatcher,
            timers,
            poll_interval: config.poll_interval,
            lifecycle: Mutex::new(None),
        }
    }

    /// Runs one pass right away, then one per poll interval until [`Engine::stop`].
    ///
    /// Passes are spawned, so a slow pass does not hold back the next one.
    pub async fn start(&self) {
        let token = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.is_some() {
                debug!("engine already running");
                return;
            }
            let token = CancellationToken::new();
            *lifecycle = Some(token.clone());
            self.timers.reopen();
            token
        };

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "starting reaction engine",
        );
        run_logged_pass(&self.dispatcher).await;

        let dispatcher = self.dispatcher.clone();
        let poll_interval = self.poll_interval;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move { run_logged_pass(&dispatcher).await });
                    }
                }
            }
            debug!("dispatch loop stopped");
        });
    }

    /// Stops future passes and drops every delayed reaction that has not fired yet.
    /// Reactions already executing run to completion. Passes still in flight can no longer
    /// schedule delayed reactions.
    pub fn stop(&self) {
        let token = self.lifecycle().take();
        let cancelled = self.timers.close();
        if let Some(token) = token {
            token.cancel();
            info!(cancelled_reactions = cancelled, "reaction engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().is_some()
    }

    pub async fn run_pass(&self) -> Result<PassSummary, StoreError> {
        self.dispatcher.run_pass().await
    }

    pub fn cancel_scheduled_reaction(&self, id: &str) -> bool {
        let cancelled = self.timers.cancel(id);
        if cancelled {
            info!(handle = %id, "cancelled scheduled reaction");
        }
        cancelled
    }

    pub fn list_scheduled_reactions(&self) -> Vec<String> {
        self.timers.ids()
    }

    pub fn scheduled_reactions(&self) -> Vec<ScheduledReaction> {
        self.timers.scheduled()
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    fn lifecycle(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn run_logged_pass(dispatcher: &Dispatcher) {
    match dispatcher.run_pass().await {
        Ok(summary) if summary.fetched > 0 => {
            info!(
                fetched = summary.fetched,
                completed = summary.completed,
                failed = summary.failed,
                errored = summary.errored,
                "dispatch pass finished",
            );
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "dispatch pass failed"),
    }
}
