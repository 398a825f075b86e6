use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::store::format_utc;

/// Handle id of the reaction at `index` in a mapping, for one event.
pub fn handle_id(event_id: Uuid, mapping_id: Uuid, index: usize) -> String {
    format!("{event_id}-{mapping_id}-{index}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReaction {
    pub id: String,
    pub fire_at: String,
}

struct Timer {
    seq: u64,
    token: CancellationToken,
    fire_at: DateTime<Utc>,
}

#[derive(Default)]
struct Timers {
    entries: HashMap<String, Timer>,
    closed: bool,
}

/// Outstanding delayed jobs keyed by handle id.
///
/// A handle is registered before its timer can fire and is removed by the timer itself
/// right before the job starts. From then on the job cannot be cancelled.
///
/// A closed registry refuses new jobs until it is reopened.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    timers: Arc<Mutex<Timers>>,
    next_seq: Arc<AtomicU64>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` after `delay` unless the handle is cancelled first. Returns `false`, and
    /// drops `job`, when the registry is closed.
    ///
    /// Registering an id that is already outstanding cancels the earlier timer.
    pub fn schedule<F>(&self, id: String, delay: Duration, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let fire_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let previous = {
            let mut timers = self.lock();
            if timers.closed {
                debug!(handle = %id, "timer registry closed, job dropped");
                return false;
            }
            timers.entries.insert(
                id.clone(),
                Timer {
                    seq,
                    token: token.clone(),
                    fire_at,
                },
            )
        };
        if let Some(previous) = previous {
            debug!(handle = %id, "replacing outstanding timer");
            previous.token.cancel();
        }

        let registry = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if registry.claim(&id, seq) {
                job.await;
            }
        });
        true
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().entries.remove(id) {
            Some(timer) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every outstanding timer and returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Timer> = self.lock().entries.drain().map(|(_, timer)| timer).collect();
        cancel_drained(&drained)
    }

    /// Cancels every outstanding timer and refuses new ones until [`TimerRegistry::reopen`].
    pub fn close(&self) -> usize {
        let drained: Vec<Timer> = {
            let mut timers = self.lock();
            timers.closed = true;
            timers.entries.drain().map(|(_, timer)| timer).collect()
        };
        cancel_drained(&drained)
    }

    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn scheduled(&self) -> Vec<ScheduledReaction> {
        let timers = self.lock();
        let mut entries: Vec<(&String, &Timer)> = timers.entries.iter().collect();
        entries.sort_by(|a, b| a.1.fire_at.cmp(&b.1.fire_at).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .map(|(id, timer)| ScheduledReaction {
                id: id.clone(),
                fire_at: format_utc(timer.fire_at),
            })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the handle if it still belongs to the timer identified by `seq`.
    fn claim(&self, id: &str, seq: u64) -> bool {
        let mut timers = self.lock();
        match timers.entries.get(id) {
            Some(timer) if timer.seq == seq => {
                timers.entries.remove(id);
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn cancel_drained(drained: &[Timer]) -> usize {
    for timer in drained {
        timer.token.cancel();
    }
    drained.len()
}
