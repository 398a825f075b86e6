#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use area_engine::engine::{TimerRegistry, handle_id};
use uuid::Uuid;

fn counting_job(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
    let counter = counter.clone();
    async move {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn job_runs_once_after_its_delay() {
    let timers = TimerRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    timers.schedule("a".to_string(), Duration::from_secs(5), counting_job(&fired));
    assert!(timers.contains("a"));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(timers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn handle_is_released_before_the_job_runs() {
    let timers = TimerRegistry::new();
    let (tx, rx) = tokio::sync::oneshot::channel();

    let probe = timers.clone();
    timers.schedule("a".to_string(), Duration::from_secs(1), async move {
        let _ = tx.send(probe.contains("a"));
    });

    let still_registered = rx.await.expect("job ran");
    assert!(!still_registered);
    assert!(!timers.cancel("a"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_job_never_runs() {
    let timers = TimerRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    timers.schedule("a".to_string(), Duration::from_secs(5), counting_job(&fired));
    assert!(timers.cancel("a"));
    assert!(!timers.cancel("a"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn rescheduling_an_id_replaces_the_earlier_timer() {
    let timers = TimerRegistry::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    timers.schedule("a".to_string(), Duration::from_secs(2), counting_job(&first));
    timers.schedule("a".to_string(), Duration::from_secs(4), counting_job(&second));
    assert_eq!(timers.len(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_reports_how_many_were_dropped() {
    let timers = TimerRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    for id in ["a", "b", "c"] {
        timers.schedule(id.to_string(), Duration::from_secs(3), counting_job(&fired));
    }
    assert_eq!(timers.ids(), vec!["a", "b", "c"]);

    assert_eq!(timers.cancel_all(), 3);
    assert_eq!(timers.cancel_all(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduled_lists_soonest_first() {
    let timers = TimerRegistry::new();
    timers.schedule("late".to_string(), Duration::from_secs(3600), async {});
    timers.schedule("soon".to_string(), Duration::from_secs(60), async {});

    let scheduled = timers.scheduled();
    let ids: Vec<&str> = scheduled.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["soon", "late"]);
    assert!(scheduled[0].fire_at.ends_with('Z'));
}

#[test]
fn handle_id_joins_event_mapping_and_index() {
    let event_id = Uuid::nil();
    let mapping_id = Uuid::new_v4();
    assert_eq!(
        handle_id(event_id, mapping_id, 2),
        format!("{event_id}-{mapping_id}-2")
    );
}

#[tokio::test(start_paused = true)]
async fn closed_registry_refuses_jobs_until_reopened() {
    let timers = TimerRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    timers.schedule("a".to_string(), Duration::from_secs(5), counting_job(&fired));
    assert_eq!(timers.close(), 1);
    assert!(timers.is_closed());

    assert!(!timers.schedule("b".to_string(), Duration::from_secs(1), counting_job(&fired)));
    assert!(timers.is_empty());

    timers.reopen();
    assert!(timers.schedule("c".to_string(), Duration::from_secs(1), counting_job(&fired)));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
