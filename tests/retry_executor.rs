#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use area_engine::{
    engine::{CredentialResolver, ReactionError, RetryExecutor, RetryPolicy},
    registry::{
        CredentialProvider, ReactionContext, ReactionDefinition, ReactionExecutor,
        ReactionOutcome, ServiceDescriptor, ServiceRegistry,
    },
    store::MemoryStore,
    types::{
        Action, Event, Mapping, NewEvent, NewMapping, Reaction, ReactionExecutionStatus,
        UserServiceConfig,
    },
};
use async_trait::async_trait;
use serde_json::{Map, json};
use tokio::time::Instant;

enum Failure {
    Error,
    Reported,
}

/// Fails the first `failures` calls, then succeeds.
struct ScriptedExecutor {
    failures: u32,
    mode: Failure,
    calls: AtomicU32,
    seen: Mutex<Vec<ReactionContext>>,
}

impl ScriptedExecutor {
    fn new(failures: u32, mode: Failure) -> Arc<Self> {
        Arc::new(Self {
            failures,
            mode,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_context(&self) -> ReactionContext {
        self.seen.lock().unwrap().last().cloned().expect("executor was called")
    }
}

#[async_trait]
impl ReactionExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: &ReactionContext) -> anyhow::Result<ReactionOutcome> {
        self.seen.lock().unwrap().push(ctx.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return match self.mode {
                Failure::Error => Err(anyhow::anyhow!("attempt {call} timed out")),
                Failure::Reported => Ok(ReactionOutcome::failed("rate limited")),
            };
        }
        Ok(ReactionOutcome::succeeded(json!({ "call": call })))
    }
}

struct StaticCredentials(Option<&'static str>);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _user_id: i64) -> anyhow::Result<BTreeMap<String, String>> {
        match self.0 {
            Some(token) => Ok(BTreeMap::from([("token".to_string(), token.to_string())])),
            None => anyhow::bail!("token store offline"),
        }
    }
}

struct Fixture {
    store: MemoryStore,
    executor: RetryExecutor,
    event: Event,
    mapping: Mapping,
}

fn fixture(services: Vec<ServiceDescriptor>) -> Fixture {
    let mut registry = ServiceRegistry::new();
    for service in services {
        registry.register(service).unwrap();
    }
    let registry = Arc::new(registry);

    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());
    let executor = RetryExecutor::new(
        registry.clone(),
        shared.clone(),
        CredentialResolver::new(registry, shared),
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        },
    );

    let event = store.insert_event(NewEvent {
        action_type: "github.push".to_string(),
        user_id: 42,
        payload: json!({ "ref": "main" }),
        user_agent: Some("GitHub-Hookshot/abc".to_string()),
        ..Default::default()
    });
    let mapping = store.insert_mapping(NewMapping {
        name: "deploy".to_string(),
        description: None,
        action: Action {
            kind: "github.push".to_string(),
            config: Map::new(),
        },
        reactions: Vec::new(),
        is_active: true,
        created_by: 42,
    });

    Fixture {
        store,
        executor,
        event,
        mapping,
    }
}

fn service(name: &str, executor: Arc<ScriptedExecutor>) -> ServiceDescriptor {
    ServiceDescriptor::new(name)
        .reaction(ReactionDefinition::new(format!("{name}.run"), "Run"))
        .executor(executor)
}

#[tokio::test(start_paused = true)]
async fn retries_with_backoff_until_success() {
    let scripted = ScriptedExecutor::new(2, Failure::Error);
    let f = fixture(vec![service("ci", scripted.clone())]);

    let started = Instant::now();
    let output = f
        .executor
        .run(&f.event, &f.mapping, &Reaction::new("ci.run"))
        .await
        .expect("third attempt succeeds");

    assert_eq!(output, Some(json!({ "call": 3 })));
    assert_eq!(scripted.calls(), 3);
    // 1s after the first failure, 2s after the second.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");

    let records = f.store.executions();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ReactionExecutionStatus::Completed);
    assert_eq!(records[0].output_data, Some(json!({ "call": 3 })));
    assert!(records[0].executed_at.is_some());
    assert!(f.store.failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_write_one_failed_record_and_one_failure() {
    let scripted = ScriptedExecutor::new(u32::MAX, Failure::Error);
    let f = fixture(vec![service("ci", scripted.clone())]);

    let err = f
        .executor
        .run(&f.event, &f.mapping, &Reaction::new("ci.run"))
        .await
        .expect_err("all attempts fail");

    assert!(matches!(err, ReactionError::Exhausted { attempts: 3, .. }));
    assert_eq!(scripted.calls(), 3);

    let records = f.store.executions();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ReactionExecutionStatus::Failed);
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("attempt 3 timed out")
    );

    let failures = f.store.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].retry_count, 3);
    assert_eq!(failures[0].action_type, "github.push");
    assert_eq!(failures[0].payload, json!({ "ref": "main" }));
    assert_eq!(failures[0].user_agent.as_deref(), Some("GitHub-Hookshot/abc"));
}

#[tokio::test(start_paused = true)]
async fn reported_failure_counts_as_a_failed_attempt() {
    let scripted = ScriptedExecutor::new(u32::MAX, Failure::Reported);
    let f = fixture(vec![service("ci", scripted.clone())]);

    let err = f
        .executor
        .run(&f.event, &f.mapping, &Reaction::new("ci.run"))
        .await
        .expect_err("all attempts fail");

    assert_eq!(err.to_string(), "rate limited");
    assert_eq!(scripted.calls(), 3);
    assert_eq!(f.store.failures()[0].error_message, "rate limited");
}

#[tokio::test(start_paused = true)]
async fn unknown_reaction_fails_without_retrying() {
    let scripted = ScriptedExecutor::new(0, Failure::Error);
    let f = fixture(vec![
        service("ci", scripted.clone()),
        ServiceDescriptor::new("mute").reaction(ReactionDefinition::new("mute.run", "Run")),
    ]);

    for kind in ["ghost.do", "ci.missing", "mute.run"] {
        let err = f
            .executor
            .run(&f.event, &f.mapping, &Reaction::new(kind))
            .await
            .expect_err("unknown reaction");
        assert_eq!(err.to_string(), format!("Unknown reaction type: {kind}"));
    }

    assert_eq!(scripted.calls(), 0);
    let failures = f.store.failures();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|failure| failure.retry_count == 0));
    assert!(
        f.store
            .executions()
            .iter()
            .all(|record| record.status == ReactionExecutionStatus::Failed)
    );
}

#[tokio::test(start_paused = true)]
async fn credential_provider_takes_precedence_over_stored_config() {
    let scripted = ScriptedExecutor::new(0, Failure::Error);
    let f = fixture(vec![
        service("ci", scripted.clone()).credentials(Arc::new(StaticCredentials(Some("live")))),
    ]);
    f.store.set_user_service_config(
        42,
        "ci",
        UserServiceConfig {
            credentials: BTreeMap::from([("token".to_string(), "stored".to_string())]),
            ..Default::default()
        },
    );

    f.executor
        .run(&f.event, &f.mapping, &Reaction::new("ci.run"))
        .await
        .expect("reaction succeeds");

    let ctx = scripted.last_context();
    assert_eq!(ctx.service_config.credentials["token"], "live");
}

#[tokio::test(start_paused = true)]
async fn failing_credential_provider_yields_empty_credentials() {
    let scripted = ScriptedExecutor::new(0, Failure::Error);
    let f = fixture(vec![
        service("ci", scripted.clone()).credentials(Arc::new(StaticCredentials(None))),
    ]);
    f.store.set_user_service_config(
        42,
        "ci",
        UserServiceConfig {
            credentials: BTreeMap::from([("token".to_string(), "stored".to_string())]),
            ..Default::default()
        },
    );

    f.executor
        .run(&f.event, &f.mapping, &Reaction::new("ci.run"))
        .await
        .expect("reaction still attempted");

    assert_eq!(scripted.last_context().service_config, UserServiceConfig::default());
}

#[tokio::test(start_paused = true)]
async fn stored_config_is_used_without_a_provider() {
    let scripted = ScriptedExecutor::new(0, Failure::Error);
    let f = fixture(vec![service("ci", scripted.clone()).oauth()]);
    let mut settings = Map::new();
    settings.insert("region".to_string(), json!("eu"));
    let stored = UserServiceConfig {
        credentials: BTreeMap::from([("token".to_string(), "stored".to_string())]),
        settings,
    };
    f.store.set_user_service_config(42, "ci", stored.clone());

    f.executor
        .run(&f.event, &f.mapping, &Reaction::new("ci.run"))
        .await
        .expect("reaction succeeds");

    assert_eq!(scripted.last_context().service_config, stored);
}

#[tokio::test(start_paused = true)]
async fn execute_reports_to_an_existing_pending_record() {
    let scripted = ScriptedExecutor::new(0, Failure::Error);
    let f = fixture(vec![service("ci", scripted.clone())]);
    let reaction = Reaction::new("ci.run");

    let record = f.executor.begin(&f.event, &reaction).await.expect("begin");
    assert_eq!(f.store.executions()[0].status, ReactionExecutionStatus::Pending);

    f.executor
        .execute(&record, &f.event, &f.mapping, &reaction)
        .await
        .expect("execute");

    let records = f.store.executions();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record.id);
    assert_eq!(records[0].status, ReactionExecutionStatus::Completed);
}

#[test]
fn backoff_doubles_from_the_base() {
    let policy = RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_secs(1),
    };

    assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
    assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
    assert_eq!(policy.backoff_after(3), Duration::from_secs(4));

    let fast = RetryPolicy {
        max_attempts: 5,
        backoff_base: Duration::from_millis(250),
    };
    assert_eq!(fast.backoff_after(1), Duration::from_millis(250));
    assert_eq!(fast.backoff_after(4), Duration::from_secs(2));
}

#[test]
fn default_policy_is_three_attempts_from_one_second() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.backoff_base, Duration::from_secs(1));
}
