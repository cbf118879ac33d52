//! Fakes and fixtures shared by the scheduler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cadence_core::{
    ActivityEvent, ActivityLog, ActivityRule, CadenceError, ChannelId, ChannelScope, GrantAction,
    GrantError, GrantKey, NewRule, RoleId, RuleSource, ServerId, UserId,
};
use cadence_store::{Database, EventStore, RuleStore};

use crate::evaluator::EligibilityEvaluator;
use crate::retry::RetryPolicy;

/// Grant action that replays scripted results per key and succeeds otherwise.
#[derive(Default)]
pub(crate) struct ScriptedGrant {
    calls: Mutex<Vec<GrantKey>>,
    script: Mutex<HashMap<GrantKey, VecDeque<Result<(), GrantError>>>>,
    delay: Option<Duration>,
}

impl ScriptedGrant {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn script(&self, key: GrantKey, results: Vec<Result<(), GrantError>>) {
        self.script.lock().unwrap().insert(key, results.into());
    }

    pub(crate) fn calls(&self) -> Vec<GrantKey> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GrantAction for ScriptedGrant {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn grant(&self, key: &GrantKey) -> Result<(), GrantError> {
        self.calls.lock().unwrap().push(*key);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        next.unwrap_or(Ok(()))
    }
}

/// Rule source that can be switched into a failing state.
pub(crate) struct FlakyRules {
    inner: RuleStore,
    fail: AtomicBool,
}

#[async_trait]
impl RuleSource for FlakyRules {
    async fn list_rules(&self) -> Result<Vec<ActivityRule>, CadenceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CadenceError::StorageRead("disk I/O error".into()));
        }
        self.inner.list_rules().await
    }
}

/// Activity log whose window reads can be switched into a failing state.
pub(crate) struct FlakyEvents {
    inner: EventStore,
    fail: AtomicBool,
}

#[async_trait]
impl ActivityLog for FlakyEvents {
    async fn append(&self, event: ActivityEvent) -> Result<(), CadenceError> {
        self.inner.append(event).await
    }

    async fn activity_counts(
        &self,
        server: ServerId,
        scope: &ChannelScope,
        since: i64,
        until: i64,
    ) -> Result<Vec<(UserId, u64)>, CadenceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CadenceError::StorageRead("database is locked".into()));
        }
        self.inner.activity_counts(server, scope, since, until).await
    }

    async fn prune_before(&self, cutoff: i64) -> Result<usize, CadenceError> {
        self.inner.prune_before(cutoff).await
    }
}

pub(crate) struct Fixture {
    pub(crate) db: Database,
    rules: Arc<FlakyRules>,
    events: Arc<FlakyEvents>,
}

impl Fixture {
    pub(crate) async fn rule(&self, rule: NewRule) -> ActivityRule {
        self.db.rules().create_rule(rule).await.unwrap()
    }

    pub(crate) async fn post(&self, server: u64, channel: u64, user: u64, times: &[i64]) {
        for &ts in times {
            self.events
                .append(ActivityEvent::new(
                    ServerId(server),
                    ChannelId(channel),
                    UserId(user),
                    ts,
                ))
                .await
                .unwrap();
        }
    }

    pub(crate) fn rules_fail(&self, fail: bool) {
        self.rules.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn events_fail(&self, fail: bool) {
        self.events.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn rule_source(&self) -> Arc<dyn RuleSource> {
        self.rules.clone()
    }

    pub(crate) fn activity(&self) -> Arc<dyn ActivityLog> {
        self.events.clone()
    }

    pub(crate) fn evaluator(&self) -> EligibilityEvaluator {
        EligibilityEvaluator::new(self.rule_source(), self.activity())
    }

    pub(crate) async fn event_count(&self) -> usize {
        self.events.inner.count().await.unwrap()
    }
}

pub(crate) async fn fixture() -> Fixture {
    let db = Database::in_memory().unwrap();
    Fixture {
        rules: Arc::new(FlakyRules {
            inner: db.rules(),
            fail: AtomicBool::new(false),
        }),
        events: Arc::new(FlakyEvents {
            inner: db.events(),
            fail: AtomicBool::new(false),
        }),
        db,
    }
}

/// A rule granting role 10.
pub(crate) fn rule_in(server: u64, scope: ChannelScope, count: u32, period: u64) -> NewRule {
    NewRule {
        server_id: ServerId(server),
        time_period: period,
        role_id: RoleId(10),
        message_count: count,
        channel_scope: scope,
    }
}

pub(crate) fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        backoff_factor: 2.0,
        max_delay_ms: 5,
        jitter: false,
    }
}
