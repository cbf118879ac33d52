use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cadence_core::{
    ActivityLog, AlertKind, CadenceError, Component, GrantAction, Message, RuleSource,
};

use crate::alerts::AlertSink;
use crate::cache::GrantCache;
use crate::evaluator::EligibilityEvaluator;
use crate::executor::GrantExecutor;
use crate::retention::RetentionPolicy;
use crate::retry::RetryPolicy;
use crate::suppression::{FailureTracker, SuppressionPolicy};

/// How the first snapshot is built after a (re)start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStart {
    /// Evaluate once at startup and treat the result as already granted.
    /// Only users who cross a threshold after startup are granted.
    #[default]
    SeedBaseline,
    /// Start from an empty snapshot; everyone already eligible is granted
    /// on the first cycle.
    GrantImmediately,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Evaluating,
    Diffing,
    Executing,
}

/// Summary of the most recent cycle, published after every state change.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Option<Uuid>,
    pub cycle_number: u64,
    pub state: PollState,
    pub rules: usize,
    pub eligible: usize,
    pub new: usize,
    pub granted: usize,
    pub vanished: usize,
    pub denied: usize,
    pub transient: usize,
    pub suppressed: usize,
    pub cache_size: usize,
    pub pruned: Option<usize>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CycleReport {
    /// Report published before the first cycle has run.
    pub fn idle() -> Self {
        Self::starting(None, 0, PollState::Idle)
    }

    fn starting(cycle_id: Option<Uuid>, cycle_number: u64, state: PollState) -> Self {
        Self {
            cycle_id,
            cycle_number,
            state,
            rules: 0,
            eligible: 0,
            new: 0,
            granted: 0,
            vanished: 0,
            denied: 0,
            transient: 0,
            suppressed: 0,
            cache_size: 0,
            pruned: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub cold_start: ColdStart,
    pub grant_timeout: Duration,
    pub retry: RetryPolicy,
    pub suppression: SuppressionPolicy,
    pub retention: RetentionPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            cold_start: ColdStart::default(),
            grant_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            suppression: SuppressionPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// State owned by a single running poll loop. Discarded on shutdown.
#[derive(Debug)]
pub struct LoopState {
    cache: GrantCache,
    failures: FailureTracker,
    cycles: u64,
    /// Baseline still owed after a failed startup evaluation.
    seed_pending: bool,
}

impl LoopState {
    pub fn cache(&self) -> &GrantCache {
        &self.cache
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn seed_pending(&self) -> bool {
        self.seed_pending
    }
}

enum Wake {
    Poll,
    Stop,
}

/// Drives evaluate → diff → execute on a fixed interval.
pub struct PollScheduler {
    evaluator: EligibilityEvaluator,
    activity: Arc<dyn ActivityLog>,
    executor: GrantExecutor,
    alerts: AlertSink,
    config: PollConfig,
    status_tx: watch::Sender<CycleReport>,
}

impl PollScheduler {
    pub fn new(
        rules: Arc<dyn RuleSource>,
        activity: Arc<dyn ActivityLog>,
        action: Arc<dyn GrantAction>,
        config: PollConfig,
        alerts: AlertSink,
    ) -> Self {
        let executor = GrantExecutor::new(
            action,
            config.retry.clone(),
            config.grant_timeout,
            alerts.clone(),
        );
        let (status_tx, _) = watch::channel(CycleReport::idle());
        Self {
            evaluator: EligibilityEvaluator::new(rules, activity.clone()),
            activity,
            executor,
            alerts,
            config,
            status_tx,
        }
    }

    /// Subscribe to cycle reports.
    pub fn subscribe(&self) -> watch::Receiver<CycleReport> {
        self.status_tx.subscribe()
    }

    /// Build the initial loop state according to the cold-start policy.
    ///
    /// Failing to read the rule store here is fatal for the loop. Under
    /// `SeedBaseline`, an activity read failure only defers the seed to the
    /// first cycle whose evaluation succeeds.
    pub async fn bootstrap(&self, now: i64) -> Result<LoopState, CadenceError> {
        let rules = self.evaluator.probe_rules().await?;
        let mut seed_pending = false;
        let cache = match self.config.cold_start {
            ColdStart::SeedBaseline => match self.evaluator.evaluate(now).await {
                Ok(baseline) => {
                    info!(
                        rules = baseline.rules_evaluated,
                        seeded = baseline.eligible.len(),
                        "Grant cache seeded from startup evaluation"
                    );
                    GrantCache::seeded(baseline.eligible)
                }
                Err(e) => {
                    warn!(rules, error = %e, "Startup evaluation failed; seeding on the next cycle");
                    seed_pending = true;
                    GrantCache::default()
                }
            },
            ColdStart::GrantImmediately => {
                info!(rules, "Grant cache starts empty; eligible users are granted on the first cycle");
                GrantCache::default()
            }
        };

        Ok(LoopState {
            cache,
            failures: FailureTracker::new(self.config.suppression.clone()),
            cycles: 0,
            seed_pending,
        })
    }

    /// Run one full cycle. Failures are contained and reported, never returned.
    pub async fn run_cycle(&self, state: &mut LoopState, now: i64) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        state.cycles += 1;
        let mut report = CycleReport::starting(Some(cycle_id), state.cycles, PollState::Evaluating);
        self.publish(&report);

        let evaluation = match self.evaluator.evaluate(now).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "Evaluation failed, skipping cycle");
                self.alerts
                    .raise(
                        Some(cycle_id),
                        AlertKind::StorageReadFailed,
                        json!({ "error": e.to_string() }),
                    )
                    .await;
                report.state = PollState::Idle;
                report.cache_size = state.cache.len();
                report.error = Some(e.to_string());
                self.publish(&report);
                return report;
            }
        };
        report.rules = evaluation.rules_evaluated;
        report.eligible = evaluation.eligible.len();

        if state.seed_pending {
            state.seed_pending = false;
            state.cache = GrantCache::seeded(evaluation.eligible);
            info!(cycle_id = %cycle_id, seeded = report.eligible, "Grant cache seeded from deferred evaluation");
            report.cache_size = state.cache.len();
            report.state = PollState::Idle;
            report.timestamp = Utc::now();
            self.publish(&report);
            return report;
        }

        report.state = PollState::Diffing;
        self.publish(&report);
        state.failures.retain_eligible(&evaluation.eligible);
        let new = state.cache.diff(&evaluation.eligible);
        report.new = new.len();

        report.state = PollState::Executing;
        self.publish(&report);
        let execution = self
            .executor
            .execute(cycle_id, &new, &mut state.failures, now)
            .await;
        state.cache.advance(evaluation.eligible, &execution.failed());

        report.granted = execution.granted.len();
        report.vanished = execution.vanished.len();
        report.denied = execution.denied.len();
        report.transient = execution.transient.len();
        report.suppressed = execution.suppressed.len();
        report.cache_size = state.cache.len();

        if self.config.retention.is_due(state.cycles) {
            report.pruned = self.prune(cycle_id, evaluation.max_period, now).await;
        }

        report.state = PollState::Idle;
        report.timestamp = Utc::now();
        self.publish(&report);

        if report.new > 0 {
            info!(
                cycle_id = %cycle_id,
                eligible = report.eligible,
                new = report.new,
                granted = report.granted,
                denied = report.denied,
                transient = report.transient,
                suppressed = report.suppressed,
                "Poll cycle complete"
            );
        } else {
            debug!(cycle_id = %cycle_id, eligible = report.eligible, "Poll cycle complete, nothing new");
        }
        report
    }

    async fn prune(&self, cycle_id: Uuid, max_period: Option<u64>, now: i64) -> Option<usize> {
        let cutoff = self.config.retention.cutoff(now, max_period)?;
        match self.activity.prune_before(cutoff).await {
            Ok(removed) => {
                info!(cycle_id = %cycle_id, cutoff, removed, "Pruned expired activity events");
                Some(removed)
            }
            Err(e) => {
                warn!(cycle_id = %cycle_id, error = %e, "Retention pruning failed");
                self.alerts
                    .raise(
                        Some(cycle_id),
                        AlertKind::RetentionFailed,
                        json!({ "cutoff": cutoff, "error": e.to_string() }),
                    )
                    .await;
                None
            }
        }
    }

    fn publish(&self, report: &CycleReport) {
        self.status_tx.send_replace(report.clone());
    }

    /// Sleep out the interval, waking early for a manual poll.
    async fn idle(&self, rx: &mut mpsc::Receiver<Message>) -> Wake {
        let sleep = tokio::time::sleep(self.config.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Wake::Poll,
                msg = rx.recv() => match msg {
                    Some(Message::PollNow(request)) => {
                        info!(reason = %request.reason, "Manual poll requested");
                        return Wake::Poll;
                    }
                    Some(Message::Shutdown) => {
                        info!("Poll scheduler received shutdown");
                        return Wake::Stop;
                    }
                    Some(other) => {
                        debug!(msg_type = other.kind(), "Poll scheduler ignoring message");
                    }
                    None => {
                        info!("Poll scheduler channel closed, shutting down");
                        return Wake::Stop;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl Component for PollScheduler {
    fn name(&self) -> &str {
        "poll_scheduler"
    }

    async fn start(&self, mut rx: mpsc::Receiver<Message>) -> Result<()> {
        let mut state = self
            .bootstrap(Utc::now().timestamp())
            .await
            .context("Poll scheduler could not read the rule store at startup")?;

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            cold_start = ?self.config.cold_start,
            "Poll scheduler started"
        );

        loop {
            self.run_cycle(&mut state, Utc::now().timestamp()).await;
            if let Wake::Stop = self.idle(&mut rx).await {
                break;
            }
        }

        info!(cycles = state.cycles, "Poll scheduler stopped");
        Ok(())
    }
}
