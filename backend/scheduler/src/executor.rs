use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::{AlertKind, GrantAction, GrantError, GrantKey};
use cadence_logging::{GrantEvent, GrantEventLogger};

use crate::alerts::AlertSink;
use crate::retry::RetryPolicy;
use crate::suppression::{FailureOutcome, FailureTracker};

/// Outcome of executing one cycle's `New` set, partitioned by result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub granted: Vec<GrantKey>,
    /// Server, member, or role no longer exists. Counts as done.
    pub vanished: Vec<GrantKey>,
    pub denied: Vec<GrantKey>,
    /// Still failing transiently after the in-cycle retries.
    pub transient: Vec<GrantKey>,
    /// Skipped without an attempt because the key is cooling down.
    pub suppressed: Vec<GrantKey>,
}

impl ExecutionReport {
    /// Keys that must stay out of the next snapshot.
    pub fn failed(&self) -> HashSet<GrantKey> {
        self.denied
            .iter()
            .chain(&self.transient)
            .chain(&self.suppressed)
            .copied()
            .collect()
    }

    pub fn attempted(&self) -> usize {
        self.granted.len() + self.vanished.len() + self.denied.len() + self.transient.len()
    }
}

/// Applies the external grant action to newly eligible keys.
pub struct GrantExecutor {
    action: Arc<dyn GrantAction>,
    retry: RetryPolicy,
    timeout: Duration,
    alerts: AlertSink,
}

impl GrantExecutor {
    pub fn new(
        action: Arc<dyn GrantAction>,
        retry: RetryPolicy,
        timeout: Duration,
        alerts: AlertSink,
    ) -> Self {
        Self {
            action,
            retry,
            timeout,
            alerts,
        }
    }

    /// Attempt every key in `new` once (plus transient retries).
    pub async fn execute(
        &self,
        cycle_id: Uuid,
        new: &HashSet<GrantKey>,
        failures: &mut FailureTracker,
        now: i64,
    ) -> ExecutionReport {
        let cycle = cycle_id.to_string();
        let mut report = ExecutionReport::default();

        let mut keys: Vec<GrantKey> = new.iter().copied().collect();
        keys.sort();

        for key in keys {
            if failures.is_suppressed(&key, now) {
                debug!(key = %key, "Skipping suppressed grant key");
                report.suppressed.push(key);
                continue;
            }

            let (result, attempts) = self.attempt(&cycle, &key).await;
            match result {
                Ok(()) => {
                    failures.record_success(&key);
                    info!(key = %key, action = self.action.name(), attempts, "Role granted");
                    GrantEventLogger::log_event(
                        &cycle,
                        GrantEvent::Granted {
                            key: key.to_string(),
                            attempts,
                        },
                    );
                    report.granted.push(key);
                }
                Err(GrantError::TargetNotFound(reason)) => {
                    failures.record_success(&key);
                    debug!(key = %key, reason = %reason, "Grant target vanished, dropping");
                    GrantEventLogger::log_event(
                        &cycle,
                        GrantEvent::Vanished {
                            key: key.to_string(),
                            reason,
                        },
                    );
                    report.vanished.push(key);
                }
                Err(GrantError::PermissionDenied(reason)) => {
                    warn!(key = %key, reason = %reason, "Grant refused: permission denied");
                    self.alerts
                        .raise(
                            Some(cycle_id),
                            AlertKind::PermissionDenied,
                            json!({ "key": key, "reason": &reason }),
                        )
                        .await;
                    GrantEventLogger::log_event(
                        &cycle,
                        GrantEvent::Denied {
                            key: key.to_string(),
                            reason,
                        },
                    );

                    if let FailureOutcome::Suppressed {
                        consecutive,
                        cooldown_secs,
                        until,
                    } = failures.record_failure(key, now)
                    {
                        self.alerts
                            .raise(
                                Some(cycle_id),
                                AlertKind::GrantSuppressed,
                                json!({
                                    "key": key,
                                    "consecutive_failures": consecutive,
                                    "cooldown_secs": cooldown_secs,
                                    "suppressed_until": until,
                                }),
                            )
                            .await;
                        GrantEventLogger::log_event(
                            &cycle,
                            GrantEvent::Suppressed {
                                key: key.to_string(),
                                failures: consecutive,
                                cooldown_secs,
                            },
                        );
                    }
                    report.denied.push(key);
                }
                Err(GrantError::Transient(reason)) => {
                    warn!(key = %key, attempts, reason = %reason, "Grant still failing, deferring to next cycle");
                    GrantEventLogger::log_event(
                        &cycle,
                        GrantEvent::TransientExhausted {
                            key: key.to_string(),
                            attempts,
                            reason,
                        },
                    );
                    report.transient.push(key);
                }
            }
        }

        report
    }

    /// Call the action under the per-call timeout, retrying transient errors
    /// with backoff. Returns the final result and how many calls were made.
    async fn attempt(&self, cycle: &str, key: &GrantKey) -> (Result<(), GrantError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, self.action.grant(key)).await {
                Ok(result) => result,
                Err(_) => Err(GrantError::Transient(format!(
                    "grant timed out after {}ms",
                    self.timeout.as_millis()
                ))),
            };

            match result {
                Err(err) if err.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(key = %key, attempt, delay_ms = delay.as_millis() as u64, "Retrying transient grant failure");
                    GrantEventLogger::log_event(
                        cycle,
                        GrantEvent::Retrying {
                            key: key.to_string(),
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                            reason: err.to_string(),
                        },
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return (other, attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suppression::SuppressionPolicy;
    use crate::testing::{fast_retry, ScriptedGrant};
    use cadence_core::{Message, RoleId, ServerId, UserId};
    use tokio::sync::mpsc;

    fn key(user: u64) -> GrantKey {
        GrantKey::new(RoleId(10), UserId(user), ServerId(1))
    }

    fn executor(action: Arc<ScriptedGrant>, alerts: AlertSink) -> GrantExecutor {
        GrantExecutor::new(action, fast_retry(3), Duration::from_millis(200), alerts)
    }

    #[tokio::test]
    async fn test_outcomes_are_partitioned() {
        let action = Arc::new(ScriptedGrant::new());
        action.script(key(2), vec![Err(GrantError::TargetNotFound("member left".into()))]);
        action.script(key(3), vec![Err(GrantError::PermissionDenied("50013".into()))]);
        let (tx, mut rx) = mpsc::channel(8);
        let exec = executor(action.clone(), AlertSink::new(tx));

        let mut tracker = FailureTracker::default();
        let new = HashSet::from([key(1), key(2), key(3)]);
        let report = exec.execute(Uuid::new_v4(), &new, &mut tracker, 0).await;

        assert_eq!(report.granted, vec![key(1)]);
        assert_eq!(report.vanished, vec![key(2)]);
        assert_eq!(report.denied, vec![key(3)]);
        assert_eq!(report.failed(), HashSet::from([key(3)]));
        assert_eq!(report.attempted(), 3);

        match rx.try_recv().unwrap() {
            Message::Alert(payload) => assert_eq!(payload.alert.kind, AlertKind::PermissionDenied),
            other => panic!("unexpected message {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transient_is_retried_within_cycle() {
        let action = Arc::new(ScriptedGrant::new());
        action.script(
            key(1),
            vec![
                Err(GrantError::Transient("429".into())),
                Err(GrantError::Transient("502".into())),
                Ok(()),
            ],
        );
        let exec = executor(action.clone(), AlertSink::disabled());

        let mut tracker = FailureTracker::default();
        let report = exec
            .execute(Uuid::new_v4(), &HashSet::from([key(1)]), &mut tracker, 0)
            .await;
        assert_eq!(report.granted, vec![key(1)]);
        assert_eq!(action.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_exhaustion_is_a_failure() {
        let action = Arc::new(ScriptedGrant::new());
        action.script(key(1), vec![Err(GrantError::Transient("network".into())); 3]);
        let exec = executor(action.clone(), AlertSink::disabled());

        let mut tracker = FailureTracker::default();
        let report = exec
            .execute(Uuid::new_v4(), &HashSet::from([key(1)]), &mut tracker, 0)
            .await;
        assert_eq!(report.transient, vec![key(1)]);
        assert_eq!(action.calls().len(), 3);
        assert_eq!(tracker.consecutive_failures(&key(1)), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_retried() {
        let action = Arc::new(ScriptedGrant::new());
        action.script(key(1), vec![Err(GrantError::PermissionDenied("50013".into()))]);
        let exec = executor(action.clone(), AlertSink::disabled());

        let mut tracker = FailureTracker::default();
        exec.execute(Uuid::new_v4(), &HashSet::from([key(1)]), &mut tracker, 0)
            .await;
        assert_eq!(action.calls().len(), 1);
        assert_eq!(tracker.consecutive_failures(&key(1)), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let action = Arc::new(ScriptedGrant::new().with_delay(Duration::from_millis(500)));
        let exec = GrantExecutor::new(
            action.clone(),
            RetryPolicy::none(),
            Duration::from_millis(20),
            AlertSink::disabled(),
        );

        let mut tracker = FailureTracker::default();
        let report = exec
            .execute(Uuid::new_v4(), &HashSet::from([key(1)]), &mut tracker, 0)
            .await;
        assert_eq!(report.transient, vec![key(1)]);
    }

    #[tokio::test]
    async fn test_suppression_skips_and_alerts_once() {
        let action = Arc::new(ScriptedGrant::new());
        action.script(key(1), vec![Err(GrantError::PermissionDenied("50013".into())); 2]);
        let (tx, mut rx) = mpsc::channel(8);
        let exec = executor(action.clone(), AlertSink::new(tx));

        let mut tracker = FailureTracker::new(SuppressionPolicy {
            after_failures: 2,
            base_cooldown_secs: 60,
            max_cooldown_secs: 600,
        });
        let new = HashSet::from([key(1)]);
        exec.execute(Uuid::new_v4(), &new, &mut tracker, 0).await;
        exec.execute(Uuid::new_v4(), &new, &mut tracker, 5).await;
        let skipped = exec.execute(Uuid::new_v4(), &new, &mut tracker, 10).await;

        assert_eq!(skipped.suppressed, vec![key(1)]);
        assert_eq!(skipped.attempted(), 0);
        assert_eq!(action.calls().len(), 2);

        let mut kinds = Vec::new();
        while let Ok(Message::Alert(payload)) = rx.try_recv() {
            kinds.push(payload.alert.kind);
        }
        assert_eq!(
            kinds,
            vec![
                AlertKind::PermissionDenied,
                AlertKind::PermissionDenied,
                AlertKind::GrantSuppressed
            ]
        );

        let after = exec.execute(Uuid::new_v4(), &new, &mut tracker, 65).await;
        assert_eq!(after.granted, vec![key(1)]);
        assert_eq!(tracker.consecutive_failures(&key(1)), 0);
    }
}
