//! Suppression of grant keys that keep failing permanently.
//!
//! A key refused N times in a row is skipped for a cooldown that doubles with
//! every further refusal, up to a cap.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use cadence_core::GrantKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionPolicy {
    /// Consecutive permanent failures before a key is suppressed. 0 disables.
    pub after_failures: u32,
    pub base_cooldown_secs: u64,
    pub max_cooldown_secs: u64,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            after_failures: 3,
            base_cooldown_secs: 60,
            max_cooldown_secs: 3_600,
        }
    }
}

impl SuppressionPolicy {
    /// Cooldown for the `nth` suppression of the same key (1-indexed).
    pub fn cooldown_for(&self, nth: u32) -> u64 {
        let shift = nth.saturating_sub(1).min(32);
        self.base_cooldown_secs
            .saturating_mul(1u64 << shift)
            .min(self.max_cooldown_secs)
    }
}

#[derive(Debug, Clone, Default)]
struct FailureRecord {
    consecutive: u32,
    suppressions: u32,
    suppressed_until: Option<i64>,
}

/// What recording a failure did to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Counted { consecutive: u32 },
    Suppressed {
        consecutive: u32,
        cooldown_secs: u64,
        until: i64,
    },
}

/// Per-key consecutive permanent failure counts, owned by the poll loop.
#[derive(Debug, Clone, Default)]
pub struct FailureTracker {
    policy: SuppressionPolicy,
    records: HashMap<GrantKey, FailureRecord>,
}

impl FailureTracker {
    pub fn new(policy: SuppressionPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    pub fn is_suppressed(&self, key: &GrantKey, now: i64) -> bool {
        self.records
            .get(key)
            .and_then(|r| r.suppressed_until)
            .is_some_and(|until| now < until)
    }

    /// Record a permanent failure and suppress the key once the limit is hit.
    ///
    /// Past the limit every further failure suppresses again with a longer
    /// cooldown.
    pub fn record_failure(&mut self, key: GrantKey, now: i64) -> FailureOutcome {
        let record = self.records.entry(key).or_default();
        record.consecutive += 1;

        if self.policy.after_failures == 0 || record.consecutive < self.policy.after_failures {
            return FailureOutcome::Counted {
                consecutive: record.consecutive,
            };
        }

        record.suppressions += 1;
        let cooldown_secs = self.policy.cooldown_for(record.suppressions);
        let until = now.saturating_add(i64::try_from(cooldown_secs).unwrap_or(i64::MAX));
        record.suppressed_until = Some(until);
        warn!(
            key = %key,
            consecutive = record.consecutive,
            cooldown_secs,
            "Grant key suppressed after repeated permanent failures"
        );
        FailureOutcome::Suppressed {
            consecutive: record.consecutive,
            cooldown_secs,
            until,
        }
    }

    /// A successful (or vanished) grant clears the key's history.
    pub fn record_success(&mut self, key: &GrantKey) {
        self.records.remove(key);
    }

    /// Forget keys that are no longer eligible.
    pub fn retain_eligible(&mut self, eligible: &HashSet<GrantKey>) {
        self.records.retain(|key, _| eligible.contains(key));
    }

    pub fn consecutive_failures(&self, key: &GrantKey) -> u32 {
        self.records.get(key).map_or(0, |r| r.consecutive)
    }

    pub fn suppressed_count(&self, now: i64) -> usize {
        self.records
            .keys()
            .filter(|key| self.is_suppressed(key, now))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{RoleId, ServerId, UserId};

    fn key(user: u64) -> GrantKey {
        GrantKey::new(RoleId(1), UserId(user), ServerId(1))
    }

    fn tracker() -> FailureTracker {
        FailureTracker::new(SuppressionPolicy {
            after_failures: 2,
            base_cooldown_secs: 60,
            max_cooldown_secs: 200,
        })
    }

    #[test]
    fn test_cooldown_doubles_and_caps() {
        let policy = SuppressionPolicy::default();
        assert_eq!(policy.cooldown_for(1), 60);
        assert_eq!(policy.cooldown_for(2), 120);
        assert_eq!(policy.cooldown_for(7), 3_600);
        assert_eq!(policy.cooldown_for(u32::MAX), 3_600);
    }

    #[test]
    fn test_suppressed_after_limit() {
        let mut t = tracker();
        assert_eq!(t.record_failure(key(1), 0), FailureOutcome::Counted { consecutive: 1 });
        assert!(!t.is_suppressed(&key(1), 0));

        let outcome = t.record_failure(key(1), 10);
        assert_eq!(
            outcome,
            FailureOutcome::Suppressed { consecutive: 2, cooldown_secs: 60, until: 70 }
        );
        assert!(t.is_suppressed(&key(1), 69));
        assert!(!t.is_suppressed(&key(1), 70));
        assert_eq!(t.suppressed_count(20), 1);
    }

    #[test]
    fn test_failure_after_cooldown_suppresses_longer() {
        let mut t = tracker();
        t.record_failure(key(1), 0);
        t.record_failure(key(1), 0);
        match t.record_failure(key(1), 100) {
            FailureOutcome::Suppressed { cooldown_secs, .. } => assert_eq!(cooldown_secs, 120),
            other => panic!("expected suppression, got {other:?}"),
        }
        match t.record_failure(key(1), 300) {
            FailureOutcome::Suppressed { cooldown_secs, .. } => assert_eq!(cooldown_secs, 200),
            other => panic!("expected suppression, got {other:?}"),
        }
    }

    #[test]
    fn test_success_and_ineligibility_clear_history() {
        let mut t = tracker();
        t.record_failure(key(1), 0);
        t.record_failure(key(2), 0);
        t.record_success(&key(1));
        assert_eq!(t.consecutive_failures(&key(1)), 0);

        t.retain_eligible(&HashSet::from([key(1)]));
        assert_eq!(t.consecutive_failures(&key(2)), 0);
    }

    #[test]
    fn test_zero_limit_disables_suppression() {
        let mut t = FailureTracker::new(SuppressionPolicy {
            after_failures: 0,
            ..Default::default()
        });
        for _ in 0..10 {
            t.record_failure(key(1), 0);
        }
        assert!(!t.is_suppressed(&key(1), 0));
    }
}
