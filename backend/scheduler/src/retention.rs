use serde::{Deserialize, Serialize};

/// Periodic pruning of events that no rule can still count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub enabled: bool,
    /// Extra seconds kept beyond the longest rule window.
    pub margin_secs: u64,
    /// Prune after every N completed cycles.
    pub every_cycles: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            margin_secs: 86_400,
            every_cycles: 720,
        }
    }
}

impl RetentionPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn is_due(&self, cycle_number: u64) -> bool {
        self.enabled && self.every_cycles > 0 && cycle_number % self.every_cycles == 0
    }

    /// Events strictly older than the returned timestamp can be deleted.
    /// `None` when there are no rules.
    pub fn cutoff(&self, now: i64, max_period: Option<u64>) -> Option<i64> {
        let keep = max_period?.saturating_add(self.margin_secs);
        Some(now.saturating_sub(i64::try_from(keep).unwrap_or(i64::MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_every_n_cycles() {
        let policy = RetentionPolicy {
            every_cycles: 3,
            ..Default::default()
        };
        let due: Vec<u64> = (1..=9).filter(|n| policy.is_due(*n)).collect();
        assert_eq!(due, vec![3, 6, 9]);
        assert!(!RetentionPolicy::disabled().is_due(720));
    }

    #[test]
    fn test_cutoff_keeps_longest_window_plus_margin() {
        let policy = RetentionPolicy {
            margin_secs: 100,
            ..Default::default()
        };
        assert_eq!(policy.cutoff(10_000, Some(3_600)), Some(6_300));
        assert_eq!(policy.cutoff(10_000, None), None);
        assert_eq!(policy.cutoff(0, Some(u64::MAX)), Some(-i64::MAX));
    }
}
