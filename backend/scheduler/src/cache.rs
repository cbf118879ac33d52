use std::collections::HashSet;

use cadence_core::GrantKey;

/// Grant keys known eligible as of the last completed cycle.
///
/// Owned by the poll loop alone. Rebuilt wholesale every cycle, so keys that
/// fall out of eligibility are forgotten without any revoke.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantCache {
    known: HashSet<GrantKey>,
}

impl GrantCache {
    /// Start from an evaluation taken at startup.
    pub fn seeded(baseline: HashSet<GrantKey>) -> Self {
        Self { known: baseline }
    }

    /// `eligible − previous`: the keys that must be acted on this cycle.
    pub fn diff(&self, eligible: &HashSet<GrantKey>) -> HashSet<GrantKey> {
        eligible.difference(&self.known).copied().collect()
    }

    /// Replace the snapshot with `eligible` minus the keys whose grant did not
    /// succeed this cycle, so they are acted on again next cycle.
    pub fn advance(&mut self, eligible: HashSet<GrantKey>, failed: &HashSet<GrantKey>) {
        self.known = if failed.is_empty() {
            eligible
        } else {
            eligible.difference(failed).copied().collect()
        };
    }

    pub fn contains(&self, key: &GrantKey) -> bool {
        self.known.contains(key)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
