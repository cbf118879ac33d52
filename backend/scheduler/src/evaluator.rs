use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use cadence_core::{ActivityLog, CadenceError, GrantKey, RuleSource};

/// Result of one evaluation pass over every rule.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub eligible: HashSet<GrantKey>,
    pub rules_evaluated: usize,
    /// Longest `time_period` among the evaluated rules, if there were any.
    pub max_period: Option<u64>,
}

/// Computes the set of grant keys whose rule condition currently holds.
pub struct EligibilityEvaluator {
    rules: Arc<dyn RuleSource>,
    activity: Arc<dyn ActivityLog>,
}

impl EligibilityEvaluator {
    pub fn new(rules: Arc<dyn RuleSource>, activity: Arc<dyn ActivityLog>) -> Self {
        Self { rules, activity }
    }

    /// Evaluate every rule against the window ending at `now`.
    ///
    /// Any storage read failure aborts the whole pass; partial results are
    /// never returned.
    pub async fn evaluate(&self, now: i64) -> Result<Evaluation, CadenceError> {
        let rules = self.rules.list_rules().await?;
        let mut evaluation = Evaluation {
            rules_evaluated: rules.len(),
            max_period: rules.iter().map(|r| r.time_period).max(),
            ..Default::default()
        };

        for rule in &rules {
            let (since, until) = rule.window(now);
            let counts = self
                .activity
                .activity_counts(rule.server_id, &rule.channel_scope, since, until)
                .await?;

            let threshold = u64::from(rule.message_count);
            let before = evaluation.eligible.len();
            evaluation.eligible.extend(
                counts
                    .into_iter()
                    .filter(|(_, count)| *count >= threshold)
                    .map(|(user, _)| rule.grant_key(user)),
            );
            debug!(
                rule_id = %rule.rule_id,
                since,
                until,
                added = evaluation.eligible.len() - before,
                "Rule evaluated"
            );
        }

        Ok(evaluation)
    }

    /// Read the rule store once without evaluating, returning the rule count.
    pub async fn probe_rules(&self) -> Result<usize, CadenceError> {
        Ok(self.rules.list_rules().await?.len())
    }
}
