//! The activity-to-role grant engine: eligibility evaluation, grant diffing,
//! grant execution and the poll loop that drives them.

pub mod alerts;
pub mod cache;
pub mod evaluator;
pub mod executor;
pub mod period;
pub mod poller;
pub mod retention;
pub mod retry;
pub mod suppression;

#[cfg(test)]
pub(crate) mod testing;

pub use alerts::AlertSink;
pub use cache::GrantCache;
pub use evaluator::{EligibilityEvaluator, Evaluation};
pub use executor::{ExecutionReport, GrantExecutor};
pub use period::parse_period;
pub use poller::{ColdStart, CycleReport, LoopState, PollConfig, PollScheduler, PollState};
pub use retention::RetentionPolicy;
pub use retry::RetryPolicy;
pub use suppression::{FailureOutcome, FailureTracker, SuppressionPolicy};
