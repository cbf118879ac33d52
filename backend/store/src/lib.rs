//! Durable storage for cadence: the append-only activity log and the rule store.
//!
//! Both stores share one SQLite connection handle. Each write is a single
//! statement or a single transaction, so readers never observe partial rows.

pub mod database;
pub mod events;
pub mod rules;

pub use database::Database;
pub use events::EventStore;
pub use rules::RuleStore;
