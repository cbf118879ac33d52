//! Telemetry and structured logging for cadence.
//!
//! Console plus rolling NDJSON file output, secret redaction, and the
//! grant event log written under the `grant_events` target.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{GrantEvent, GrantEventEntry, GrantEventLogger};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
