//! Core domain types, traits, and the message bus shared by every cadence crate.

pub mod alert;
pub mod channel;
pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use alert::{Alert, AlertKind};
pub use channel::CadenceBus;
pub use error::{CadenceError, GrantError};
pub use message::{AlertPayload, Message, PollRequest};
pub use traits::{ActivityLog, Component, GrantAction, RuleSource};
pub use types::{
    ActivityEvent, ActivityRule, ChannelId, ChannelScope, GrantKey, NewRule, RoleId, RuleId,
    ServerId, UserId,
};
