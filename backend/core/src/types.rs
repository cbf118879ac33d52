use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// A server (Discord guild) identifier.
    ServerId
);
snowflake!(
    /// A text channel identifier.
    ChannelId
);
snowflake!(
    /// A user (guild member) identifier.
    UserId
);
snowflake!(
    /// A role identifier.
    RoleId
);

/// Storage-assigned identifier of an [`ActivityRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub i64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One observed message. Never mutated after it is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub server_id: ServerId,
}

impl ActivityEvent {
    pub fn new(server_id: ServerId, channel_id: ChannelId, user_id: UserId, timestamp: i64) -> Self {
        Self {
            channel_id,
            user_id,
            timestamp,
            server_id,
        }
    }
}

/// Which channels of a server count toward a rule.
///
/// "All channels" is its own variant; an explicit scope is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "channels", rename_all = "snake_case")]
pub enum ChannelScope {
    AllChannels,
    Explicit(BTreeSet<ChannelId>),
}

impl ChannelScope {
    /// Build an explicit scope, rejecting an empty channel list.
    pub fn explicit<I>(channels: I) -> Result<Self, CadenceError>
    where
        I: IntoIterator<Item = ChannelId>,
    {
        let set: BTreeSet<ChannelId> = channels.into_iter().collect();
        if set.is_empty() {
            return Err(CadenceError::InvalidRule(
                "explicit channel scope needs at least one channel".to_string(),
            ));
        }
        Ok(Self::Explicit(set))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::AllChannels)
    }

}

impl fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllChannels => write!(f, "all"),
            Self::Explicit(set) => {
                let ids: Vec<String> = set.iter().map(ToString::to_string).collect();
                write!(f, "{}", ids.join(","))
            }
        }
    }
}

/// A rule as submitted by an administrator, before storage assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub server_id: ServerId,
    /// Trailing window length in seconds.
    pub time_period: u64,
    pub role_id: RoleId,
    pub message_count: u32,
    pub channel_scope: ChannelScope,
}

impl NewRule {
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.message_count == 0 {
            return Err(CadenceError::InvalidRule(
                "message_count must be at least 1".to_string(),
            ));
        }
        if self.time_period == 0 {
            return Err(CadenceError::InvalidRule(
                "time_period must be at least one second".to_string(),
            ));
        }
        if let ChannelScope::Explicit(set) = &self.channel_scope {
            if set.is_empty() {
                return Err(CadenceError::InvalidRule(
                    "explicit channel scope needs at least one channel".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn into_rule(self, rule_id: RuleId) -> ActivityRule {
        ActivityRule {
            rule_id,
            server_id: self.server_id,
            time_period: self.time_period,
            role_id: self.role_id,
            message_count: self.message_count,
            channel_scope: self.channel_scope,
        }
    }
}

/// An administrator-defined policy: `message_count` messages within the
/// trailing `time_period` seconds, in `channel_scope`, earn `role_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRule {
    pub rule_id: RuleId,
    pub server_id: ServerId,
    pub time_period: u64,
    pub role_id: RoleId,
    pub message_count: u32,
    pub channel_scope: ChannelScope,
}

impl ActivityRule {
    /// The inclusive window `[now - time_period, now]`.
    pub fn window(&self, now: i64) -> (i64, i64) {
        let period = i64::try_from(self.time_period).unwrap_or(i64::MAX);
        (now.saturating_sub(period), now)
    }

    pub fn grant_key(&self, user_id: UserId) -> GrantKey {
        GrantKey::new(self.role_id, user_id, self.server_id)
    }
}

/// One grant decision: give `role_id` to `user_id` in `server_id`.
///
/// Field order is part of the type's identity; equality and hashing are
/// structural over (role, user, server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    pub role_id: RoleId,
    pub user_id: UserId,
    pub server_id: ServerId,
}

impl GrantKey {
    pub fn new(role_id: RoleId, user_id: UserId, server_id: ServerId) -> Self {
        Self {
            role_id,
            user_id,
            server_id,
        }
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "role={} user={} server={}",
            self.role_id, self.user_id, self.server_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rule(scope: ChannelScope) -> NewRule {
        NewRule {
            server_id: ServerId(1),
            time_period: 3600,
            role_id: RoleId(7),
            message_count: 3,
            channel_scope: scope,
        }
    }

    #[test]
    fn explicit_scope_rejects_empty() {
        assert!(ChannelScope::explicit(Vec::new()).is_err());
        let scope = ChannelScope::explicit([ChannelId(5), ChannelId(5)]).unwrap();
        assert_eq!(scope, ChannelScope::Explicit(BTreeSet::from([ChannelId(5)])));
    }

    #[test]
    fn validate_rejects_zero_count_and_period() {
        let mut r = rule(ChannelScope::AllChannels);
        assert!(r.validate().is_ok());
        r.message_count = 0;
        assert!(r.validate().is_err());

        let mut r = rule(ChannelScope::AllChannels);
        r.time_period = 0;
        assert!(r.validate().is_err());

        let r = rule(ChannelScope::Explicit(BTreeSet::new()));
        assert!(r.validate().is_err());
    }

    #[test]
    fn window_is_inclusive_trailing_period() {
        let r = rule(ChannelScope::AllChannels).into_rule(RuleId(1));
        assert_eq!(r.window(5000), (1400, 5000));
        assert_eq!(r.window(10), (-3590, 10));
    }

    #[test]
    fn grant_keys_collapse_structurally() {
        let a = GrantKey::new(RoleId(1), UserId(2), ServerId(3));
        let b = GrantKey::new(RoleId(1), UserId(2), ServerId(3));
        let set: HashSet<GrantKey> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_ne!(a, GrantKey::new(RoleId(2), UserId(1), ServerId(3)));
    }

    #[test]
    fn scope_display() {
        assert_eq!(ChannelScope::AllChannels.to_string(), "all");
        let scope = ChannelScope::explicit([ChannelId(9), ChannelId(3)]).unwrap();
        assert_eq!(scope.to_string(), "3,9");
    }
}
