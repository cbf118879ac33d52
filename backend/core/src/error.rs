use thiserror::Error;

/// Top-level error type for the cadence runtime.
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Evaluation cannot proceed this cycle.
    #[error("storage read failed: {0}")]
    StorageRead(String),

    /// Event ingestion or rule administration could not be persisted.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outcome taxonomy of the external role-grant action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    /// The bot lacks permission to modify roles. Not retried within a cycle.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limiting, network failure, timeout.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Server, member, or role can no longer be resolved.
    #[error("target not found: {0}")]
    TargetNotFound(String),
}

impl GrantError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_error_converts_into_cadence_error() {
        let err: CadenceError = GrantError::PermissionDenied("missing MANAGE_ROLES".into()).into();
        assert_eq!(err.to_string(), "permission denied: missing MANAGE_ROLES");
    }

    #[test]
    fn only_transient_is_transient() {
        assert!(GrantError::Transient("429".into()).is_transient());
        assert!(!GrantError::TargetNotFound("member".into()).is_transient());
        assert!(!GrantError::PermissionDenied("403".into()).is_transient());
    }
}
