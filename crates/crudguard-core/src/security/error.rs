//! Security-specific error types.

use thiserror::Error;

use super::policy::Action;

/// Security-related errors.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The caller's roles grant nothing for this action.
    #[error("Access is denied: cannot {action} {entity}")]
    AccessDenied {
        /// Entity the operation targeted.
        entity: String,
        /// Requested action.
        action: Action,
    },

    /// A policy filter template could not be resolved for the caller.
    #[error("policy compilation error: {0}")]
    PolicyCompilation(String),

    /// A policy definition is malformed.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The read-back needed to restore protected fields failed.
    #[error("store error: {0}")]
    Store(String),
}

impl SecurityError {
    /// Build an access-denied error.
    pub fn access_denied(entity: impl Into<String>, action: Action) -> Self {
        SecurityError::AccessDenied {
            entity: entity.into(),
            action,
        }
    }

    /// Check if this error is an access denial.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, SecurityError::AccessDenied { .. })
    }
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SecurityError::access_denied("User", Action::Update);
        assert_eq!(err.to_string(), "Access is denied: cannot update User");
        assert!(err.is_access_denied());

        let err = SecurityError::PolicyCompilation("missing attribute: org".into());
        assert!(err.to_string().contains("missing attribute: org"));
        assert!(!err.is_access_denied());
    }
}
