use thiserror::Error;

/// Errors reported by the cache and the rule registry.
///
/// Lookups of missing keys or unknown rule ids are not errors; they are reported as `None` or `false`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(#[from] garde::Report),

    #[error(transparent)]
    Builder(#[from] fieldx::error::FieldXError),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to compile pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl CacheError {
    pub(crate) fn invalid_pattern<P: ToString, R: ToString>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason:  reason.to_string(),
        }
    }
}

/// A failure raised by an invalidation rule callback or by one of the invalidation steps of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleError {
    message: String,
}

impl RuleError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CacheError> for RuleError {
    fn from(err: CacheError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("malformed event payload: {err}"))
    }
}

impl From<String> for RuleError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RuleError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[macro_export]
macro_rules! rule_err {
    ($($t:tt)*) => {
        $crate::error::RuleError::new(format!($($t)*))
    };
}
