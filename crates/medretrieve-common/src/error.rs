//! The §7 error taxonomy as a single enum shared by every crate boundary.
//!
//! Wire values (`code()`) are stable strings consumed by the tool invoker's
//! response envelope and by the job worker's retry classifier.

use thiserror::Error;

/// Stable wire value for an error, independent of its Rust variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation,
    NotFound,
    RateLimit,
    Upstream,
    Timeout,
    BreakerOpen,
    Unavailable,
    Conflict,
    Invariant,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Upstream => "UPSTREAM",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::BreakerOpen => "BREAKER_OPEN",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::Invariant => "INVARIANT",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// §7 propagation policy: terminal errors are never retried by the job worker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorCode::Validation | ErrorCode::NotFound | ErrorCode::Conflict)
    }

    /// §4.9 retry classification: these are retried with the job backoff schedule.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit | ErrorCode::Upstream | ErrorCode::Timeout | ErrorCode::BreakerOpen
        )
    }
}

#[derive(Debug, Error)]
pub enum MedretrieveError {
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("upstream dependency error: {0}")]
    Upstream(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("circuit breaker open for {0}")]
    BreakerOpen(String),

    #[error("service not ready: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MedretrieveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MedretrieveError::Validation { .. } => ErrorCode::Validation,
            MedretrieveError::NotFound(_) => ErrorCode::NotFound,
            MedretrieveError::RateLimit(_) => ErrorCode::RateLimit,
            MedretrieveError::Upstream(_) => ErrorCode::Upstream,
            MedretrieveError::Timeout(_) => ErrorCode::Timeout,
            MedretrieveError::BreakerOpen(_) => ErrorCode::BreakerOpen,
            MedretrieveError::Unavailable(_) => ErrorCode::Unavailable,
            MedretrieveError::Conflict(_) => ErrorCode::Conflict,
            MedretrieveError::Invariant(_) => ErrorCode::Invariant,
            MedretrieveError::Database(_) => ErrorCode::Upstream,
            MedretrieveError::Serialization(_) => ErrorCode::Validation,
            MedretrieveError::Other(_) => ErrorCode::Unknown,
        }
    }

    /// Truncated to the ≤500 char limit the wire envelope guarantees (§6).
    pub fn user_message(&self) -> String {
        let msg = self.to_string();
        if msg.len() > 500 {
            let cut = msg.char_indices().map(|(i, _)| i).take_while(|&i| i < 497).last().unwrap_or(0);
            format!("{}…", &msg[..cut])
        } else {
            msg
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        MedretrieveError::Validation { field: field.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, MedretrieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_codes_are_not_retryable() {
        for c in [ErrorCode::Validation, ErrorCode::NotFound, ErrorCode::Conflict] {
            assert!(c.is_terminal());
            assert!(!c.is_retryable());
        }
    }

    #[test]
    fn retryable_codes_are_not_terminal() {
        for c in [ErrorCode::RateLimit, ErrorCode::Upstream, ErrorCode::Timeout, ErrorCode::BreakerOpen] {
            assert!(c.is_retryable());
            assert!(!c.is_terminal());
        }
    }

    #[test]
    fn long_message_is_truncated() {
        let err = MedretrieveError::Upstream("x".repeat(1000));
        assert!(err.user_message().len() <= 500);
    }

    #[test]
    fn long_non_ascii_message_truncates_without_panicking_on_a_char_boundary() {
        let err = MedretrieveError::Upstream("é".repeat(1000));
        let message = err.user_message();
        assert!(message.len() <= 500);
        assert!(message.is_char_boundary(message.len() - "…".len()));
    }
}
