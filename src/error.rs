//! Error types for the step runner.
//!
//! Two families live here:
//!
//! - [`StepError`] is the failure carried inside a [`Response`](crate::Response).
//!   It is recorded per process key and never aborts sibling jobs on its own.
//! - [`FanoutError`] is returned synchronously from construction and
//!   configuration calls, before any run starts.

use crate::config::ConfigurationError;
use thiserror::Error;

/// Failure of a single job, a cancelled/timed-out job, or a merged collector result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// The step function (or a collector) reported a failure
    #[error("{0}")]
    Failed(String),
    /// The execution context was cancelled while the step was running
    #[error("context cancelled")]
    Cancelled,
    /// The per-job deadline elapsed while the step was running
    #[error("context deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },
    /// The job was never started because the run had already been cancelled
    #[error("{process_key}: cancelled before execute: context cancelled")]
    NotExecuted { process_key: String },
    /// The step panicked and panic-as-error converted it into a failure
    #[error("panic in step {step_key} ({process_key}): {message}")]
    Panicked {
        step_key: String,
        process_key: String,
        message: String,
    },
}

impl StepError {
    /// Build a [`StepError::Failed`] from anything displayable
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        StepError::Failed(reason.to_string())
    }

    /// True for failures caused by cancellation or timeout of the execution context
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            StepError::Cancelled | StepError::DeadlineExceeded { .. } | StepError::NotExecuted { .. }
        )
    }

    /// True if this failure was converted from a panic
    pub fn is_panic(&self) -> bool {
        matches!(self, StepError::Panicked { .. })
    }
}

impl From<anyhow::Error> for StepError {
    fn from(error: anyhow::Error) -> Self {
        StepError::Failed(format!("{error:#}"))
    }
}

impl From<String> for StepError {
    fn from(reason: String) -> Self {
        StepError::Failed(reason)
    }
}

impl From<&str> for StepError {
    fn from(reason: &str) -> Self {
        StepError::Failed(reason.to_string())
    }
}

/// Errors surfaced synchronously to the caller, outside the results map
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, FanoutError>;

/// Result returned by step functions and collectors
pub type StepResult<T> = std::result::Result<T, StepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_errors_mention_context() {
        assert!(StepError::Cancelled.to_string().contains("context"));
        assert!(StepError::DeadlineExceeded { timeout_ms: 10 }
            .to_string()
            .contains("context"));
        let skipped = StepError::NotExecuted {
            process_key: "slow".to_string(),
        };
        assert!(skipped.to_string().contains("context"));
        assert!(skipped.to_string().starts_with("slow"));
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(StepError::Cancelled.is_cancellation());
        assert!(StepError::DeadlineExceeded { timeout_ms: 1 }.is_cancellation());
        assert!(!StepError::failed("boom").is_cancellation());
        assert!(!StepError::Panicked {
            step_key: "a".into(),
            process_key: "a".into(),
            message: "x".into(),
        }
        .is_cancellation());
    }

    #[test]
    fn test_panic_message_carries_identifiers() {
        let err = StepError::Panicked {
            step_key: "resize".to_string(),
            process_key: "resize#batch_2".to_string(),
            message: "kaboom".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("panic"));
        assert!(text.contains("resize"));
        assert!(text.contains("resize#batch_2"));
        assert!(text.contains("kaboom"));
    }

    #[test]
    fn test_fanout_error_only_wraps_configuration() {
        let err: FanoutError = ConfigurationError::UnknownField {
            field: "retries".to_string(),
        }
        .into();
        match err {
            FanoutError::Configuration(inner) => {
                assert_eq!(inner.to_string(), "Unknown configuration field: retries")
            }
        }
    }

    #[test]
    fn test_anyhow_conversion_keeps_chain() {
        let source = anyhow::anyhow!("connection refused").context("loading rows");
        let err: StepError = source.into();
        assert_eq!(
            err,
            StepError::Failed("loading rows: connection refused".to_string())
        );
    }
}
