//! Error types for CourseGen.
//!
//! Library crates use [`CourseGenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all CourseGen operations.
#[derive(Debug, thiserror::Error)]
pub enum CourseGenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the AI client (media fetches).
    #[error("network error: {0}")]
    Network(String),

    /// The generative AI service was unavailable or returned unusable output.
    #[error("ai error: {0}")]
    Ai(String),

    /// JSON or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (missing course id, bad metadata, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A document was written by someone else since it was loaded.
    #[error("conflict: {key} moved from version {expected} to {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// The persisted cursor names a step this build does not know.
    #[error("unknown pipeline step: {0:?}")]
    UnknownStep(String),

    /// A stored course document exists but cannot be decoded.
    #[error("course {course_id} is corrupt: {message}")]
    Corrupt { course_id: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CourseGenError>;

impl CourseGenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether polling again can make progress.
    ///
    /// Terminal errors (corrupt drafts, unknown steps, bad input) need a human.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Corrupt { .. } | Self::UnknownStep(_) | Self::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CourseGenError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CourseGenError::Conflict {
            key: "intro-to-rust-1a2b3c4d".into(),
            expected: 3,
            actual: 4,
        };
        assert!(err.to_string().contains("version 3 to 4"));
    }

    #[test]
    fn retryable_classification() {
        assert!(CourseGenError::Ai("timeout".into()).is_retryable());
        assert!(CourseGenError::Storage("locked".into()).is_retryable());
        assert!(
            CourseGenError::Conflict {
                key: "k".into(),
                expected: 1,
                actual: 2
            }
            .is_retryable()
        );
        assert!(!CourseGenError::UnknownStep("publish".into()).is_retryable());
        assert!(
            !CourseGenError::Corrupt {
                course_id: "c".into(),
                message: "bad json".into()
            }
            .is_retryable()
        );
    }
}
