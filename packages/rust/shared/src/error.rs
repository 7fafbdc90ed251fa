//! Error types for Backlinkoo.
//!
//! Library crates use [`BacklinkooError`] via `thiserror`.
//! App crates (cli/server) wrap this with `color-eyre` or map it onto HTTP
//! responses.

use std::path::PathBuf;

use crate::types::CampaignStatus;

/// Top-level error type for all Backlinkoo operations.
#[derive(Debug, thiserror::Error)]
pub enum BacklinkooError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error talking to an external API.
    #[error("network error: {0}")]
    Network(String),

    /// Response or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Content generation error (LLM API or response handling).
    #[error("generation error: {0}")]
    Generation(String),

    /// Publishing to an external platform failed.
    #[error("publish error on {platform}: {message}")]
    Publish { platform: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (missing fields, malformed URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A campaign status change that the lifecycle does not allow.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BacklinkooError>;

impl BacklinkooError {
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

    /// Create a publish error for the given platform id.
    pub fn publish(platform: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            platform: platform.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for an entity kind and identifier.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error originated in an upstream service rather than in
    /// local input or storage.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Generation(_) | Self::Publish { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BacklinkooError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = BacklinkooError::publish("telegraph", "PAGE_SAVE_FAILED");
        assert_eq!(
            err.to_string(),
            "publish error on telegraph: PAGE_SAVE_FAILED"
        );

        let err = BacklinkooError::not_found("campaign", "abc");
        assert_eq!(err.to_string(), "campaign not found: abc");
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = BacklinkooError::InvalidTransition {
            from: CampaignStatus::Paused,
            to: CampaignStatus::Failed,
        };
        assert_eq!(err.to_string(), "invalid status transition: paused -> failed");
    }

    #[test]
    fn upstream_classification() {
        assert!(BacklinkooError::Generation("timeout".into()).is_upstream());
        assert!(BacklinkooError::publish("writeas", "boom").is_upstream());
        assert!(!BacklinkooError::validation("bad url").is_upstream());
        assert!(!BacklinkooError::Storage("locked".into()).is_upstream());
    }
}
