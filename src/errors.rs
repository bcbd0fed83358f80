//! Unified error types for the metrics engine.
//!
//! Errors coming back from the CRM are split into transport and authorization
//! failures. Both are treated the same by the degrade policy, but they are
//! logged differently so "no permission" can be told apart from "network down".

use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Network or HTTP failure talking to the CRM
    #[error("CRM transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// The CRM refused the request (missing scope, bad token)
    #[error("CRM authorization error: {message}")]
    Authorization {
        /// Description of the refusal
        message: String,
    },

    /// A bounded operation did not finish in time
    #[error("Operation timed out after {millis} ms")]
    Timeout {
        /// Timeout that elapsed
        millis: u64,
    },

    /// The CRM kept answering 429 after every retry
    #[error("CRM rate limit still exceeded after {attempts} attempts")]
    RateLimited {
        /// Number of attempts made
        attempts: u32,
    },

    /// A CRM payload could not be decoded
    #[error("Failed to decode CRM response: {message}")]
    Decode {
        /// Description of the decoding problem
        message: String,
    },

    /// An unrecoverable step of a dashboard aggregation failed
    #[error("Aggregation failed during {stage}: {source}")]
    Aggregation {
        /// The aggregation step that failed
        stage: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// The caller has no authenticated session
    #[error("Unauthorized: an authenticated session is required")]
    Unauthorized,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the CRM refused the request for lack of permission.
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }

    /// Returns true for network, HTTP, rate-limit and timeout failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// Wraps an error as a failed aggregation step.
    #[must_use]
    pub fn aggregation(stage: &str, source: Self) -> Self {
        Self::Aggregation {
            stage: stage.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Transport {
                message: format!("request timed out: {value}"),
            };
        }
        if value.is_decode() {
            return Self::Decode {
                message: value.to_string(),
            };
        }
        Self::Transport {
            message: value.to_string(),
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
