//! Error types for provider operations.
//!
//! The taxonomy separates failures by blast radius: a template or parse
//! error aborts the single operation or record being processed, while a
//! channel error takes out every operation routed through that session
//! until it is re-established. A mutating command that ran and failed is
//! deliberately *not* an error here; the driver logs it and reports
//! success observationally via a post-operation existence check.

use thiserror::Error;

/// Errors that can occur while rendering, executing, or decoding commands.
#[derive(Debug, Error)]
pub enum Error {
    /// A command template referenced a property the spec does not carry
    #[error("missing required property `{property}` for {operation}")]
    MissingProperty {
        /// Operation whose template referenced the property
        operation: &'static str,
        /// Name of the absent property
        property: &'static str,
    },

    /// A desired-state spec was rejected at construction time
    #[error("invalid site spec: {message}")]
    InvalidSpec {
        /// Why the spec was rejected
        message: String,
    },

    /// The external session is unreachable or its pipes broke
    #[error("channel error: {message}")]
    Channel {
        /// Detail from the failed session operation
        message: String,
    },

    /// A boolean-like field held text that is neither truthy nor falsy
    #[error("invalid value for boolean: {value:?}")]
    BooleanParse {
        /// The offending text
        value: String,
    },

    /// A state field held text that is not a known ensure state
    #[error("invalid value for ensure state: {value:?}")]
    EnsureParse {
        /// The offending text
        value: String,
    },

    /// PowerShell is not installed or not found in PATH
    #[error("PowerShell not found in any known location")]
    PowerShellNotFound,

    /// Discovery output was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;
