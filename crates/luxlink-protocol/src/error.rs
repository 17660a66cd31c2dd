//! Error types for the integration protocol.

use thiserror::Error;

/// Errors that can occur when working with the integration protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A received line could not be parsed into a message.
    ///
    /// Malformed lines are expected on a shared terminal link (banners,
    /// echoes, noise) and are dropped by the caller, never treated as fatal.
    #[error("malformed message '{line}': {reason}")]
    MalformedMessage {
        /// The raw line as received (delimiters already stripped).
        line: String,
        /// Why the line was rejected.
        reason: String,
    },
}

impl ProtocolError {
    /// Build a [`ProtocolError::MalformedMessage`] for the given line.
    pub fn malformed(line: &str, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedMessage {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
