//! Error types for the integration engine.

use crate::dispatch::DispatchKey;
use thiserror::Error;

/// Errors that can occur when working with the integration engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two integrations tried to register the same dispatch key.
    ///
    /// This is a configuration or programming error and fails loudly at
    /// registration time; everything else in the engine degrades by
    /// dropping and logging instead.
    #[error("dispatch key already registered: {0}")]
    DuplicateKey(DispatchKey),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
