//! Error types for the uni-nlp runtime.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Unified error type covering configuration, loading, input validation and
/// inference failures.
///
/// Variants are coarse-grained so that callers (the analysis service, the HTTP
/// layer) can match on error *category* rather than on backend details.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Invalid or missing configuration (bad alias format, unknown option, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested provider ID is not registered with the runtime.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// A model was requested for a task the provider does not support.
    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),

    /// Model loading or initialization failed (download, weight parsing, etc.).
    #[error("Load error: {0}")]
    Load(String),

    /// The caller supplied input the service refuses to analyze (blank text,
    /// empty candidate label list).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An error during model inference (tokenization, forward pass, output
    /// shape mismatch, etc.).
    #[error("Inference error: {0}")]
    InferenceError(String),

    /// The operation exceeded its configured timeout.
    #[error("Timeout")]
    Timeout,

    /// The model is currently unavailable (not loaded, circuit breaker open, etc.).
    #[error("Unavailable")]
    Unavailable,
}

impl RuntimeError {
    /// Returns `true` for transient errors that may succeed on retry:
    /// [`Timeout`](Self::Timeout) and [`Unavailable`](Self::Unavailable).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable)
    }

    /// Returns `true` when the failure belongs to the model engine rather than
    /// to the request, so a different engine may still serve the request.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            Self::Load(_) | Self::InferenceError(_) | Self::Timeout | Self::Unavailable
        )
    }
}
