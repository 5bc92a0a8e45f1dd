//! Domain errors.
//!
//! Only registry misuse and watcher start-up failures reach callers.
//! Provider errors stay inside the provider client and become failed
//! `ResolutionResult`s.

/// Misuse of the provider registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("provider {0:?} is already registered")]
    DuplicateProvider(String),
    #[error("unknown provider {0:?}")]
    UnknownProvider(String),
}

/// Failure of a single provider lookup.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection refused, reset, timed out, ...
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status: {0}")]
    Status(u16),
    /// Body was not JSON or lacked a required field.
    #[error("malformed response: {0}")]
    Response(String),
    #[error("deadline of {0:?} exceeded")]
    Deadline(std::time::Duration),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status(code) => matches!(code, 500 | 502 | 503 | 504),
            ProviderError::Response(_) | ProviderError::Deadline(_) => false,
        }
    }
}

/// Network change watcher errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatcherError {
    /// Neither native notifications nor polling can be set up.
    #[error("watcher initialization failed: {0}")]
    Init(String),
    #[error("native interface notifications are not supported on this platform")]
    Unsupported,
    #[error("native notification source closed")]
    Closed,
    #[error("native notification error: {0}")]
    Native(String),
}
