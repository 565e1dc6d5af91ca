// Error taxonomy
// Per-subsystem errors rolled up into EngineError

use thiserror::Error;

/// Failure while invoking a popped schedule entry.
/// Caught per entry by the scheduler loop; never stops the loop.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("voice '{voice}' pattern evaluation failed: {reason}")]
    PatternEval { voice: String, reason: String },

    #[error("scheduled action failed: {0}")]
    Failed(String),
}

/// Delivery to the external sink failed or was rejected.
/// Reported asynchronously; the originating voice is not retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("outbound queue full, message dropped")]
    QueueFull,

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Clock synchronization errors. Timeouts discard the sample; the
/// client keeps scheduling on its local clock.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no reply within {0} ms")]
    Timeout(u64),

    #[error("malformed sync message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading/validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;
