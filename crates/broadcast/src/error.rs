//! Hub error types.

use thiserror::Error;

/// Hub error type.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub's event loop is gone and commands can no longer be delivered.
    #[error("hub channel send error")]
    ChannelSend,
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
