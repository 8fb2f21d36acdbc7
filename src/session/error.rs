use thiserror::Error;

use crate::protocol::CommandParseError;

/// Everything a session caller can be told about a failed operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandParseError),
    #[error("device error {code}: {message}")]
    Device { code: i64, message: String },
    #[error("tool error {code}: {message}")]
    Tool { code: i64, message: String },
    #[error("discarded by a stop command")]
    Discarded,
    #[error("transport lost: {0}")]
    TransportLost(String),
    #[error("timed out waiting for the tool catalog")]
    Timeout,
    #[error("a tool discovery is already pending")]
    DiscoveryInProgress,
    #[error("axes did not settle in time")]
    IdleTimeout,
    #[error("no tool command '{0}' in the catalog")]
    UnknownToolCommand(String),
    #[error("tool command '{0}' requires a value")]
    MissingValue(String),
    #[error("session closed")]
    Closed,
}
