//! Error types for device links, program execution and program loading

use thiserror::Error;

/// Failures reported by a device link for a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Device not connected")]
    NotConnected,

    #[error("No cached value for property '{0}'")]
    NoCachedValue(String),

    #[error("Request dropped before a reply arrived")]
    Dropped,

    #[error("Device error: {0}")]
    Device(String),
}

/// Terminal errors that move a program into the error state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// The dispatched command itself failed
    #[error("Command '{command}' failed: {source}")]
    Command {
        command: String,
        #[source]
        source: LinkError,
    },

    /// A forced status refresh failed
    #[error("Status query failed: {0}")]
    StatusQuery(#[source] LinkError),

    /// Reading the cached status property failed
    #[error("Cached status unavailable: {0}")]
    CachedStatus(#[source] LinkError),
}

/// Name that matches no subscribable event kind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown event kind '{0}'")]
pub struct UnknownEventKind(pub String);

/// Errors raised while decoding a program
#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Invalid JSON program: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read program file: {0}")]
    Io(#[from] std::io::Error),
}
