use std::io;
use thiserror::Error;

/// Errors produced by the scope client.
///
/// No variant is ever recovered from internally; every failure is returned to
/// the caller with the command that was in flight so it can decide whether to
/// resynchronize, reconnect or reset.
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("could not connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("connection to {addr} timed out")]
    ConnectTimeout { addr: String },

    #[error("short write while sending {command:?}: {written} of {expected} bytes")]
    Write {
        command: String,
        written: usize,
        expected: usize,
    },

    #[error("timed out waiting for a response to {command:?}")]
    Timeout { command: String },

    #[error("protocol format error: {0}")]
    Format(String),

    #[error("connection is closed")]
    Closed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error while {context}: {source}")]
    Io { source: io::Error, context: String },
}
