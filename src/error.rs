//! Error taxonomy for the serial core.
//!
//! Transport errors are caught where they happen and turned into user-visible
//! notifications; these types carry the detail for logs and for the command
//! layer.

use std::io;
use thiserror::Error;

/// Errors that end a connection attempt.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The platform cannot enumerate or open serial ports.
    #[error("serial ports are not supported on this platform: {0}")]
    Unsupported(String),

    /// No port was selected, or access to it was refused.
    #[error("no serial port selected: {0}")]
    PermissionDenied(String),

    /// A connection is already open or being opened on this session.
    #[error("already connected or connection attempt in progress")]
    AlreadyConnected,

    /// Opening the port raised a transport fault.
    #[error("failed to open {port}: {message}")]
    Open { port: String, message: String },

    /// A disconnect arrived before the port finished opening.
    #[error("connect cancelled")]
    Cancelled,
}

/// Faults raised by the read loop. Always terminal for the connection.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("serial read failed: {0}")]
    Io(#[source] io::Error),

    #[error("received bytes are not valid UTF-8: {0}")]
    Decode(#[source] std::str::Utf8Error),
}

/// Faults raised by a write. These never tear the session down.
#[derive(Debug, Error)]
pub enum WriteError {
    /// No write handle is open.
    #[error("not connected: no write path available")]
    NotConnected,

    /// The writer worker went away while the write was queued.
    #[error("write path closed")]
    Closed,

    #[error("serial write failed: {0}")]
    Io(#[source] io::Error),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Rejected rule fields or inbound reports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{channel} channel must be between 0 and 255, got {value}")]
    ColorChannel { channel: &'static str, value: i64 },

    #[error("pin number must be one of 2, 3 or 4, got {0}")]
    PinNumber(i64),

    #[error("pin state must be HIGH or LOW, got '{0}'")]
    PinState(String),

    #[error("malformed color report '{raw}': {reason}")]
    MalformedReport { raw: String, reason: String },
}

impl ValidationError {
    /// Name of the field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::ColorChannel { channel, .. } => channel,
            ValidationError::PinNumber(_) => "pinNumber",
            ValidationError::PinState(_) => "pinState",
            ValidationError::MalformedReport { .. } => "report",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule {0} not found")]
    NotFound(String),
}

/// Why a rule was not stored. Transmission problems are not listed: a stored
/// rule stays stored whether or not the send board took it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaveRuleError {
    #[error("validation failed: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Rule(#[from] RuleError),
}
