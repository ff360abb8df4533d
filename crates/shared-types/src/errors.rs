//! # Error Types
//!
//! Errors raised when parsing the textual forms of shared enumerations.

use thiserror::Error;

/// Errors produced while interpreting envelope metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The value does not name a known service identifier.
    #[error("Unknown service identifier: {0}")]
    UnknownServiceIdentifier(String),

    /// The value does not name a known receipt status.
    #[error("Unknown receipt status: {0}")]
    UnknownReceiptStatus(String),

    /// The value does not name a known message type.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),
}
