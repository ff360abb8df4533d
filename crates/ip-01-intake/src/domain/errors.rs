//! # Domain Errors
//!
//! One error type per collaborator port, plus [`IntakeError`] which the
//! pipeline returns to its caller.
//!
//! Expired documents, bad signatures and redeliveries are not errors; they
//! are reported as outcomes. Only malformed envelopes and collaborator
//! failures surface here.

use thiserror::Error;

/// Message store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Message store I/O error: {message}")]
    Io { message: String },

    #[error("Message store data corrupted: {message}")]
    Corruption { message: String },

    #[error("Message store unavailable: {message}")]
    Unavailable { message: String },
}

/// Attachment store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("Attachment I/O error: {message}")]
    Io { message: String },

    /// The document id cannot be used as a storage key.
    #[error("Invalid attachment key: {key}")]
    InvalidKey { key: String },

    #[error("Attachment store unavailable: {message}")]
    Unavailable { message: String },
}

impl From<std::io::Error> for AttachmentError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Conversation service failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("Conversation service unavailable: {message}")]
    Unavailable { message: String },

    #[error("Conversation ledger I/O error: {message}")]
    Io { message: String },

    #[error("Conversation ledger data corrupted: {message}")]
    Corruption { message: String },

    #[error("Conversation event {event_id} cannot be reverted")]
    RevertFailed { event_id: String },
}

/// Acknowledgement queue failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcknowledgementError {
    #[error("Acknowledgement rejected: {reason}")]
    Rejected { reason: String },

    #[error("Acknowledgement queue unavailable: {message}")]
    Unavailable { message: String },
}

/// Signed-token verifier failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    /// The token is malformed or its signature does not verify.
    #[error("{0}")]
    BadSignature(String),

    /// Verification could not be carried out (missing key material, HSM
    /// down). Not a verdict on the token.
    #[error("Verifier unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the intake entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    /// The envelope carries neither a business nor a status payload.
    #[error("Envelope for document {document_id} has an unrecognized payload")]
    UnrecognizedPayload { document_id: String },

    #[error("Signature verification could not be performed: {0}")]
    VerifierUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Acknowledgement(#[from] AcknowledgementError),

    /// Another writer stored the document with a different attachment, and
    /// the shared slot now holds bytes its record does not describe.
    #[error("Attachment for document {document_id} conflicts with the stored record")]
    AttachmentConflict { document_id: String },
}

impl IntakeError {
    /// Whether the caller may retry the same delivery later.
    ///
    /// Malformed envelopes, unusable storage keys, corrupt stores and
    /// attachment conflicts fail the same way on every retry.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::UnrecognizedPayload { .. }
                | Self::AttachmentConflict { .. }
                | Self::Attachment(AttachmentError::InvalidKey { .. })
                | Self::Store(StoreError::Corruption { .. })
                | Self::Conversation(ConversationError::Corruption { .. })
        )
    }
}
