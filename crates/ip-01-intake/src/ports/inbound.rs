//! # Inbound Ports (Driving Ports)
//!
//! The API the transport layer calls once it has decoded an envelope.

use crate::domain::attachment::AttachmentStream;
use crate::domain::entities::{Acknowledgement, StoredMessage};
use crate::domain::errors::IntakeError;
use shared_types::{Envelope, ReceiptStatus, ServiceIdentifier};
use uuid::Uuid;

/// Where the RECEIVED acknowledgement for an accepted document ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgementState {
    Queued(Uuid),
    /// The queue refused it after commit; it waits for redrive.
    Parked(Uuid),
}

impl AcknowledgementState {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Queued(id) | Self::Parked(id) => *id,
        }
    }
}

/// What the pipeline did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// First delivery of a valid document: persisted, conversation updated,
    /// acknowledgement queued.
    Accepted {
        message: StoredMessage,
        acknowledgement: AcknowledgementState,
    },
    /// Redelivery of a document that is already persisted. Nothing changed.
    Duplicate { message: StoredMessage },
    /// The validity window closed before intake. An EXPIRED status was
    /// recorded; nothing was persisted.
    Expired { document_id: String },
    /// A status receipt was applied to the conversation it refers to.
    StatusRecorded {
        message_id: String,
        status: ReceiptStatus,
        /// `false` when no conversation exists for `message_id`.
        conversation_found: bool,
    },
    /// The signed token did not verify. A FAILED status was recorded;
    /// nothing was persisted.
    SignatureRejected { document_id: String, reason: String },
}

impl IntakeOutcome {
    /// The stored record, for outcomes that resolve to one.
    pub fn stored_message(&self) -> Option<&StoredMessage> {
        match self {
            Self::Accepted { message, .. } | Self::Duplicate { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result of a redrive pass over parked acknowledgements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedriveReport {
    pub delivered: usize,
    pub still_pending: usize,
}

/// Intake API.
pub trait IntakeApi: Send + Sync {
    /// Run an inbound envelope through expiry, receipt, signature and
    /// deduplication handling.
    ///
    /// The attachment stream, when given, is released before this returns,
    /// whatever the outcome.
    fn enqueue_incoming_message(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        attachment: Option<AttachmentStream>,
    ) -> Result<IntakeOutcome, IntakeError>;

    /// Entry point for envelopes that carry no attachment. Same semantics as
    /// [`IntakeApi::enqueue_incoming_message`].
    fn enqueue_incoming_status(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
    ) -> Result<IntakeOutcome, IntakeError> {
        self.enqueue_incoming_message(envelope, service_identifier, None)
    }

    fn find_message(&self, document_id: &str) -> Result<Option<StoredMessage>, IntakeError>;

    /// Acknowledgements committed but not yet accepted by the queue.
    fn pending_acknowledgements(&self) -> Result<Vec<Acknowledgement>, IntakeError>;

    /// Try every parked acknowledgement once more. Delivered ones are
    /// unparked.
    fn redrive_acknowledgements(&self) -> Result<RedriveReport, IntakeError>;
}
