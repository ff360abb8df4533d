//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the intake pipeline depends on.
//!
//! Production: file-backed stores and the HS256 verifier in `adapters/`.
//! Testing: the in-memory adapters in `adapters::memory`.
//!
//! All ports take `&self`; adapters own their synchronization so a single
//! service can be shared across worker threads.

use crate::domain::entities::{
    Acknowledgement, AttachmentRef, ConversationEvent, InsertOutcome, StoredMessage,
};
use crate::domain::errors::{
    AcknowledgementError, AttachmentError, ConversationError, StoreError, VerifierError,
};
use crate::domain::value_objects::StatusUpdate;
use chrono::{DateTime, Utc};
use shared_types::{ConversationDirection, Envelope, ServiceIdentifier};
use std::io::Read;
use std::sync::Arc;
use uuid::Uuid;

/// Durable deduplication records, unique on `document_id`.
pub trait MessageStore: Send + Sync {
    fn find(&self, document_id: &str) -> Result<Option<StoredMessage>, StoreError>;

    /// Insert unless a record for the same `document_id` exists.
    ///
    /// ## Atomicity
    ///
    /// The existence check and the insert are one step. Two concurrent calls
    /// for the same document yield exactly one `Inserted`.
    fn insert_if_absent(&self, message: StoredMessage) -> Result<InsertOutcome, StoreError>;

    /// Remove a record. Used only to compensate a failed unit of work.
    fn delete(&self, document_id: &str) -> Result<(), StoreError>;
}

/// Durable attachment container storage.
pub trait AttachmentStore: Send + Sync {
    /// Stream `reader` to the slot for (`document_id`, `name`).
    ///
    /// A partially written container must not be visible after an error.
    fn write_stream(
        &self,
        document_id: &str,
        name: &str,
        reader: &mut dyn Read,
    ) -> Result<AttachmentRef, AttachmentError>;

    fn delete(&self, document_id: &str, name: &str) -> Result<(), AttachmentError>;
}

/// Conversation bookkeeping.
pub trait ConversationService: Send + Sync {
    /// Create or update the conversation for `envelope.message_id`,
    /// optionally appending a status.
    fn register_conversation(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        direction: ConversationDirection,
        status: Option<StatusUpdate>,
    ) -> Result<ConversationEvent, ConversationError>;

    /// Append a status to an existing conversation.
    ///
    /// Returns `None` when no conversation exists for `message_id`.
    fn register_status(
        &self,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<Option<ConversationEvent>, ConversationError>;

    /// Undo the mutation described by `event`.
    fn revert(&self, event: &ConversationEvent) -> Result<(), ConversationError>;
}

/// Outbound receipt queue.
pub trait AcknowledgementQueue: Send + Sync {
    fn enqueue(&self, acknowledgement: Acknowledgement) -> Result<(), AcknowledgementError>;

    /// Withdraw a queued acknowledgement that has not been sent yet.
    fn cancel(&self, acknowledgement_id: Uuid) -> Result<(), AcknowledgementError>;
}

/// Durable holding area for acknowledgements the queue refused after their
/// document was committed. Survives restarts so a redrive can still deliver
/// them; redelivery of the document itself only ever yields a duplicate.
pub trait ParkedAcknowledgementStore: Send + Sync {
    fn park(&self, acknowledgement: Acknowledgement) -> Result<(), StoreError>;

    /// Parked acknowledgements, oldest first.
    fn parked(&self) -> Result<Vec<Acknowledgement>, StoreError>;

    /// Forget an acknowledgement the queue has taken.
    fn release(&self, acknowledgement_id: Uuid) -> Result<(), StoreError>;
}

/// Verifies the compact JWS carried in the signed-token scope.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<(), VerifierError>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// =============================================================================
// SHARED HANDLES
// Lets callers keep an `Arc` to an adapter for inspection while the service
// owns another.
// =============================================================================

impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    fn find(&self, document_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        (**self).find(document_id)
    }

    fn insert_if_absent(&self, message: StoredMessage) -> Result<InsertOutcome, StoreError> {
        (**self).insert_if_absent(message)
    }

    fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        (**self).delete(document_id)
    }
}

impl<T: AttachmentStore + ?Sized> AttachmentStore for Arc<T> {
    fn write_stream(
        &self,
        document_id: &str,
        name: &str,
        reader: &mut dyn Read,
    ) -> Result<AttachmentRef, AttachmentError> {
        (**self).write_stream(document_id, name, reader)
    }

    fn delete(&self, document_id: &str, name: &str) -> Result<(), AttachmentError> {
        (**self).delete(document_id, name)
    }
}

impl<T: ConversationService + ?Sized> ConversationService for Arc<T> {
    fn register_conversation(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        direction: ConversationDirection,
        status: Option<StatusUpdate>,
    ) -> Result<ConversationEvent, ConversationError> {
        (**self).register_conversation(envelope, service_identifier, direction, status)
    }

    fn register_status(
        &self,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<Option<ConversationEvent>, ConversationError> {
        (**self).register_status(message_id, update)
    }

    fn revert(&self, event: &ConversationEvent) -> Result<(), ConversationError> {
        (**self).revert(event)
    }
}

impl<T: AcknowledgementQueue + ?Sized> AcknowledgementQueue for Arc<T> {
    fn enqueue(&self, acknowledgement: Acknowledgement) -> Result<(), AcknowledgementError> {
        (**self).enqueue(acknowledgement)
    }

    fn cancel(&self, acknowledgement_id: Uuid) -> Result<(), AcknowledgementError> {
        (**self).cancel(acknowledgement_id)
    }
}

impl<T: ParkedAcknowledgementStore + ?Sized> ParkedAcknowledgementStore for Arc<T> {
    fn park(&self, acknowledgement: Acknowledgement) -> Result<(), StoreError> {
        (**self).park(acknowledgement)
    }

    fn parked(&self) -> Result<Vec<Acknowledgement>, StoreError> {
        (**self).parked()
    }

    fn release(&self, acknowledgement_id: Uuid) -> Result<(), StoreError> {
        (**self).release(acknowledgement_id)
    }
}

impl<T: TokenVerifier + ?Sized> TokenVerifier for Arc<T> {
    fn verify(&self, token: &str) -> Result<(), VerifierError> {
        (**self).verify(token)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
