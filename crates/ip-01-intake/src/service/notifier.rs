//! # Status Notifier
//!
//! Records conversation status changes and queues acknowledgements back to
//! the sender.

use crate::domain::entities::{Acknowledgement, ConversationEvent};
use crate::domain::errors::{AcknowledgementError, ConversationError};
use crate::domain::expiry::ExpiryGuard;
use crate::domain::signature::rejection_description;
use crate::domain::value_objects::StatusUpdate;
use crate::ports::outbound::{AcknowledgementQueue, ConversationService};
use shared_types::{ConversationDirection, Envelope, ReceiptStatus, ServiceIdentifier, StatusMessage};
use uuid::Uuid;

pub struct StatusNotifier<CS, AQ>
where
    CS: ConversationService,
    AQ: AcknowledgementQueue,
{
    conversations: CS,
    acknowledgements: AQ,
}

impl<CS, AQ> StatusNotifier<CS, AQ>
where
    CS: ConversationService,
    AQ: AcknowledgementQueue,
{
    pub fn new(conversations: CS, acknowledgements: AQ) -> Self {
        Self {
            conversations,
            acknowledgements,
        }
    }

    pub fn conversations(&self) -> &CS {
        &self.conversations
    }

    pub fn acknowledgements(&self) -> &AQ {
        &self.acknowledgements
    }

    /// Register the conversation with an EXPIRED status.
    pub fn register_expired(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
    ) -> Result<ConversationEvent, ConversationError> {
        let update =
            StatusUpdate::new(ReceiptStatus::Expired).with_description(ExpiryGuard::describe(envelope));
        self.register(envelope, service_identifier, update)
    }

    /// Register the conversation with a FAILED status carrying the
    /// verifier's reason.
    pub fn register_rejection(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        reason: &str,
    ) -> Result<ConversationEvent, ConversationError> {
        let update =
            StatusUpdate::new(ReceiptStatus::Failed).with_description(rejection_description(reason));
        self.register(envelope, service_identifier, update)
    }

    /// Register the conversation with the local INCOMING_RECEIVED status.
    pub fn register_received(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
    ) -> Result<ConversationEvent, ConversationError> {
        self.register(
            envelope,
            service_identifier,
            StatusUpdate::new(ReceiptStatus::IncomingReceived),
        )
    }

    /// Apply a status receipt to the conversation it refers to.
    ///
    /// Returns `None` when no such conversation exists.
    pub fn apply_receipt(
        &self,
        envelope: &Envelope,
        receipt: &StatusMessage,
    ) -> Result<Option<ConversationEvent>, ConversationError> {
        let mut update = StatusUpdate::new(receipt.status);
        update.description = receipt.description.clone();
        self.conversations
            .register_status(envelope.message_id(), update)
    }

    pub fn revert(&self, event: &ConversationEvent) -> Result<(), ConversationError> {
        self.conversations.revert(event)
    }

    pub fn enqueue(&self, acknowledgement: Acknowledgement) -> Result<(), AcknowledgementError> {
        self.acknowledgements.enqueue(acknowledgement)
    }

    pub fn cancel(&self, acknowledgement_id: Uuid) -> Result<(), AcknowledgementError> {
        self.acknowledgements.cancel(acknowledgement_id)
    }

    fn register(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        update: StatusUpdate,
    ) -> Result<ConversationEvent, ConversationError> {
        self.conversations.register_conversation(
            envelope,
            service_identifier,
            ConversationDirection::Incoming,
            Some(update),
        )
    }
}
