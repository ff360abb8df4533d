//! # Domain Entities
//!
//! Records produced by the intake stage and handed to its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    ConversationDirection, Envelope, MessageType, ReceiptStatus, ServiceIdentifier,
};
use uuid::Uuid;

/// Reference to an attachment container that has been durably written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// File name of the container within the document's slot.
    pub name: String,
    /// Bytes written.
    pub size: u64,
    /// Lower-case hex SHA-256 of the written bytes.
    pub sha256: String,
    /// Adapter-specific location (path, object key).
    pub location: String,
}

/// The deduplication record for one inbound document.
///
/// Exactly one exists per `document_id`. Redeliveries resolve to the same
/// record, identified by `record_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub record_id: Uuid,
    pub document_id: String,
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub service_identifier: ServiceIdentifier,
    pub message_type: Option<MessageType>,
    /// Sender identifier with the authority prefix stripped.
    pub sender: Option<String>,
    /// Receiver identifier with the authority prefix stripped.
    pub receiver: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub received_at: DateTime<Utc>,
    pub envelope: Envelope,
}

impl StoredMessage {
    /// Build a fresh record for `envelope`.
    pub fn new(
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        attachment: Option<AttachmentRef>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            document_id: envelope.document_id().to_string(),
            message_id: envelope.message_id().to_string(),
            conversation_id: envelope.conversation_id().map(str::to_string),
            service_identifier,
            message_type: envelope.message_type(),
            sender: envelope.sender_identifier().map(str::to_string),
            receiver: envelope.receiver_identifier().map(str::to_string),
            attachment,
            received_at,
            envelope: envelope.clone(),
        }
    }
}

/// Result of an insert against the message store's uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was created by this call.
    Inserted(StoredMessage),
    /// A record for the document already existed and is returned unchanged.
    Existing(StoredMessage),
}

impl InsertOutcome {
    pub fn message(&self) -> &StoredMessage {
        match self {
            Self::Inserted(message) | Self::Existing(message) => message,
        }
    }

    pub fn into_message(self) -> StoredMessage {
        match self {
            Self::Inserted(message) | Self::Existing(message) => message,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// One status appended to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub event_id: Uuid,
    pub status: ReceiptStatus,
    pub description: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Conversation history kept by the conversation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub document_id: String,
    pub service_identifier: ServiceIdentifier,
    pub direction: ConversationDirection,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub message_type: Option<MessageType>,
    pub created_at: DateTime<Utc>,
    pub statuses: Vec<StatusEntry>,
}

impl ConversationRecord {
    pub fn latest_status(&self) -> Option<&StatusEntry> {
        self.statuses.last()
    }

    pub fn has_status(&self, status: ReceiptStatus) -> bool {
        self.statuses.iter().any(|entry| entry.status == status)
    }
}

/// Handle to a conversation mutation, kept so it can be reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEvent {
    pub event_id: Uuid,
    pub message_id: String,
    /// The conversation did not exist before this event.
    pub conversation_created: bool,
    pub status: Option<ReceiptStatus>,
}

/// A receipt queued back to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub id: Uuid,
    pub document_id: String,
    pub message_id: String,
    pub conversation_id: Option<String>,
    pub service_identifier: ServiceIdentifier,
    pub status: ReceiptStatus,
    /// The party the receipt goes back to.
    pub recipient: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Acknowledgement {
    pub fn for_message(
        message: &StoredMessage,
        status: ReceiptStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: message.document_id.clone(),
            message_id: message.message_id.clone(),
            conversation_id: message.conversation_id.clone(),
            service_identifier: message.service_identifier,
            status,
            recipient: message.sender.clone(),
            created_at,
        }
    }
}
