//! # Standard Business Document Envelope
//!
//! The decoded structure handed to the intake stage by the wire-format decoder.
//!
//! ## Structure
//!
//! ```text
//! Envelope
//! ├── header
//! │   ├── document_id   (globally unique, deduplication key)
//! │   ├── message_id    (conversation key)
//! │   ├── sender / receiver
//! │   ├── scopes[]      (ConversationId, SignedJWT, ...)
//! │   └── expires_at    (validity window)
//! └── payload           (Business | Status | Unrecognized)
//! ```
//!
//! The envelope is immutable once decoded. Nothing downstream of the decoder
//! mutates it; the intake stage only reads it and stores copies.

use crate::entities::{MessageType, ReceiptStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEADER
// =============================================================================

/// One party of the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    /// Identifier, optionally prefixed with an ICD authority code (`0192:`).
    pub identifier: String,
    /// Identifier scheme, e.g. `iso6523-actorid-upis`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

impl Partner {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            authority: None,
        }
    }

    /// The identifier without its `NNNN:` authority prefix.
    pub fn stripped_identifier(&self) -> &str {
        match self.identifier.split_once(':') {
            Some((_, rest)) => rest,
            None => &self.identifier,
        }
    }
}

/// Well-known scope types.
///
/// Scopes arrive as free-form strings. A scope matches a type if its `type`
/// equals either the display name (`ConversationId`) or the constant name
/// (`CONVERSATION_ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    ConversationId,
    SenderRef,
    ReceiverRef,
    JournalpostId,
    MessageChannel,
    /// Detached signature over the document, carried as a compact JWS.
    SignedJwt,
}

impl ScopeType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ConversationId => "ConversationId",
            Self::SenderRef => "SenderRef",
            Self::ReceiverRef => "ReceiverRef",
            Self::JournalpostId => "JournalpostId",
            Self::MessageChannel => "MessageChannel",
            Self::SignedJwt => "SignedJWT",
        }
    }

    pub fn constant_name(&self) -> &'static str {
        match self {
            Self::ConversationId => "CONVERSATION_ID",
            Self::SenderRef => "SENDER_REF",
            Self::ReceiverRef => "RECEIVER_REF",
            Self::JournalpostId => "JOURNALPOST_ID",
            Self::MessageChannel => "MESSAGE_CHANNEL",
            Self::SignedJwt => "SIGNED_JWT",
        }
    }

    pub fn matches(&self, scope_type: &str) -> bool {
        scope_type == self.display_name() || scope_type == self.constant_name()
    }
}

/// A named metadata slot on the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Scope {
    pub fn new(scope_type: ScopeType) -> Self {
        Self {
            scope_type: scope_type.display_name().to_string(),
            instance_identifier: None,
            identifier: None,
        }
    }

    pub fn with_instance_identifier(mut self, value: impl Into<String>) -> Self {
        self.instance_identifier = Some(value.into());
        self
    }

    pub fn with_identifier(mut self, value: impl Into<String>) -> Self {
        self.identifier = Some(value.into());
        self
    }
}

/// Envelope header: identity, parties, scopes and validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    /// Globally unique document identifier.
    pub document_id: String,
    /// Identifier of the message/conversation this document belongs to.
    pub message_id: String,
    /// Document-type URN, e.g. `urn:no:difi:arkivmelding:xsd::arkivmelding`.
    #[serde(default)]
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// End of the validity window. `None` means the document never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Partner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Partner>,
    /// Ordered extension metadata.
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// A new business document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessMessage {
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Name of the primary document inside the attachment container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<u8>,
}

/// A receipt about a previously exchanged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: ReceiptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Envelope payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Business(BusinessMessage),
    Status(StatusMessage),
    /// The decoder met a payload type it cannot map.
    #[serde(other)]
    Unrecognized,
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A decoded Standard Business Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub payload: Payload,
}

impl Envelope {
    pub fn document_id(&self) -> &str {
        &self.header.document_id
    }

    pub fn message_id(&self) -> &str {
        &self.header.message_id
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.header.expires_at
    }

    /// First scope matching `scope_type`, in header order.
    pub fn find_scope(&self, scope_type: ScopeType) -> Option<&Scope> {
        self.header
            .scopes
            .iter()
            .find(|scope| scope_type.matches(&scope.scope_type))
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.find_scope(ScopeType::ConversationId)
            .and_then(|scope| scope.instance_identifier.as_deref())
    }

    /// Journal post reference; empty when the scope is absent.
    pub fn journal_post_id(&self) -> &str {
        self.find_scope(ScopeType::JournalpostId)
            .and_then(|scope| scope.instance_identifier.as_deref())
            .unwrap_or("")
    }

    /// The compact JWS carried in the signed-token scope, if any.
    pub fn signed_token(&self) -> Option<&str> {
        self.find_scope(ScopeType::SignedJwt).and_then(|scope| {
            scope
                .identifier
                .as_deref()
                .or(scope.instance_identifier.as_deref())
        })
    }

    pub fn has_signed_token(&self) -> bool {
        self.find_scope(ScopeType::SignedJwt).is_some()
    }

    pub fn sender_identifier(&self) -> Option<&str> {
        self.header.sender.as_ref().map(Partner::stripped_identifier)
    }

    pub fn receiver_identifier(&self) -> Option<&str> {
        self.header
            .receiver
            .as_ref()
            .map(Partner::stripped_identifier)
    }

    /// Message type from the business payload, falling back to the header's
    /// document-type URN.
    pub fn message_type(&self) -> Option<MessageType> {
        match &self.payload {
            Payload::Business(message) => Some(message.message_type),
            Payload::Status(_) => Some(MessageType::Status),
            Payload::Unrecognized => MessageType::from_document_type(&self.header.document_type),
        }
    }

    pub fn is_status(&self) -> bool {
        matches!(self.payload, Payload::Status(_))
    }
}
