//! # Core Enumerations
//!
//! Tags that travel with every envelope through the integration point.
//!
//! ## Clusters
//!
//! - **Routing**: [`ServiceIdentifier`]
//! - **Conversation**: [`ReceiptStatus`], [`ConversationDirection`]
//! - **Document**: [`MessageType`]

use crate::errors::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ROUTING
// =============================================================================

/// The logical channel an envelope arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceIdentifier {
    /// Business-to-business exchange between public bodies.
    Dpo,
    /// Delivery to an organisation's mailbox.
    Dpv,
    /// Delivery to a citizen's digital mailbox.
    Dpi,
    /// Delivery through the municipal fiscal channel.
    Dpf,
    /// Delivery through the municipal IO channel.
    Dpfio,
    /// Public access (innsyn) and publishing.
    Dpe,
    /// Channel could not be determined.
    Unknown,
}

impl ServiceIdentifier {
    const ALL: [ServiceIdentifier; 7] = [
        Self::Dpo,
        Self::Dpv,
        Self::Dpi,
        Self::Dpf,
        Self::Dpfio,
        Self::Dpe,
        Self::Unknown,
    ];

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dpo => "DPO",
            Self::Dpv => "DPV",
            Self::Dpi => "DPI",
            Self::Dpf => "DPF",
            Self::Dpfio => "DPFIO",
            Self::Dpe => "DPE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Case-insensitive lookup that never fails loudly.
    pub fn safe_value_of(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|si| si.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceIdentifier {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::safe_value_of(s).ok_or_else(|| TypeError::UnknownServiceIdentifier(s.to_string()))
    }
}

// =============================================================================
// CONVERSATION
// =============================================================================

/// Outcome tags attached to conversation events and acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Created,
    Sent,
    /// The receiving point has taken the document in.
    Received,
    Delivered,
    Read,
    /// Processing failed (including signature rejection).
    Failed,
    Cancelled,
    /// Local bookkeeping: an incoming document was accepted.
    IncomingReceived,
    /// Local bookkeeping: an incoming document was handed to the end system.
    IncomingDelivered,
    /// The document outlived its validity window.
    Expired,
}

impl ReceiptStatus {
    const ALL: [ReceiptStatus; 10] = [
        Self::Created,
        Self::Sent,
        Self::Received,
        Self::Delivered,
        Self::Read,
        Self::Failed,
        Self::Cancelled,
        Self::IncomingReceived,
        Self::IncomingDelivered,
        Self::Expired,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Sent => "SENT",
            Self::Received => "RECEIVED",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::IncomingReceived => "INCOMING_RECEIVED",
            Self::IncomingDelivered => "INCOMING_DELIVERED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether this status marks a failed exchange.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Expired)
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypeError::UnknownReceiptStatus(s.to_string()))
    }
}

/// Provenance of a conversation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationDirection {
    Incoming,
    Outgoing,
}

impl fmt::Display for ConversationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => f.write_str("INCOMING"),
            Self::Outgoing => f.write_str("OUTGOING"),
        }
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Catalogue of business message types.
///
/// The wire name is the suffix used in document-type URNs, e.g.
/// `urn:no:difi:arkivmelding:xsd::arkivmelding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Status,
    Feil,
    Arkivmelding,
    ArkivmeldingKvittering,
    Avtalt,
    Fiksio,
    Digital,
    DigitalDpv,
    Print,
    Innsynskrav,
    Publisering,
    EinnsynKvittering,
}

impl MessageType {
    const ALL: [MessageType; 12] = [
        Self::Status,
        Self::Feil,
        Self::Arkivmelding,
        Self::ArkivmeldingKvittering,
        Self::Avtalt,
        Self::Fiksio,
        Self::Digital,
        Self::DigitalDpv,
        Self::Print,
        Self::Innsynskrav,
        Self::Publisering,
        Self::EinnsynKvittering,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Feil => "feil",
            Self::Arkivmelding => "arkivmelding",
            Self::ArkivmeldingKvittering => "arkivmelding_kvittering",
            Self::Avtalt => "avtalt",
            Self::Fiksio => "fiksio",
            Self::Digital => "digital",
            Self::DigitalDpv => "digital_dpv",
            Self::Print => "print",
            Self::Innsynskrav => "innsynskrav",
            Self::Publisering => "publisering",
            Self::EinnsynKvittering => "einnsyn_kvittering",
        }
    }

    /// Business-level receipts travel as ordinary documents but answer an
    /// earlier one.
    pub fn is_receipt(&self) -> bool {
        matches!(self, Self::ArkivmeldingKvittering | Self::EinnsynKvittering)
    }

    /// Case-insensitive lookup by wire name.
    pub fn from_type(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }

    /// Lookup by document-type URN, matching the `::<type>` suffix.
    pub fn from_document_type(document_type: &str) -> Option<Self> {
        if document_type.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|t| document_type.ends_with(&format!("::{}", t.as_str())))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_type(s).ok_or_else(|| TypeError::UnknownMessageType(s.to_string()))
    }
}
