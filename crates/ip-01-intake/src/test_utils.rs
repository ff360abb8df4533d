//! Fixtures shared by unit and integration tests.

use crate::adapters::{
    HmacJwsVerifier, InMemoryAcknowledgementQueue, InMemoryAttachmentStore,
    InMemoryConversationLedger, InMemoryMessageStore, InMemoryParkedAcknowledgements,
    ManualTimeSource,
};
use crate::domain::attachment::AttachmentStream;
use crate::domain::value_objects::IntakeConfig;
use crate::service::{IntakeDependencies, IntakeService};
use chrono::{DateTime, Duration, TimeZone, Utc};
use shared_types::{
    BusinessMessage, Envelope, EnvelopeHeader, MessageType, Partner, Payload, ReceiptStatus,
    Scope, ScopeType, StatusMessage,
};
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const TEST_JWS_KEY: &[u8] = b"intake-test-key";

/// Fixed "now" for deterministic expiry checks.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

// =============================================================================
// ENVELOPES
// =============================================================================

pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    fn with_payload(document_id: &str, message_id: &str, payload: Payload) -> Self {
        Self {
            envelope: Envelope {
                header: EnvelopeHeader {
                    document_id: document_id.into(),
                    message_id: message_id.into(),
                    document_type: "urn:no:difi:arkivmelding:xsd::arkivmelding".into(),
                    created_at: Some(test_now() - Duration::minutes(5)),
                    expires_at: Some(test_now() + Duration::hours(1)),
                    sender: Some(Partner::new("0192:987654321")),
                    receiver: Some(Partner::new("0192:910075918")),
                    scopes: vec![
                        Scope::new(ScopeType::ConversationId).with_instance_identifier("C1")
                    ],
                },
                payload,
            },
        }
    }

    pub fn business(document_id: &str, message_id: &str) -> Self {
        Self::with_payload(
            document_id,
            message_id,
            Payload::Business(BusinessMessage {
                message_type: MessageType::Arkivmelding,
                title: Some("Vedtak".into()),
                primary_document: Some("arkivmelding.xml".into()),
                security_level: None,
            }),
        )
    }

    pub fn status(document_id: &str, message_id: &str, status: ReceiptStatus) -> Self {
        Self::with_payload(
            document_id,
            message_id,
            Payload::Status(StatusMessage {
                status,
                description: None,
            }),
        )
    }

    pub fn unrecognized(document_id: &str) -> Self {
        Self::with_payload(document_id, "M-unknown", Payload::Unrecognized)
    }

    pub fn expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.envelope.header.expires_at = expires_at;
        self
    }

    pub fn signed_token(mut self, token: &str) -> Self {
        self.envelope
            .header
            .scopes
            .push(Scope::new(ScopeType::SignedJwt).with_identifier(token));
        self
    }

    pub fn build(self) -> Envelope {
        self.envelope
    }
}

/// A token the test verifier accepts.
pub fn valid_token() -> String {
    HmacJwsVerifier::new(TEST_JWS_KEY.to_vec())
        .sign(br#"{"digest":"test"}"#)
        .unwrap_or_default()
}

/// A well-formed token signed with the wrong key.
pub fn forged_token() -> String {
    HmacJwsVerifier::new(b"someone-else".to_vec())
        .sign(br#"{"digest":"test"}"#)
        .unwrap_or_default()
}

// =============================================================================
// STREAMS
// =============================================================================

struct ProbedReader {
    inner: Cursor<Vec<u8>>,
    released: Arc<AtomicBool>,
}

impl Read for ProbedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for ProbedReader {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Observes whether an attachment stream's reader was released.
#[derive(Clone)]
pub struct ReleaseProbe {
    released: Arc<AtomicBool>,
}

impl ReleaseProbe {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

pub fn probed_stream(bytes: &[u8]) -> (AttachmentStream, ReleaseProbe) {
    let released = Arc::new(AtomicBool::new(false));
    let reader = ProbedReader {
        inner: Cursor::new(bytes.to_vec()),
        released: released.clone(),
    };
    (
        AttachmentStream::new(reader),
        ReleaseProbe { released },
    )
}

// =============================================================================
// HARNESS
// =============================================================================

pub type TestService = IntakeService<
    Arc<InMemoryMessageStore>,
    Arc<InMemoryAttachmentStore>,
    Arc<InMemoryConversationLedger>,
    Arc<InMemoryAcknowledgementQueue>,
    Arc<InMemoryParkedAcknowledgements>,
    Arc<HmacJwsVerifier>,
    Arc<ManualTimeSource>,
>;

/// A service wired to in-memory adapters, with handles kept for inspection.
pub struct TestHarness {
    pub store: Arc<InMemoryMessageStore>,
    pub attachments: Arc<InMemoryAttachmentStore>,
    pub conversations: Arc<InMemoryConversationLedger>,
    pub acknowledgements: Arc<InMemoryAcknowledgementQueue>,
    pub parked: Arc<InMemoryParkedAcknowledgements>,
    pub clock: Arc<ManualTimeSource>,
    pub service: TestService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(IntakeConfig::for_testing())
    }

    pub fn with_config(config: IntakeConfig) -> Self {
        let store = Arc::new(InMemoryMessageStore::new());
        let attachments = Arc::new(InMemoryAttachmentStore::new());
        let conversations = Arc::new(InMemoryConversationLedger::new());
        let acknowledgements = Arc::new(InMemoryAcknowledgementQueue::new());
        let parked = Arc::new(InMemoryParkedAcknowledgements::new());
        let clock = Arc::new(ManualTimeSource::new(test_now()));

        let deps = IntakeDependencies {
            message_store: store.clone(),
            attachment_store: attachments.clone(),
            conversations: conversations.clone(),
            acknowledgements: acknowledgements.clone(),
            parked_acknowledgements: parked.clone(),
            verifier: Arc::new(HmacJwsVerifier::new(TEST_JWS_KEY.to_vec())),
            time_source: clock.clone(),
        };

        Self {
            service: IntakeService::new(deps, config),
            store,
            attachments,
            conversations,
            acknowledgements,
            parked,
            clock,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
