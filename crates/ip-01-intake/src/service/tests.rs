//! # Intake Service Tests

use crate::domain::errors::{AcknowledgementError, IntakeError, VerifierError};
use crate::domain::value_objects::{AcknowledgementPolicy, IntakeConfig};
use crate::ports::inbound::{AcknowledgementState, IntakeApi, IntakeOutcome};
use crate::ports::outbound::TokenVerifier;
use crate::service::{IntakeDependencies, IntakeService};
use crate::adapters::infra::copy_with_digest;
use crate::adapters::{
    AcceptAllVerifier, InMemoryAcknowledgementQueue, InMemoryAttachmentStore,
    InMemoryConversationLedger, InMemoryMessageStore, InMemoryParkedAcknowledgements,
    SystemTimeSource,
};
use crate::domain::entities::{Acknowledgement, AttachmentRef, InsertOutcome, StoredMessage};
use crate::domain::errors::StoreError;
use crate::ports::outbound::{AcknowledgementQueue, MessageStore};
use crate::test_utils::{
    forged_token, probed_stream, test_now, valid_token, EnvelopeBuilder, TestHarness,
};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use shared_types::{ReceiptStatus, ServiceIdentifier};
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

const DPO: ServiceIdentifier = ServiceIdentifier::Dpo;

#[test]
fn test_accepts_new_document() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1").build();
    let (stream, probe) = probed_stream(b"asic container");

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(stream))
        .unwrap();

    let IntakeOutcome::Accepted { message, acknowledgement } = outcome else {
        panic!("expected Accepted, got {outcome:?}");
    };
    assert_eq!(message.document_id, "D1");
    assert_eq!(message.attachment.as_ref().map(|a| a.size), Some(14));
    assert!(matches!(acknowledgement, AcknowledgementState::Queued(_)));
    assert!(probe.is_released());

    assert_eq!(harness.store.len(), 1);
    assert_eq!(
        harness.attachments.get("D1", "message.asic").unwrap(),
        b"asic container"
    );
    let conversation = harness.conversations.conversation("M1").unwrap();
    assert!(conversation.has_status(ReceiptStatus::IncomingReceived));

    let queued = harness.acknowledgements.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].status, ReceiptStatus::Received);
    assert_eq!(queued[0].recipient.as_deref(), Some("987654321"));
}

#[test]
fn test_unrecognized_payload_is_an_error() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::unrecognized("D1").build();
    let (stream, probe) = probed_stream(b"x");

    let result = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(stream));

    assert_eq!(
        result,
        Err(IntakeError::UnrecognizedPayload {
            document_id: "D1".into()
        })
    );
    assert!(probe.is_released());
    assert!(harness.store.is_empty());
    assert!(harness.conversations.is_empty());
}

#[test]
fn test_expiry_checked_before_signature() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1")
        .expires_at(Some(test_now() - Duration::seconds(1)))
        .signed_token(&forged_token())
        .build();

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();

    assert_eq!(
        outcome,
        IntakeOutcome::Expired {
            document_id: "D1".into()
        }
    );
    let conversation = harness.conversations.conversation("M1").unwrap();
    assert_eq!(
        conversation.latest_status().map(|s| s.status),
        Some(ReceiptStatus::Expired)
    );
    assert!(!conversation.has_status(ReceiptStatus::Failed));
}

#[test]
fn test_expires_exactly_now_is_still_valid() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1")
        .expires_at(Some(test_now()))
        .build();

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();
    assert!(outcome.is_accepted());
}

#[test]
fn test_clock_drives_expiry() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1").build();
    harness.clock.advance(Duration::hours(2));

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();
    assert!(matches!(outcome, IntakeOutcome::Expired { .. }));
    assert!(harness.store.is_empty());
}

#[test]
fn test_status_receipt_skips_signature_and_storage() {
    let harness = TestHarness::new();
    harness
        .service
        .enqueue_incoming_message(&EnvelopeBuilder::business("D1", "M1").build(), DPO, None)
        .unwrap();

    let receipt = EnvelopeBuilder::status("D2", "M1", ReceiptStatus::Delivered)
        .signed_token(&forged_token())
        .build();
    let outcome = harness.service.enqueue_incoming_status(&receipt, DPO).unwrap();

    assert_eq!(
        outcome,
        IntakeOutcome::StatusRecorded {
            message_id: "M1".into(),
            status: ReceiptStatus::Delivered,
            conversation_found: true,
        }
    );
    assert_eq!(harness.store.len(), 1);
    assert!(harness.service.find_message("D2").unwrap().is_none());
}

#[test]
fn test_bad_signature_records_failure() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1")
        .signed_token(&forged_token())
        .build();
    let (stream, probe) = probed_stream(b"x");

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(stream))
        .unwrap();

    assert_eq!(
        outcome,
        IntakeOutcome::SignatureRejected {
            document_id: "D1".into(),
            reason: "signature mismatch".into(),
        }
    );
    assert!(probe.is_released());
    assert!(harness.store.is_empty());
    assert!(harness.attachments.is_empty());
    assert!(harness.acknowledgements.is_empty());

    let latest = harness
        .conversations
        .conversation("M1")
        .and_then(|c| c.latest_status().cloned())
        .unwrap();
    assert_eq!(latest.status, ReceiptStatus::Failed);
    assert!(latest
        .description
        .unwrap()
        .starts_with("Signature verification failed: "));
}

#[test]
fn test_empty_signed_token_is_rejected() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1").signed_token("  ").build();

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();
    assert!(matches!(outcome, IntakeOutcome::SignatureRejected { .. }));
}

#[test]
fn test_valid_signature_is_accepted() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1")
        .signed_token(&valid_token())
        .build();

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();
    assert!(outcome.is_accepted());
}

#[test]
fn test_verifier_outage_propagates() {
    struct Offline;
    impl TokenVerifier for Offline {
        fn verify(&self, _token: &str) -> Result<(), VerifierError> {
            Err(VerifierError::Unavailable("keystore locked".into()))
        }
    }

    let conversations = InMemoryConversationLedger::new();
    let service = IntakeService::new(
        IntakeDependencies {
            message_store: InMemoryMessageStore::new(),
            attachment_store: InMemoryAttachmentStore::new(),
            conversations,
            acknowledgements: InMemoryAcknowledgementQueue::new(),
            parked_acknowledgements: InMemoryParkedAcknowledgements::new(),
            verifier: Offline,
            time_source: SystemTimeSource,
        },
        IntakeConfig::default(),
    );
    let envelope = EnvelopeBuilder::business("D1", "M1")
        .expires_at(None)
        .signed_token(&valid_token())
        .build();
    let (stream, probe) = probed_stream(b"x");

    let result = service.enqueue_incoming_message(&envelope, DPO, Some(stream));

    assert_eq!(
        result,
        Err(IntakeError::VerifierUnavailable("keystore locked".into()))
    );
    assert!(probe.is_released());
    assert!(service.notifier.conversations().is_empty());
    assert!(service.deduplicator().store().is_empty());
}

#[test]
fn test_redelivery_is_a_no_op() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1").build();
    let first = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(probed_stream(b"v1").0))
        .unwrap();

    let (stream, probe) = probed_stream(b"v2");
    let second = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(stream))
        .unwrap();

    assert!(second.is_duplicate());
    assert_eq!(
        first.stored_message().map(|m| m.record_id),
        second.stored_message().map(|m| m.record_id)
    );
    assert!(probe.is_released());
    assert_eq!(harness.store.insert_count(), 1);
    assert_eq!(harness.attachments.write_count(), 1);
    assert_eq!(harness.attachments.get("D1", "message.asic").unwrap(), b"v1");
    assert_eq!(harness.acknowledgements.len(), 1);
    assert_eq!(
        harness.conversations.conversation("M1").unwrap().statuses.len(),
        1
    );
}

#[test]
fn test_conversation_failure_rolls_back_intake() {
    let harness = TestHarness::new();
    harness.conversations.set_unavailable(true);
    let envelope = EnvelopeBuilder::business("D1", "M1").build();
    let (stream, probe) = probed_stream(b"asic");

    let result = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(stream));

    assert!(matches!(result, Err(IntakeError::Conversation(_))));
    assert!(probe.is_released());
    assert!(harness.store.is_empty());
    assert!(harness.attachments.is_empty());
    assert!(harness.acknowledgements.is_empty());

    harness.conversations.set_unavailable(false);
    let retry = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(probed_stream(b"asic").0))
        .unwrap();
    assert!(retry.is_accepted());
}

#[test]
fn test_store_outage_fails_before_any_write() {
    let harness = TestHarness::new();
    harness.store.set_unavailable(true);
    let envelope = EnvelopeBuilder::business("D1", "M1").build();

    let result = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(probed_stream(b"asic").0));

    assert!(matches!(result, Err(IntakeError::Store(_))));
    assert!(harness.attachments.is_empty());
    assert!(harness.conversations.is_empty());
}

#[test]
fn test_attachment_failure_leaves_nothing() {
    let harness = TestHarness::new();
    harness.attachments.set_unavailable(true);
    let envelope = EnvelopeBuilder::business("D1", "M1").build();
    let (stream, probe) = probed_stream(b"asic");

    let result = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(stream));

    assert!(matches!(result, Err(IntakeError::Attachment(_))));
    assert!(probe.is_released());
    assert!(harness.store.is_empty());
    assert!(harness.conversations.is_empty());
}

#[test]
fn test_after_commit_parks_refused_acknowledgement() {
    let harness = TestHarness::new();
    harness.acknowledgements.set_unavailable(true);
    let envelope = EnvelopeBuilder::business("D1", "M1").build();

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();

    let IntakeOutcome::Accepted { acknowledgement, .. } = outcome else {
        panic!("expected Accepted, got {outcome:?}");
    };
    assert!(matches!(acknowledgement, AcknowledgementState::Parked(_)));
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.service.pending_acknowledgements().unwrap().len(), 1);
    assert_eq!(harness.parked.len(), 1);

    let report = harness.service.redrive_acknowledgements().unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.still_pending, 1);

    harness.acknowledgements.set_unavailable(false);
    let report = harness.service.redrive_acknowledgements().unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.still_pending, 0);
    assert!(harness.service.pending_acknowledgements().unwrap().is_empty());
    assert!(harness.parked.is_empty());
    assert_eq!(harness.acknowledgements.queued()[0].id, acknowledgement.id());
}

#[test]
fn test_within_unit_of_work_rolls_back_on_queue_failure() {
    let harness = TestHarness::with_config(
        IntakeConfig::default().with_policy(AcknowledgementPolicy::WithinUnitOfWork),
    );
    harness.acknowledgements.set_unavailable(true);
    let envelope = EnvelopeBuilder::business("D1", "M1").build();

    let result = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(probed_stream(b"asic").0));

    assert!(matches!(
        result,
        Err(IntakeError::Acknowledgement(AcknowledgementError::Unavailable { .. }))
    ));
    assert!(harness.store.is_empty());
    assert!(harness.attachments.is_empty());
    assert!(harness.conversations.is_empty());
    assert!(harness.service.pending_acknowledgements().unwrap().is_empty());
}

#[test]
fn test_within_unit_of_work_queues_acknowledgement() {
    let harness = TestHarness::with_config(
        IntakeConfig::default().with_policy(AcknowledgementPolicy::WithinUnitOfWork),
    );
    let envelope = EnvelopeBuilder::business("D1", "M1").build();

    let outcome = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(harness.acknowledgements.len(), 1);
}

#[test]
fn test_lock_slots_released_after_intake() {
    let harness = TestHarness::new();
    let envelope = EnvelopeBuilder::business("D1", "M1").build();
    harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None)
        .unwrap();

    assert_eq!(harness.service.deduplicator().locks().active_keys(), 0);
}

#[test]
fn test_parking_failure_surfaces_error_but_keeps_record() {
    let harness = TestHarness::new();
    harness.acknowledgements.set_unavailable(true);
    harness.parked.set_unavailable(true);
    let envelope = EnvelopeBuilder::business("D1", "M1").build();

    let result = harness
        .service
        .enqueue_incoming_message(&envelope, DPO, None);

    assert!(matches!(
        result,
        Err(IntakeError::Store(StoreError::Unavailable { .. }))
    ));
    assert_eq!(harness.store.len(), 1);
}

// =============================================================================
// SHARED CONVERSATIONS
// =============================================================================

/// Queue that, while D1's acknowledgement is being enqueued, runs a second
/// document of the same conversation to completion and then refuses D1.
struct InterleavingQueue {
    queued: InMemoryAcknowledgementQueue,
    service: OnceLock<Weak<dyn IntakeApi>>,
    interleaved: Mutex<Option<Result<IntakeOutcome, IntakeError>>>,
}

impl AcknowledgementQueue for InterleavingQueue {
    fn enqueue(&self, acknowledgement: Acknowledgement) -> Result<(), AcknowledgementError> {
        if acknowledgement.document_id != "D1" {
            return self.queued.enqueue(acknowledgement);
        }
        if let Some(service) = self.service.get().and_then(Weak::upgrade) {
            let second = EnvelopeBuilder::business("D2", "M1").expires_at(None).build();
            *self.interleaved.lock() = Some(service.enqueue_incoming_message(&second, DPO, None));
        }
        Err(AcknowledgementError::Unavailable {
            message: "refused after interleaving".into(),
        })
    }

    fn cancel(&self, acknowledgement_id: Uuid) -> Result<(), AcknowledgementError> {
        self.queued.cancel(acknowledgement_id)
    }
}

#[test]
fn test_rollback_keeps_events_of_other_documents_in_conversation() {
    let conversations = Arc::new(InMemoryConversationLedger::new());
    let queue = Arc::new(InterleavingQueue {
        queued: InMemoryAcknowledgementQueue::new(),
        service: OnceLock::new(),
        interleaved: Mutex::new(None),
    });
    let service = Arc::new(IntakeService::new(
        IntakeDependencies {
            message_store: InMemoryMessageStore::new(),
            attachment_store: InMemoryAttachmentStore::new(),
            conversations: conversations.clone(),
            acknowledgements: queue.clone(),
            parked_acknowledgements: InMemoryParkedAcknowledgements::new(),
            verifier: AcceptAllVerifier,
            time_source: SystemTimeSource,
        },
        IntakeConfig::default().with_policy(AcknowledgementPolicy::WithinUnitOfWork),
    ));
    let weak: Weak<dyn IntakeApi> = Arc::downgrade(&service) as Weak<dyn IntakeApi>;
    assert!(queue.service.set(weak).is_ok());

    let first = EnvelopeBuilder::business("D1", "M1").expires_at(None).build();
    let result = service.enqueue_incoming_message(&first, DPO, None);

    assert!(matches!(result, Err(IntakeError::Acknowledgement(_))));
    let interleaved = queue.interleaved.lock().take().unwrap().unwrap();
    assert!(interleaved.is_accepted());

    assert!(service.find_message("D1").unwrap().is_none());
    assert!(service.find_message("D2").unwrap().is_some());

    let conversation = conversations.conversation("M1").unwrap();
    assert_eq!(conversation.statuses.len(), 1);
    assert_eq!(conversation.statuses[0].status, ReceiptStatus::IncomingReceived);
    assert_eq!(queue.queued.len(), 1);
    assert_eq!(queue.queued.queued()[0].document_id, "D2");
}

// =============================================================================
// LOST INSERT RACE
// =============================================================================

/// Store that always reports a record written by another process between
/// the existence check and the insert.
struct RacedStore {
    existing: StoredMessage,
}

impl MessageStore for RacedStore {
    fn find(&self, _document_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        Ok(None)
    }

    fn insert_if_absent(&self, _message: StoredMessage) -> Result<InsertOutcome, StoreError> {
        Ok(InsertOutcome::Existing(self.existing.clone()))
    }

    fn delete(&self, _document_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

type RacedService = IntakeService<
    RacedStore,
    Arc<InMemoryAttachmentStore>,
    Arc<InMemoryConversationLedger>,
    Arc<InMemoryAcknowledgementQueue>,
    InMemoryParkedAcknowledgements,
    AcceptAllVerifier,
    SystemTimeSource,
>;

struct RacedHarness {
    attachments: Arc<InMemoryAttachmentStore>,
    conversations: Arc<InMemoryConversationLedger>,
    acknowledgements: Arc<InMemoryAcknowledgementQueue>,
    service: RacedService,
}

fn raced_harness(existing_attachment: Option<&[u8]>) -> RacedHarness {
    let envelope = EnvelopeBuilder::business("D1", "M1").expires_at(None).build();
    let attachment = existing_attachment.map(|bytes| {
        let (size, sha256) = copy_with_digest(&mut &bytes[..], &mut std::io::sink()).unwrap();
        AttachmentRef {
            name: "message.asic".into(),
            size,
            sha256,
            location: "memory://D1/message.asic".into(),
        }
    });
    let existing = StoredMessage::new(&envelope, DPO, attachment, Utc::now());

    let attachments = Arc::new(InMemoryAttachmentStore::new());
    let conversations = Arc::new(InMemoryConversationLedger::new());
    let acknowledgements = Arc::new(InMemoryAcknowledgementQueue::new());
    let service = IntakeService::new(
        IntakeDependencies {
            message_store: RacedStore { existing },
            attachment_store: attachments.clone(),
            conversations: conversations.clone(),
            acknowledgements: acknowledgements.clone(),
            parked_acknowledgements: InMemoryParkedAcknowledgements::new(),
            verifier: AcceptAllVerifier,
            time_source: SystemTimeSource,
        },
        IntakeConfig::default(),
    );
    RacedHarness {
        attachments,
        conversations,
        acknowledgements,
        service,
    }
}

fn deliver(harness: &RacedHarness, bytes: &[u8]) -> Result<IntakeOutcome, IntakeError> {
    let envelope = EnvelopeBuilder::business("D1", "M1").expires_at(None).build();
    harness
        .service
        .enqueue_incoming_message(&envelope, DPO, Some(probed_stream(bytes).0))
}

#[test]
fn test_lost_race_against_record_without_attachment_discards_write() {
    let harness = raced_harness(None);

    let outcome = deliver(&harness, b"ours").unwrap();

    assert!(outcome.is_duplicate());
    assert!(harness.attachments.is_empty());
    assert!(harness.conversations.is_empty());
    assert!(harness.acknowledgements.is_empty());
}

#[test]
fn test_lost_race_with_identical_attachment_keeps_slot() {
    let harness = raced_harness(Some(b"same bytes".as_slice()));

    let outcome = deliver(&harness, b"same bytes").unwrap();

    assert!(outcome.is_duplicate());
    assert_eq!(harness.attachments.get("D1", "message.asic").unwrap(), b"same bytes");
    assert!(harness.conversations.is_empty());
    assert!(harness.acknowledgements.is_empty());
}

#[test]
fn test_lost_race_with_different_attachment_is_a_conflict() {
    let harness = raced_harness(Some(b"their bytes".as_slice()));

    let result = deliver(&harness, b"our bytes");

    assert_eq!(
        result,
        Err(IntakeError::AttachmentConflict {
            document_id: "D1".into()
        })
    );
    assert!(!result.unwrap_err().is_transient());
    assert!(harness.conversations.is_empty());
    assert!(harness.acknowledgements.is_empty());
}
