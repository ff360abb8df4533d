//! In-memory adapters for every outbound port.
//!
//! Each adapter carries an outage switch so tests can make a single
//! collaborator fail mid-pipeline.

use crate::adapters::infra::copy_with_digest;
use crate::domain::entities::{
    Acknowledgement, AttachmentRef, ConversationEvent, ConversationRecord, InsertOutcome,
    StatusEntry, StoredMessage,
};
use crate::domain::errors::{
    AcknowledgementError, AttachmentError, ConversationError, StoreError, VerifierError,
};
use crate::domain::value_objects::StatusUpdate;
use crate::ports::outbound::{
    AcknowledgementQueue, AttachmentStore, ConversationService, MessageStore,
    ParkedAcknowledgementStore, TokenVerifier,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use shared_types::{ConversationDirection, Envelope, ServiceIdentifier};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

// =============================================================================
// MESSAGE STORE
// =============================================================================

#[derive(Default)]
pub struct InMemoryMessageStore {
    records: RwLock<HashMap<String, StoredMessage>>,
    unavailable: AtomicBool,
    inserts: AtomicUsize,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of successful inserts since construction.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory store switched off".to_string(),
            });
        }
        Ok(())
    }
}

impl MessageStore for InMemoryMessageStore {
    fn find(&self, document_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        self.check_available()?;
        Ok(self.records.read().get(document_id).cloned())
    }

    fn insert_if_absent(&self, message: StoredMessage) -> Result<InsertOutcome, StoreError> {
        self.check_available()?;
        match self.records.write().entry(message.document_id.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                self.inserts.fetch_add(1, Ordering::SeqCst);
                Ok(InsertOutcome::Inserted(message))
            }
        }
    }

    fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.records.write().remove(document_id);
        Ok(())
    }
}

// =============================================================================
// ATTACHMENT STORE
// =============================================================================

#[derive(Default)]
pub struct InMemoryAttachmentStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, document_id: &str, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .get(&(document_id.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl AttachmentStore for InMemoryAttachmentStore {
    fn write_stream(
        &self,
        document_id: &str,
        name: &str,
        reader: &mut dyn Read,
    ) -> Result<AttachmentRef, AttachmentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AttachmentError::Unavailable {
                message: "in-memory attachment store switched off".to_string(),
            });
        }
        let mut bytes = Vec::new();
        let (size, sha256) = copy_with_digest(reader, &mut bytes)?;
        self.blobs
            .write()
            .insert((document_id.to_string(), name.to_string()), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(AttachmentRef {
            name: name.to_string(),
            size,
            sha256,
            location: format!("memory://{document_id}/{name}"),
        })
    }

    fn delete(&self, document_id: &str, name: &str) -> Result<(), AttachmentError> {
        self.blobs
            .write()
            .remove(&(document_id.to_string(), name.to_string()));
        Ok(())
    }
}

// =============================================================================
// CONVERSATION LEDGER
// =============================================================================

/// Conversation records keyed by `message_id`, shared by the ledger adapters.
///
/// Several documents may share one conversation, so reverting an event only
/// ever removes that event's own status entry. The record itself goes only
/// when the reverted event created it and nothing else was appended since.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConversationTable {
    records: HashMap<String, ConversationRecord>,
}

impl ConversationTable {
    pub(crate) fn from_records(records: impl IntoIterator<Item = ConversationRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.message_id.clone(), record))
                .collect(),
        }
    }

    pub(crate) fn get(&self, message_id: &str) -> Option<&ConversationRecord> {
        self.records.get(message_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by `message_id`.
    pub(crate) fn sorted(&self) -> Vec<&ConversationRecord> {
        let mut ordered: Vec<&ConversationRecord> = self.records.values().collect();
        ordered.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        ordered
    }

    fn entry_for(event_id: Uuid, update: StatusUpdate) -> StatusEntry {
        StatusEntry {
            event_id,
            status: update.status,
            description: update.description,
            recorded_at: Utc::now(),
        }
    }

    pub(crate) fn register_conversation(
        &mut self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        direction: ConversationDirection,
        status: Option<StatusUpdate>,
    ) -> ConversationEvent {
        let event_id = Uuid::new_v4();
        let status_tag = status.as_ref().map(|update| update.status);

        let conversation_created = match self.records.entry(envelope.message_id().to_string()) {
            Entry::Occupied(mut existing) => {
                if let Some(update) = status {
                    existing.get_mut().statuses.push(Self::entry_for(event_id, update));
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(ConversationRecord {
                    message_id: envelope.message_id().to_string(),
                    conversation_id: envelope.conversation_id().map(str::to_string),
                    document_id: envelope.document_id().to_string(),
                    service_identifier,
                    direction,
                    sender: envelope.sender_identifier().map(str::to_string),
                    receiver: envelope.receiver_identifier().map(str::to_string),
                    message_type: envelope.message_type(),
                    created_at: Utc::now(),
                    statuses: status
                        .map(|update| vec![Self::entry_for(event_id, update)])
                        .unwrap_or_default(),
                });
                true
            }
        };

        ConversationEvent {
            event_id,
            message_id: envelope.message_id().to_string(),
            conversation_created,
            status: status_tag,
        }
    }

    pub(crate) fn register_status(
        &mut self,
        message_id: &str,
        update: StatusUpdate,
    ) -> Option<ConversationEvent> {
        let conversation = self.records.get_mut(message_id)?;
        let event_id = Uuid::new_v4();
        let status = update.status;
        conversation.statuses.push(Self::entry_for(event_id, update));
        Some(ConversationEvent {
            event_id,
            message_id: message_id.to_string(),
            conversation_created: false,
            status: Some(status),
        })
    }

    pub(crate) fn revert(&mut self, event: &ConversationEvent) {
        let Some(conversation) = self.records.get_mut(&event.message_id) else {
            return;
        };
        conversation
            .statuses
            .retain(|entry| entry.event_id != event.event_id);
        if event.conversation_created && conversation.statuses.is_empty() {
            self.records.remove(&event.message_id);
        }
    }
}

/// Conversation service keeping records per `message_id`.
#[derive(Default)]
pub struct InMemoryConversationLedger {
    table: RwLock<ConversationTable>,
    unavailable: AtomicBool,
}

impl InMemoryConversationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn conversation(&self, message_id: &str) -> Option<ConversationRecord> {
        self.table.read().get(message_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    fn check_available(&self) -> Result<(), ConversationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConversationError::Unavailable {
                message: "in-memory ledger switched off".to_string(),
            });
        }
        Ok(())
    }
}

impl ConversationService for InMemoryConversationLedger {
    fn register_conversation(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        direction: ConversationDirection,
        status: Option<StatusUpdate>,
    ) -> Result<ConversationEvent, ConversationError> {
        self.check_available()?;
        Ok(self
            .table
            .write()
            .register_conversation(envelope, service_identifier, direction, status))
    }

    fn register_status(
        &self,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<Option<ConversationEvent>, ConversationError> {
        self.check_available()?;
        Ok(self.table.write().register_status(message_id, update))
    }

    fn revert(&self, event: &ConversationEvent) -> Result<(), ConversationError> {
        self.check_available()?;
        self.table.write().revert(event);
        Ok(())
    }
}

// =============================================================================
// ACKNOWLEDGEMENT QUEUE
// =============================================================================

#[derive(Default)]
pub struct InMemoryAcknowledgementQueue {
    queued: Mutex<Vec<Acknowledgement>>,
    unavailable: AtomicBool,
}

impl InMemoryAcknowledgementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn queued(&self) -> Vec<Acknowledgement> {
        self.queued.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.queued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.lock().is_empty()
    }
}

impl AcknowledgementQueue for InMemoryAcknowledgementQueue {
    fn enqueue(&self, acknowledgement: Acknowledgement) -> Result<(), AcknowledgementError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AcknowledgementError::Unavailable {
                message: "in-memory queue switched off".to_string(),
            });
        }
        self.queued.lock().push(acknowledgement);
        Ok(())
    }

    fn cancel(&self, acknowledgement_id: Uuid) -> Result<(), AcknowledgementError> {
        self.queued.lock().retain(|ack| ack.id != acknowledgement_id);
        Ok(())
    }
}

// =============================================================================
// PARKED ACKNOWLEDGEMENTS
// =============================================================================

#[derive(Default)]
pub struct InMemoryParkedAcknowledgements {
    parked: Mutex<Vec<Acknowledgement>>,
    unavailable: AtomicBool,
}

impl InMemoryParkedAcknowledgements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.lock().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory parking switched off".to_string(),
            });
        }
        Ok(())
    }
}

impl ParkedAcknowledgementStore for InMemoryParkedAcknowledgements {
    fn park(&self, acknowledgement: Acknowledgement) -> Result<(), StoreError> {
        self.check_available()?;
        self.parked.lock().push(acknowledgement);
        Ok(())
    }

    fn parked(&self) -> Result<Vec<Acknowledgement>, StoreError> {
        self.check_available()?;
        Ok(self.parked.lock().clone())
    }

    fn release(&self, acknowledgement_id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;
        self.parked.lock().retain(|ack| ack.id != acknowledgement_id);
        Ok(())
    }
}

// =============================================================================
// VERIFIER
// =============================================================================

/// Verifier that accepts every token. For wiring without key material.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl TokenVerifier for AcceptAllVerifier {
    fn verify(&self, _token: &str) -> Result<(), VerifierError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{EnvelopeHeader, Payload, ReceiptStatus};

    fn make_envelope(document_id: &str, message_id: &str) -> Envelope {
        Envelope {
            header: EnvelopeHeader {
                document_id: document_id.into(),
                message_id: message_id.into(),
                document_type: String::new(),
                created_at: None,
                expires_at: None,
                sender: None,
                receiver: None,
                scopes: vec![],
            },
            payload: Payload::Unrecognized,
        }
    }

    #[test]
    fn test_insert_if_absent_keeps_first() {
        let store = InMemoryMessageStore::new();
        let envelope = make_envelope("D1", "M1");
        let first = StoredMessage::new(&envelope, ServiceIdentifier::Dpo, None, Utc::now());
        let second = StoredMessage::new(&envelope, ServiceIdentifier::Dpo, None, Utc::now());

        assert!(store.insert_if_absent(first.clone()).unwrap().was_inserted());
        let outcome = store.insert_if_absent(second).unwrap();
        assert_eq!(outcome, InsertOutcome::Existing(first));
        assert_eq!(store.insert_count(), 1);
    }

    #[test]
    fn test_unavailable_store_fails() {
        let store = InMemoryMessageStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.find("D1"), Err(StoreError::Unavailable { .. })));
    }

    #[test]
    fn test_attachment_write_and_delete() {
        let store = InMemoryAttachmentStore::new();
        let mut reader: &[u8] = b"container";
        let reference = store.write_stream("D1", "message.asic", &mut reader).unwrap();

        assert_eq!(reference.size, 9);
        assert_eq!(store.get("D1", "message.asic").unwrap(), b"container");

        store.delete("D1", "message.asic").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_ledger_revert_created_conversation() {
        let ledger = InMemoryConversationLedger::new();
        let envelope = make_envelope("D1", "M1");
        let event = ledger
            .register_conversation(
                &envelope,
                ServiceIdentifier::Dpo,
                ConversationDirection::Incoming,
                Some(StatusUpdate::new(ReceiptStatus::IncomingReceived)),
            )
            .unwrap();
        assert!(event.conversation_created);

        ledger.revert(&event).unwrap();
        assert!(ledger.conversation("M1").is_none());
    }

    #[test]
    fn test_ledger_revert_appended_status_only() {
        let ledger = InMemoryConversationLedger::new();
        let envelope = make_envelope("D1", "M1");
        ledger
            .register_conversation(&envelope, ServiceIdentifier::Dpo, ConversationDirection::Incoming, None)
            .unwrap();
        let event = ledger
            .register_status("M1", StatusUpdate::new(ReceiptStatus::Delivered))
            .unwrap()
            .unwrap();

        ledger.revert(&event).unwrap();
        let conversation = ledger.conversation("M1").unwrap();
        assert!(conversation.statuses.is_empty());
    }

    #[test]
    fn test_ledger_revert_keeps_other_documents_events() {
        let ledger = InMemoryConversationLedger::new();
        let received = || Some(StatusUpdate::new(ReceiptStatus::IncomingReceived));
        let first = ledger
            .register_conversation(
                &make_envelope("D1", "M1"),
                ServiceIdentifier::Dpo,
                ConversationDirection::Incoming,
                received(),
            )
            .unwrap();
        let second = ledger
            .register_conversation(
                &make_envelope("D2", "M1"),
                ServiceIdentifier::Dpo,
                ConversationDirection::Incoming,
                received(),
            )
            .unwrap();
        assert!(first.conversation_created);
        assert!(!second.conversation_created);

        ledger.revert(&first).unwrap();

        let conversation = ledger.conversation("M1").unwrap();
        assert_eq!(conversation.statuses.len(), 1);
        assert_eq!(conversation.statuses[0].event_id, second.event_id);
    }

    #[test]
    fn test_register_status_unknown_conversation() {
        let ledger = InMemoryConversationLedger::new();
        let event = ledger
            .register_status("nope", StatusUpdate::new(ReceiptStatus::Read))
            .unwrap();
        assert!(event.is_none());
    }
}
