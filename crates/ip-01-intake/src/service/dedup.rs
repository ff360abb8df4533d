//! # Deduplicator
//!
//! Resolves a document id to its single stored record.
//!
//! Two layers keep concurrent deliveries of the same document apart:
//!
//! 1. [`KeyedLocks`] serializes intake per `document_id` inside the process.
//!    Deliveries of different documents never wait on each other.
//! 2. [`MessageStore::insert_if_absent`] is the durable uniqueness constraint,
//!    so a second process sharing the store still cannot create a duplicate.

use crate::domain::entities::{AttachmentRef, InsertOutcome, StoredMessage};
use crate::domain::errors::StoreError;
use crate::ports::outbound::MessageStore;
use chrono::{DateTime, Utc};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use shared_types::{Envelope, ServiceIdentifier};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// KEY-SCOPED LOCKS
// =============================================================================

/// Mutual exclusion scoped to a string key.
///
/// Slots are created on demand and removed when the last holder or waiter
/// lets go, so the map only holds keys that are in use.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it until the guard drops.
    pub fn lock(&self, key: &str) -> KeyGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.to_string()).or_default().clone()
        };
        // Waiting happens outside the map lock.
        let guard = slot.lock_arc();
        KeyGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Holds one key of a [`KeyedLocks`].
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only taken under the map lock, so a count of one here
        // means nobody is waiting.
        let mut slots = self.locks.slots.lock();
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}

// =============================================================================
// DEDUPLICATOR
// =============================================================================

/// How a document id was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Created(StoredMessage),
    Found(StoredMessage),
}

impl Resolution {
    pub fn message(&self) -> &StoredMessage {
        match self {
            Self::Created(message) | Self::Found(message) => message,
        }
    }
}

pub struct Deduplicator<MS: MessageStore> {
    store: MS,
    locks: KeyedLocks,
}

impl<MS: MessageStore> Deduplicator<MS> {
    pub fn new(store: MS) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &MS {
        &self.store
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Take the intake lock for `document_id`.
    pub fn lock(&self, document_id: &str) -> KeyGuard<'_> {
        self.locks.lock(document_id)
    }

    pub fn find(&self, document_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        self.store.find(document_id)
    }

    /// Return the record for the envelope's document, creating it on first
    /// sight.
    pub fn find_or_create(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        attachment: Option<AttachmentRef>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, StoreError> {
        let guard = self.lock(envelope.document_id());
        self.find_or_create_locked(&guard, envelope, service_identifier, attachment, now)
    }

    /// Same as [`Deduplicator::find_or_create`] for a caller already holding
    /// the document's lock.
    pub fn find_or_create_locked(
        &self,
        guard: &KeyGuard<'_>,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        attachment: Option<AttachmentRef>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, StoreError> {
        debug_assert_eq!(guard.key(), envelope.document_id());

        if let Some(existing) = self.store.find(envelope.document_id())? {
            return Ok(Resolution::Found(existing));
        }
        let candidate = StoredMessage::new(envelope, service_identifier, attachment, now);
        Ok(match self.store.insert_if_absent(candidate)? {
            InsertOutcome::Inserted(message) => Resolution::Created(message),
            InsertOutcome::Existing(message) => Resolution::Found(message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryMessageStore;
    use shared_types::{EnvelopeHeader, Payload};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn make_envelope(document_id: &str) -> Envelope {
        Envelope {
            header: EnvelopeHeader {
                document_id: document_id.into(),
                message_id: "M1".into(),
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
    fn test_keyed_lock_slot_removed_after_release() {
        let locks = KeyedLocks::new();
        {
            let guard = locks.lock("D1");
            assert_eq!(guard.key(), "D1");
            assert_eq!(locks.active_keys(), 1);
        }
        assert_eq!(locks.active_keys(), 0);
    }

    #[test]
    fn test_keyed_lock_excludes_same_key() {
        let locks = KeyedLocks::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let _guard = locks.lock("D1");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_keys(), 0);
    }

    #[test]
    fn test_keyed_lock_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("D1");
        let _b = locks.lock("D2");
        assert_eq!(locks.active_keys(), 2);
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let dedup = Deduplicator::new(InMemoryMessageStore::new());
        let envelope = make_envelope("D1");

        let first = dedup
            .find_or_create(&envelope, ServiceIdentifier::Dpo, None, Utc::now())
            .unwrap();
        let second = dedup
            .find_or_create(&envelope, ServiceIdentifier::Dpo, None, Utc::now())
            .unwrap();

        assert!(matches!(first, Resolution::Created(_)));
        assert!(matches!(second, Resolution::Found(_)));
        assert_eq!(first.message().record_id, second.message().record_id);
        assert_eq!(dedup.store().insert_count(), 1);
    }
}
