//! File-backed adapters for single-node deployments.
//!
//! `FileMessageStore`, `FileConversationLedger` and
//! `FileParkedAcknowledgements` each keep their whole state in one JSON
//! file, rewritten atomically (temp file, fsync, rename) on every mutation.
//! A failed save leaves memory as it was before the call.
//! `FileAttachmentStore` keeps one directory per document.

use crate::adapters::infra::copy_with_digest;
use crate::adapters::memory::ConversationTable;
use crate::domain::entities::{
    Acknowledgement, AttachmentRef, ConversationEvent, ConversationRecord, InsertOutcome,
    StoredMessage,
};
use crate::domain::errors::{AttachmentError, ConversationError, StoreError};
use crate::domain::value_objects::StatusUpdate;
use crate::ports::outbound::{
    AttachmentStore, ConversationService, MessageStore, ParkedAcknowledgementStore,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{ConversationDirection, Envelope, ServiceIdentifier};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

// =============================================================================
// JSON FILES
// =============================================================================

enum JsonFileError {
    Io(String),
    Corrupt(String),
}

impl From<JsonFileError> for StoreError {
    fn from(err: JsonFileError) -> Self {
        match err {
            JsonFileError::Io(message) => StoreError::Io { message },
            JsonFileError::Corrupt(message) => StoreError::Corruption { message },
        }
    }
}

impl From<JsonFileError> for ConversationError {
    fn from(err: JsonFileError) -> Self {
        match err {
            JsonFileError::Io(message) => ConversationError::Io { message },
            JsonFileError::Corrupt(message) => ConversationError::Corruption { message },
        }
    }
}

/// Load a JSON array. A missing or empty file is an empty list.
fn load_json_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, JsonFileError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(JsonFileError::Io(e.to_string())),
    };
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| JsonFileError::Corrupt(format!("{}: {e}", path.display())))
}

fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), JsonFileError> {
    let io_err = |e: io::Error| JsonFileError::Io(e.to_string());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| JsonFileError::Io(e.to_string()))?;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(io_err)?;
    file.write_all(&bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(())
}

// =============================================================================
// MESSAGE STORE
// =============================================================================

pub struct FileMessageStore {
    records: RwLock<HashMap<String, StoredMessage>>,
    path: PathBuf,
}

impl FileMessageStore {
    /// Open the store at `path`, loading existing records.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is an
    /// error; records are never silently discarded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records: HashMap<String, StoredMessage> = load_json_list::<StoredMessage>(&path)?
            .into_iter()
            .map(|record| (record.document_id.clone(), record))
            .collect();
        tracing::info!(
            "[ip-01] 💾 Loaded {} message records from {}",
            records.len(),
            path.display()
        );
        Ok(Self {
            records: RwLock::new(records),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn save(&self, records: &HashMap<String, StoredMessage>) -> Result<(), StoreError> {
        let mut ordered: Vec<&StoredMessage> = records.values().collect();
        ordered.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(save_json(&self.path, &ordered)?)
    }
}

impl MessageStore for FileMessageStore {
    fn find(&self, document_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self.records.read().get(document_id).cloned())
    }

    fn insert_if_absent(&self, message: StoredMessage) -> Result<InsertOutcome, StoreError> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&message.document_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        let document_id = message.document_id.clone();
        records.insert(document_id.clone(), message.clone());
        if let Err(e) = self.save(&records) {
            records.remove(&document_id);
            return Err(e);
        }
        Ok(InsertOutcome::Inserted(message))
    }

    fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if let Some(removed) = records.remove(document_id) {
            if let Err(e) = self.save(&records) {
                records.insert(document_id.to_string(), removed);
                return Err(e);
            }
        }
        Ok(())
    }
}

// =============================================================================
// CONVERSATION LEDGER
// =============================================================================

/// Conversation ledger persisted to one JSON file, so the status history
/// and later receipts outlive a restart.
pub struct FileConversationLedger {
    table: RwLock<ConversationTable>,
    path: PathBuf,
}

impl FileConversationLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConversationError> {
        let path = path.as_ref().to_path_buf();
        let table = ConversationTable::from_records(load_json_list::<ConversationRecord>(&path)?);
        tracing::info!(
            "[ip-01] 💾 Loaded {} conversations from {}",
            table.len(),
            path.display()
        );
        Ok(Self {
            table: RwLock::new(table),
            path,
        })
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

    /// Apply `change` and persist; on a failed save the table is restored.
    fn mutate<R>(
        &self,
        change: impl FnOnce(&mut ConversationTable) -> R,
    ) -> Result<R, ConversationError> {
        let mut table = self.table.write();
        let before = table.clone();
        let result = change(&mut table);
        if *table != before {
            if let Err(e) = save_json(&self.path, &table.sorted()) {
                *table = before;
                return Err(e.into());
            }
        }
        Ok(result)
    }
}

impl ConversationService for FileConversationLedger {
    fn register_conversation(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        direction: ConversationDirection,
        status: Option<StatusUpdate>,
    ) -> Result<ConversationEvent, ConversationError> {
        self.mutate(|table| {
            table.register_conversation(envelope, service_identifier, direction, status)
        })
    }

    fn register_status(
        &self,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<Option<ConversationEvent>, ConversationError> {
        self.mutate(|table| table.register_status(message_id, update))
    }

    fn revert(&self, event: &ConversationEvent) -> Result<(), ConversationError> {
        self.mutate(|table| table.revert(event))
    }
}

// =============================================================================
// PARKED ACKNOWLEDGEMENTS
// =============================================================================

pub struct FileParkedAcknowledgements {
    parked: Mutex<Vec<Acknowledgement>>,
    path: PathBuf,
}

impl FileParkedAcknowledgements {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let parked: Vec<Acknowledgement> = load_json_list(&path)?;
        if !parked.is_empty() {
            tracing::warn!(
                "[ip-01] 📮 {} parked acknowledgements awaiting redrive in {}",
                parked.len(),
                path.display()
            );
        }
        Ok(Self {
            parked: Mutex::new(parked),
            path,
        })
    }

    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.lock().is_empty()
    }
}

impl ParkedAcknowledgementStore for FileParkedAcknowledgements {
    fn park(&self, acknowledgement: Acknowledgement) -> Result<(), StoreError> {
        let mut parked = self.parked.lock();
        parked.push(acknowledgement);
        if let Err(e) = save_json(&self.path, &*parked) {
            parked.pop();
            return Err(e.into());
        }
        Ok(())
    }

    fn parked(&self) -> Result<Vec<Acknowledgement>, StoreError> {
        Ok(self.parked.lock().clone())
    }

    fn release(&self, acknowledgement_id: Uuid) -> Result<(), StoreError> {
        let mut parked = self.parked.lock();
        let Some(index) = parked.iter().position(|ack| ack.id == acknowledgement_id) else {
            return Ok(());
        };
        let released = parked.remove(index);
        if let Err(e) = save_json(&self.path, &*parked) {
            parked.insert(index, released);
            return Err(e.into());
        }
        Ok(())
    }
}

// =============================================================================
// ATTACHMENT STORE
// =============================================================================

pub struct FileAttachmentStore {
    root: PathBuf,
}

impl FileAttachmentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, AttachmentError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the slot for (`document_id`, `name`).
    ///
    /// Keys are used as single path components; separators and parent
    /// references are refused.
    pub fn slot_path(&self, document_id: &str, name: &str) -> Result<PathBuf, AttachmentError> {
        validate_component(document_id)?;
        validate_component(name)?;
        Ok(self.root.join(document_id).join(name))
    }
}

fn validate_component(key: &str) -> Result<(), AttachmentError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(AttachmentError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

impl AttachmentStore for FileAttachmentStore {
    fn write_stream(
        &self,
        document_id: &str,
        name: &str,
        reader: &mut dyn Read,
    ) -> Result<AttachmentRef, AttachmentError> {
        let target = self.slot_path(document_id, name)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }

        let temp_path = target.with_extension("partial");
        let result = (|| -> Result<(u64, String), AttachmentError> {
            let mut file = fs::File::create(&temp_path)?;
            let written = copy_with_digest(&mut *reader, &mut file)?;
            file.sync_all()?;
            fs::rename(&temp_path, &target)?;
            Ok(written)
        })();

        let (size, sha256) = match result {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        tracing::debug!(
            "[ip-01] 📎 Stored attachment {} ({} bytes) for {}",
            name,
            size,
            document_id
        );

        Ok(AttachmentRef {
            name: name.to_string(),
            size,
            sha256,
            location: target.display().to_string(),
        })
    }

    fn delete(&self, document_id: &str, name: &str) -> Result<(), AttachmentError> {
        let target = self.slot_path(document_id, name)?;
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(dir) = target.parent() {
            // Only succeeds when the slot directory is empty.
            let _ = fs::remove_dir(dir);
        }
        Ok(())
    }
}
