//! # Attachment Persister
//!
//! Streams an inbound attachment container to the attachment store. The
//! stream is released once the write finishes, whether or not it succeeded.

use crate::domain::attachment::AttachmentStream;
use crate::domain::entities::AttachmentRef;
use crate::domain::errors::AttachmentError;
use crate::ports::outbound::AttachmentStore;

pub struct AttachmentPersister<AS: AttachmentStore> {
    store: AS,
    name: String,
}

impl<AS: AttachmentStore> AttachmentPersister<AS> {
    pub fn new(store: AS, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn store(&self) -> &AS {
        &self.store
    }

    pub fn persist(
        &self,
        document_id: &str,
        mut stream: AttachmentStream,
    ) -> Result<AttachmentRef, AttachmentError> {
        let result = self.store.write_stream(document_id, &self.name, &mut stream);
        stream.release();

        match &result {
            Ok(reference) => tracing::debug!(
                "[ip-01] 📎 Attachment for {} persisted ({} bytes, sha256 {})",
                document_id,
                reference.size,
                reference.sha256
            ),
            Err(e) => tracing::warn!(
                "[ip-01] ⚠️ Attachment for {} could not be persisted: {}",
                document_id,
                e
            ),
        }
        result
    }

    /// Remove the container written for `document_id`.
    pub fn discard(&self, document_id: &str) -> Result<(), AttachmentError> {
        self.store.delete(document_id, &self.name)
    }
}
