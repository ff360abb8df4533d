//! # Runtime Adapters
//!
//! Port implementations that only make sense inside the runtime.

use ip_01_intake::{Acknowledgement, AcknowledgementError, AcknowledgementQueue};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn file_name_for(id: Uuid) -> String {
    format!("{id}.json")
}

fn unavailable(err: io::Error) -> AcknowledgementError {
    AcknowledgementError::Unavailable {
        message: err.to_string(),
    }
}

/// Acknowledgement queue writing one JSON file per receipt into an outbox
/// directory, for the outbound transport to pick up.
pub struct OutboxAcknowledgementQueue {
    dir: PathBuf,
}

impl OutboxAcknowledgementQueue {
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AcknowledgementQueue for OutboxAcknowledgementQueue {
    fn enqueue(&self, acknowledgement: Acknowledgement) -> Result<(), AcknowledgementError> {
        let bytes = serde_json::to_vec_pretty(&acknowledgement).map_err(|e| {
            AcknowledgementError::Rejected {
                reason: e.to_string(),
            }
        })?;
        let target = self.dir.join(file_name_for(acknowledgement.id));
        let temp = target.with_extension("tmp");

        let mut file = fs::File::create(&temp).map_err(unavailable)?;
        file.write_all(&bytes).map_err(unavailable)?;
        file.sync_all().map_err(unavailable)?;
        fs::rename(&temp, &target).map_err(unavailable)?;
        tracing::debug!(
            "[ip-runtime] 📨 {} acknowledgement for {} written to outbox",
            acknowledgement.status,
            acknowledgement.document_id
        );
        Ok(())
    }

    fn cancel(&self, acknowledgement_id: Uuid) -> Result<(), AcknowledgementError> {
        match fs::remove_file(self.dir.join(file_name_for(acknowledgement_id))) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }
}
