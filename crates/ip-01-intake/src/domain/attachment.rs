//! # Attachment Stream
//!
//! Owned handle to the attachment container that arrived with an envelope.
//!
//! The underlying reader is released exactly once: when the persister has
//! consumed it, when [`AttachmentStream::release`] is called, or when the
//! handle is dropped. Every exit path of the pipeline therefore releases it,
//! including early returns and `?` propagation.

use std::fmt;
use std::io::{self, Cursor, Read};

pub struct AttachmentStream {
    reader: Option<Box<dyn Read + Send>>,
    size_hint: Option<u64>,
}

impl AttachmentStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            size_hint: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self::new(Cursor::new(bytes)).with_size_hint(len)
    }

    /// Declared length, if the transport announced one.
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }

    /// Drop the underlying reader now.
    pub fn release(&mut self) {
        if self.reader.take().is_some() {
            tracing::trace!("[ip-01] attachment stream released");
        }
    }
}

impl Read for AttachmentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for AttachmentStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for AttachmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentStream")
            .field("released", &self.is_released())
            .field("size_hint", &self.size_hint)
            .finish()
    }
}
