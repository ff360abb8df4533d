//! # Expiry Guard
//!
//! A document is expired when its validity window closed before the moment of
//! intake. Documents without `expires_at` never expire.

use chrono::{DateTime, Duration, Utc};
use shared_types::Envelope;

#[derive(Debug, Clone, Copy)]
pub struct ExpiryGuard {
    grace: Duration,
}

impl Default for ExpiryGuard {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ExpiryGuard {
    pub fn new(grace_secs: u32) -> Self {
        Self {
            grace: Duration::seconds(i64::from(grace_secs)),
        }
    }

    /// `expires_at + grace < now`. A document is still valid at the exact
    /// instant it expires. A deadline past the representable range never
    /// expires.
    pub fn is_expired(&self, envelope: &Envelope, now: DateTime<Utc>) -> bool {
        envelope
            .expires_at()
            .and_then(|expires_at| expires_at.checked_add_signed(self.grace))
            .is_some_and(|deadline| deadline < now)
    }

    /// Human-readable reason recorded with the EXPIRED status.
    pub fn describe(envelope: &Envelope) -> String {
        match envelope.expires_at() {
            Some(expires_at) => format!(
                "Document {} expired at {}",
                envelope.document_id(),
                expires_at.to_rfc3339()
            ),
            None => format!("Document {} expired", envelope.document_id()),
        }
    }
}
