//! # Signed-Token Check
//!
//! Envelopes may carry a compact JWS in their signed-token scope. The token
//! is verified before anything is persisted; envelopes without the scope skip
//! verification entirely.

/// Prefix of the FAILED status description written on rejection.
pub const SIGNATURE_FAILURE_PREFIX: &str = "Signature verification failed";

/// Outcome of checking an envelope's signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// No signed-token scope present.
    Unsigned,
    Verified,
    Rejected { reason: String },
}

impl SignatureCheck {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Description recorded with the FAILED status.
pub fn rejection_description(detail: &str) -> String {
    format!("{SIGNATURE_FAILURE_PREFIX}: {detail}")
}
