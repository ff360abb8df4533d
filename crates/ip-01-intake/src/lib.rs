//! # Inbound Intake (ip-01)
//!
//! Decides, for every decoded inbound envelope, whether it is persisted,
//! acknowledged, rejected or ignored.
//!
//! ## Architecture
//!
//! ```text
//! transport ──► IntakeApi ──► ExpiryGuard ──► receipt? ──► signature
//!                                                            │
//!                        Deduplicator ◄──────────────────────┘
//!                             │
//!            [unit of work: attachment, record, conversation]
//!                             │
//!                     StatusNotifier ──► acknowledgement queue
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Description |
//! |-----------|-------------|
//! | Single record | At most one stored record per document id, under any concurrency |
//! | Idempotent redelivery | A redelivered document changes nothing and resolves to the first record |
//! | All or nothing | Attachment, record and conversation update commit together |
//! | No persistence on reject | Expired or badly signed documents only produce a status |
//! | Stream release | The attachment stream is released on every path |
//! | Durable parking | Acknowledgements the queue refused after commit are parked in a store that outlives restarts |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Pure domain logic (entities, expiry, signature outcomes, errors)
//! - `ports/` - Port traits (inbound API, outbound SPI)
//! - `adapters/` - In-memory, file-backed and JWS adapters
//! - `service/` - The pipeline and its components
//!
//! ## Usage
//!
//! ```ignore
//! use ip_01_intake::{IntakeApi, IntakeConfig, IntakeDependencies, IntakeService};
//!
//! let service = IntakeService::new(deps, IntakeConfig::default());
//! match service.enqueue_incoming_message(&envelope, ServiceIdentifier::Dpo, Some(stream))? {
//!     IntakeOutcome::Accepted { message, .. } => { /* hand off */ }
//!     other => tracing::info!("{other:?}"),
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod test_utils;

// Re-export key types for convenience
pub use domain::attachment::AttachmentStream;
pub use domain::entities::{
    Acknowledgement, AttachmentRef, ConversationEvent, ConversationRecord, InsertOutcome,
    StatusEntry, StoredMessage,
};
pub use domain::errors::{
    AcknowledgementError, AttachmentError, ConversationError, IntakeError, StoreError,
    VerifierError,
};
pub use domain::expiry::ExpiryGuard;
pub use domain::signature::SignatureCheck;
pub use domain::value_objects::{AcknowledgementPolicy, IntakeConfig, StatusUpdate};
pub use ports::inbound::{AcknowledgementState, IntakeApi, IntakeOutcome, RedriveReport};
pub use ports::outbound::{
    AcknowledgementQueue, AttachmentStore, ConversationService, MessageStore,
    ParkedAcknowledgementStore, TimeSource, TokenVerifier,
};
pub use service::{Deduplicator, IntakeDependencies, IntakeService, KeyedLocks};
