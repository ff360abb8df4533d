//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `memory`: in-memory adapters for every port, with outage switches for tests
//! - `file`: file-backed message store, attachment store, conversation
//!   ledger and parked acknowledgements
//! - `jws`: HS256 compact JWS verifier
//! - `infra`: time sources

pub mod file;
pub mod infra;
pub mod jws;
pub mod memory;

pub use file::{
    FileAttachmentStore, FileConversationLedger, FileMessageStore, FileParkedAcknowledgements,
};
pub use infra::{ManualTimeSource, SystemTimeSource};
pub use jws::HmacJwsVerifier;
pub use memory::{
    AcceptAllVerifier, InMemoryAcknowledgementQueue, InMemoryAttachmentStore,
    InMemoryConversationLedger, InMemoryMessageStore, InMemoryParkedAcknowledgements,
};
