//! # Shared Types Crate
//!
//! This crate contains the Standard Business Document envelope and the
//! enumerations every stage of the integration point agrees on.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: The decoder produces an [`Envelope`]; every
//!   downstream stage reads it and never mutates it.
//! - **Exhaustive Payloads**: The payload is a tagged enum. Variants the decoder
//!   cannot map land in [`Payload::Unrecognized`] so the intake stage can reject
//!   them explicitly instead of guessing.
//! - **Stable Wire Names**: Enumerations serialize with their canonical
//!   upper-case names (`DPO`, `INCOMING_RECEIVED`, ...).

pub mod entities;
pub mod envelope;
pub mod errors;

pub use entities::*;
pub use envelope::*;
pub use errors::*;
