//! # Ports Layer
//!
//! - `inbound.rs` - Driving port (the intake API)
//! - `outbound.rs` - Driven ports (collaborators the pipeline depends on)

pub mod inbound;
pub mod outbound;
