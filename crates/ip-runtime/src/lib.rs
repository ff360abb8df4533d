//! # Integration Point Runtime
//!
//! Drives the intake pipeline from an inbound spool directory.
//!
//! ## Modular Structure
//!
//! - `config` - Runtime configuration and environment overrides
//! - `lock` - Exclusive data-directory lock
//! - `adapters` - Outbox acknowledgement queue
//! - `wiring` - Builds the intake service from configuration
//! - `spool` - Spool scanning and sweeping
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults + `IP_*` environment)
//! 2. Validate the JWS secret is set
//! 3. Lock the data directory
//! 4. Wire the intake service
//! 5. Sweep the spool (once, or every poll interval until Ctrl+C)

pub mod adapters;
pub mod config;
pub mod lock;
pub mod spool;
pub mod wiring;

pub use config::{ConfigError, RuntimeConfig};
pub use lock::{DatabaseLock, LockError};
pub use spool::{sweep, SweepReport};
pub use wiring::{build_intake, RuntimeIntake};
