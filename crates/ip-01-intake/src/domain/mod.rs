//! # Domain Layer
//!
//! Pure domain logic for the intake stage. Nothing here performs I/O.
//!
//! ## Modules
//!
//! - `entities` - Stored records, conversation events, acknowledgements
//! - `attachment` - Attachment stream handle with guaranteed release
//! - `expiry` - Validity-window check
//! - `signature` - Signed-token check outcomes
//! - `value_objects` - Configuration and status updates
//! - `errors` - Port errors and the intake error

pub mod attachment;
pub mod entities;
pub mod errors;
pub mod expiry;
pub mod signature;
pub mod value_objects;
