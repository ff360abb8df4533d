//! # Intake Service
//!
//! The pipeline every inbound envelope passes through after decoding.
//!
//! ## Flow
//!
//! ```text
//! envelope ──► payload known? ──no──► Err(UnrecognizedPayload)
//!                  │
//!                  ▼
//!              expired? ──yes──► EXPIRED status, Ok(Expired)
//!                  │
//!                  ▼
//!           status receipt? ──yes──► status appended, Ok(StatusRecorded)
//!                  │
//!                  ▼
//!           signed token ok? ──no──► FAILED status, Ok(SignatureRejected)
//!                  │
//!                  ▼
//!        [document lock held]
//!         already stored? ──yes──► Ok(Duplicate), nothing changes
//!                  │
//!                  ▼
//!        [unit of work] attachment ─► record ─► INCOMING_RECEIVED
//!                  │
//!                  ▼
//!            RECEIVED acknowledgement, Ok(Accepted)
//!                  │ refused after commit
//!                  ▼
//!            parked for redrive
//! ```
//!
//! The attachment stream is released on every path.

mod dedup;
mod notifier;
mod persister;
mod pipeline;
#[cfg(test)]
mod tests;
mod unit_of_work;

pub use dedup::{Deduplicator, KeyGuard, KeyedLocks, Resolution};
pub use notifier::StatusNotifier;
pub use persister::AttachmentPersister;
pub use unit_of_work::{Compensation, Compensator, UnitOfWork};

use crate::domain::errors::IntakeError;
use crate::domain::expiry::ExpiryGuard;
use crate::domain::value_objects::IntakeConfig;
use crate::ports::outbound::{
    AcknowledgementQueue, AttachmentStore, ConversationService, MessageStore,
    ParkedAcknowledgementStore, TimeSource, TokenVerifier,
};
use parking_lot::Mutex;

/// The intake service.
///
/// Safe to share across threads; all mutable state sits behind the ports or
/// behind locks owned by the service.
pub struct IntakeService<MS, AS, CS, AQ, PS, TV, TS>
where
    MS: MessageStore,
    AS: AttachmentStore,
    CS: ConversationService,
    AQ: AcknowledgementQueue,
    PS: ParkedAcknowledgementStore,
    TV: TokenVerifier,
    TS: TimeSource,
{
    pub(crate) config: IntakeConfig,
    pub(crate) expiry: ExpiryGuard,
    pub(crate) verifier: TV,
    pub(crate) dedup: Deduplicator<MS>,
    pub(crate) persister: AttachmentPersister<AS>,
    pub(crate) notifier: StatusNotifier<CS, AQ>,
    pub(crate) time_source: TS,
    /// Acknowledgements committed but refused by the queue.
    pub(crate) parked: PS,
    /// Serializes redrive passes so a parked acknowledgement is sent once.
    pub(crate) redrive_lock: Mutex<()>,
}

/// Dependencies for IntakeService
pub struct IntakeDependencies<MS, AS, CS, AQ, PS, TV, TS> {
    pub message_store: MS,
    pub attachment_store: AS,
    pub conversations: CS,
    pub acknowledgements: AQ,
    pub parked_acknowledgements: PS,
    pub verifier: TV,
    pub time_source: TS,
}

impl<MS, AS, CS, AQ, PS, TV, TS> IntakeService<MS, AS, CS, AQ, PS, TV, TS>
where
    MS: MessageStore,
    AS: AttachmentStore,
    CS: ConversationService,
    AQ: AcknowledgementQueue,
    PS: ParkedAcknowledgementStore,
    TV: TokenVerifier,
    TS: TimeSource,
{
    pub fn new(deps: IntakeDependencies<MS, AS, CS, AQ, PS, TV, TS>, config: IntakeConfig) -> Self {
        tracing::info!(
            "[ip-01] Intake service ready (acknowledgements: {})",
            config.acknowledgement_policy
        );
        Self {
            expiry: ExpiryGuard::new(config.expiry_grace_secs),
            verifier: deps.verifier,
            dedup: Deduplicator::new(deps.message_store),
            persister: AttachmentPersister::new(deps.attachment_store, config.attachment_name.clone()),
            notifier: StatusNotifier::new(deps.conversations, deps.acknowledgements),
            time_source: deps.time_source,
            parked: deps.parked_acknowledgements,
            redrive_lock: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn deduplicator(&self) -> &Deduplicator<MS> {
        &self.dedup
    }
}

impl<MS, AS, CS, AQ, PS, TV, TS> Compensator for IntakeService<MS, AS, CS, AQ, PS, TV, TS>
where
    MS: MessageStore,
    AS: AttachmentStore,
    CS: ConversationService,
    AQ: AcknowledgementQueue,
    PS: ParkedAcknowledgementStore,
    TV: TokenVerifier,
    TS: TimeSource,
{
    fn compensate(&self, step: &Compensation) -> Result<(), IntakeError> {
        match step {
            Compensation::DiscardAttachment { document_id } => {
                self.persister.discard(document_id)?
            }
            Compensation::DeleteMessage { document_id } => {
                self.dedup.store().delete(document_id)?
            }
            Compensation::RevertConversation(event) => self.notifier.revert(event)?,
            Compensation::CancelAcknowledgement(id) => self.notifier.cancel(*id)?,
        }
        Ok(())
    }
}
