//! # Wiring
//!
//! Builds the intake service from runtime configuration.

use crate::adapters::OutboxAcknowledgementQueue;
use crate::config::RuntimeConfig;
use anyhow::{Context, Result};
use ip_01_intake::adapters::{
    FileAttachmentStore, FileConversationLedger, FileMessageStore, FileParkedAcknowledgements,
    HmacJwsVerifier, SystemTimeSource,
};
use ip_01_intake::{IntakeDependencies, IntakeService};

/// The intake service as deployed by the runtime.
pub type RuntimeIntake = IntakeService<
    FileMessageStore,
    FileAttachmentStore,
    FileConversationLedger,
    OutboxAcknowledgementQueue,
    FileParkedAcknowledgements,
    HmacJwsVerifier,
    SystemTimeSource,
>;

pub fn build_intake(config: &RuntimeConfig) -> Result<RuntimeIntake> {
    let storage = &config.storage;

    let message_store = FileMessageStore::open(storage.messages_path())
        .with_context(|| format!("opening message store {}", storage.messages_path().display()))?;
    let attachment_store = FileAttachmentStore::new(storage.attachments_dir()).with_context(|| {
        format!(
            "opening attachment store {}",
            storage.attachments_dir().display()
        )
    })?;
    let conversations = FileConversationLedger::open(storage.conversations_path()).with_context(|| {
        format!(
            "opening conversation ledger {}",
            storage.conversations_path().display()
        )
    })?;
    let parked_acknowledgements = FileParkedAcknowledgements::open(storage.parked_path())
        .with_context(|| format!("opening parked acknowledgements {}", storage.parked_path().display()))?;
    let acknowledgements = OutboxAcknowledgementQueue::new(storage.outbox_dir())
        .with_context(|| format!("opening outbox {}", storage.outbox_dir().display()))?;

    let deps = IntakeDependencies {
        message_store,
        attachment_store,
        conversations,
        acknowledgements,
        parked_acknowledgements,
        verifier: HmacJwsVerifier::new(config.security.jws_secret.clone()),
        time_source: SystemTimeSource,
    };
    Ok(IntakeService::new(deps, config.intake.clone()))
}
