use super::{Compensation, IntakeService, Resolution, UnitOfWork};
use crate::domain::attachment::AttachmentStream;
use crate::domain::entities::{Acknowledgement, AttachmentRef, StoredMessage};
use crate::domain::errors::{IntakeError, VerifierError};
use crate::domain::signature::SignatureCheck;
use crate::domain::value_objects::AcknowledgementPolicy;
use crate::ports::inbound::{AcknowledgementState, IntakeApi, IntakeOutcome, RedriveReport};
use crate::ports::outbound::{
    AcknowledgementQueue, AttachmentStore, ConversationService, MessageStore,
    ParkedAcknowledgementStore, TimeSource, TokenVerifier,
};
use chrono::{DateTime, Utc};
use shared_types::{Envelope, Payload, ReceiptStatus, ServiceIdentifier, StatusMessage};

impl<MS, AS, CS, AQ, PS, TV, TS> IntakeApi for IntakeService<MS, AS, CS, AQ, PS, TV, TS>
where
    MS: MessageStore,
    AS: AttachmentStore,
    CS: ConversationService,
    AQ: AcknowledgementQueue,
    PS: ParkedAcknowledgementStore,
    TV: TokenVerifier,
    TS: TimeSource,
{
    fn enqueue_incoming_message(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        attachment: Option<AttachmentStream>,
    ) -> Result<IntakeOutcome, IntakeError> {
        let document_id = envelope.document_id();

        if matches!(envelope.payload, Payload::Unrecognized) {
            tracing::warn!(
                "[ip-01] ⚠️ Document {} has an unrecognized payload, refusing",
                document_id
            );
            return Err(IntakeError::UnrecognizedPayload {
                document_id: document_id.to_string(),
            });
        }

        let now = self.time_source.now();
        if self.expiry.is_expired(envelope, now) {
            drop(attachment);
            tracing::warn!(
                "[ip-01] ⏰ Document {} ({}) expired before intake",
                document_id,
                service_identifier
            );
            self.notifier.register_expired(envelope, service_identifier)?;
            return Ok(IntakeOutcome::Expired {
                document_id: document_id.to_string(),
            });
        }

        if let Payload::Status(receipt) = &envelope.payload {
            drop(attachment);
            return self.record_receipt(envelope, receipt);
        }

        if let SignatureCheck::Rejected { reason } = self.check_signature(envelope)? {
            drop(attachment);
            tracing::warn!(
                "[ip-01] 🔏 Signature on document {} rejected: {}",
                document_id,
                reason
            );
            self.notifier
                .register_rejection(envelope, service_identifier, &reason)?;
            return Ok(IntakeOutcome::SignatureRejected {
                document_id: document_id.to_string(),
                reason,
            });
        }

        self.accept(envelope, service_identifier, attachment, now)
    }

    fn find_message(&self, document_id: &str) -> Result<Option<StoredMessage>, IntakeError> {
        Ok(self.dedup.find(document_id)?)
    }

    fn pending_acknowledgements(&self) -> Result<Vec<Acknowledgement>, IntakeError> {
        Ok(self.parked.parked()?)
    }

    fn redrive_acknowledgements(&self) -> Result<RedriveReport, IntakeError> {
        let _pass = self.redrive_lock.lock();
        let parked = self.parked.parked()?;
        let mut report = RedriveReport::default();

        for acknowledgement in parked {
            let id = acknowledgement.id;
            if let Err(e) = self.notifier.enqueue(acknowledgement) {
                tracing::debug!("[ip-01] acknowledgement {} still refused: {}", id, e);
                report.still_pending += 1;
                continue;
            }
            report.delivered += 1;
            if let Err(e) = self.parked.release(id) {
                // Stays parked and is sent again on the next pass.
                tracing::error!(
                    "[ip-01] ❌ Delivered acknowledgement {} could not be unparked: {}",
                    id,
                    e
                );
            }
        }

        if report.delivered > 0 {
            tracing::info!(
                "[ip-01] 📨 Redrove {} acknowledgements ({} still pending)",
                report.delivered,
                report.still_pending
            );
        }
        Ok(report)
    }
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
    /// Verify the signed token, if the envelope carries one.
    ///
    /// A bad token is an outcome; an unavailable verifier is an error.
    pub(crate) fn check_signature(&self, envelope: &Envelope) -> Result<SignatureCheck, IntakeError> {
        if !envelope.has_signed_token() {
            return Ok(SignatureCheck::Unsigned);
        }
        let Some(token) = envelope.signed_token().filter(|token| !token.trim().is_empty()) else {
            return Ok(SignatureCheck::Rejected {
                reason: "signed-token scope carries no token".to_string(),
            });
        };
        match self.verifier.verify(token) {
            Ok(()) => Ok(SignatureCheck::Verified),
            Err(VerifierError::BadSignature(reason)) => Ok(SignatureCheck::Rejected { reason }),
            Err(VerifierError::Unavailable(reason)) => {
                tracing::error!(
                    "[ip-01] ❌ Cannot verify signature on {}: {}",
                    envelope.document_id(),
                    reason
                );
                Err(IntakeError::VerifierUnavailable(reason))
            }
        }
    }

    fn record_receipt(
        &self,
        envelope: &Envelope,
        receipt: &StatusMessage,
    ) -> Result<IntakeOutcome, IntakeError> {
        let conversation_found = self.notifier.apply_receipt(envelope, receipt)?.is_some();
        if conversation_found {
            tracing::info!(
                "[ip-01] 📬 Receipt {} recorded for message {}",
                receipt.status,
                envelope.message_id()
            );
        } else {
            tracing::warn!(
                "[ip-01] ❓ Receipt {} refers to unknown message {}",
                receipt.status,
                envelope.message_id()
            );
        }
        Ok(IntakeOutcome::StatusRecorded {
            message_id: envelope.message_id().to_string(),
            status: receipt.status,
            conversation_found,
        })
    }

    /// Persist a valid document exactly once.
    ///
    /// The document lock is held from the existence check to the end of the
    /// unit of work, so a concurrent delivery either sees nothing or sees
    /// the committed result.
    fn accept(
        &self,
        envelope: &Envelope,
        service_identifier: ServiceIdentifier,
        attachment: Option<AttachmentStream>,
        now: DateTime<Utc>,
    ) -> Result<IntakeOutcome, IntakeError> {
        let document_id = envelope.document_id();
        let guard = self.dedup.lock(document_id);

        if let Some(existing) = self.dedup.find(document_id)? {
            drop(attachment);
            tracing::debug!("[ip-01] 🔁 Redelivery of {} ignored", document_id);
            return Ok(IntakeOutcome::Duplicate { message: existing });
        }

        let mut uow = UnitOfWork::begin(self, document_id);

        let attachment_ref = match attachment {
            Some(stream) => {
                let reference = self.persister.persist(document_id, stream)?;
                uow.record(Compensation::DiscardAttachment {
                    document_id: document_id.to_string(),
                });
                Some(reference)
            }
            None => None,
        };

        let message = match self.dedup.find_or_create_locked(
            &guard,
            envelope,
            service_identifier,
            attachment_ref.clone(),
            now,
        )? {
            Resolution::Created(message) => {
                uow.record(Compensation::DeleteMessage {
                    document_id: document_id.to_string(),
                });
                message
            }
            Resolution::Found(existing) => {
                return self.settle_lost_race(uow, existing, attachment_ref.as_ref());
            }
        };

        let event = self
            .notifier
            .register_received(envelope, service_identifier)?;
        uow.record(Compensation::RevertConversation(event));

        let acknowledgement = Acknowledgement::for_message(&message, ReceiptStatus::Received, now);
        let acknowledgement_id = acknowledgement.id;
        let acknowledgement_state = match self.config.acknowledgement_policy {
            AcknowledgementPolicy::WithinUnitOfWork => {
                self.notifier.enqueue(acknowledgement)?;
                uow.record(Compensation::CancelAcknowledgement(acknowledgement_id));
                uow.commit();
                AcknowledgementState::Queued(acknowledgement_id)
            }
            AcknowledgementPolicy::AfterCommit => {
                uow.commit();
                match self.notifier.enqueue(acknowledgement.clone()) {
                    Ok(()) => AcknowledgementState::Queued(acknowledgement_id),
                    Err(e) => {
                        tracing::warn!(
                            "[ip-01] ⚠️ Acknowledgement for {} parked for redrive: {}",
                            document_id,
                            e
                        );
                        // The record stays committed if parking fails.
                        self.parked.park(acknowledgement)?;
                        AcknowledgementState::Parked(acknowledgement_id)
                    }
                }
            }
        };
        drop(guard);

        tracing::info!(
            "[ip-01] ✅ Accepted document {} (message {}, {})",
            document_id,
            message.message_id,
            service_identifier
        );

        Ok(IntakeOutcome::Accepted {
            message,
            acknowledgement: acknowledgement_state,
        })
    }

    /// Another writer sharing the store recorded the document between our
    /// existence check and insert. Both writes target the same attachment
    /// slot.
    ///
    /// - nothing written here: plain duplicate
    /// - existing record has no attachment: our write is undone
    /// - same digest: the slot holds the bytes the record describes
    /// - different digest: the slot no longer matches the record
    fn settle_lost_race(
        &self,
        uow: UnitOfWork<'_>,
        existing: StoredMessage,
        written: Option<&AttachmentRef>,
    ) -> Result<IntakeOutcome, IntakeError> {
        let document_id = existing.document_id.clone();
        match (written, existing.attachment.as_ref()) {
            (None, _) => uow.commit(),
            (Some(_), None) => {
                uow.rollback();
            }
            (Some(ours), Some(theirs)) if ours.sha256 == theirs.sha256 => uow.commit(),
            (Some(ours), Some(theirs)) => {
                uow.commit();
                tracing::error!(
                    "[ip-01] ❌ Attachment slot for {} overwritten: record has {}, slot has {}",
                    document_id,
                    theirs.sha256,
                    ours.sha256
                );
                return Err(IntakeError::AttachmentConflict { document_id });
            }
        }
        tracing::debug!("[ip-01] 🔁 {} stored concurrently elsewhere", document_id);
        Ok(IntakeOutcome::Duplicate { message: existing })
    }
}
