//! # Unit of Work
//!
//! Groups the side effects of accepting one document so they become visible
//! together or not at all.
//!
//! Each effect records its compensation as soon as it succeeds. `commit`
//! discards the log. Anything else runs the log in reverse: an explicit
//! `rollback`, or dropping an open unit of work (early return, `?`, panic
//! unwinding). A compensation that fails is logged and the remaining ones
//! still run.

use crate::domain::entities::ConversationEvent;
use crate::domain::errors::IntakeError;
use uuid::Uuid;

/// Undo step for one recorded effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    DiscardAttachment { document_id: String },
    DeleteMessage { document_id: String },
    RevertConversation(ConversationEvent),
    CancelAcknowledgement(Uuid),
}

/// Executes compensations against the collaborators.
pub trait Compensator {
    fn compensate(&self, step: &Compensation) -> Result<(), IntakeError>;
}

pub struct UnitOfWork<'a> {
    compensator: &'a dyn Compensator,
    document_id: String,
    steps: Vec<Compensation>,
    finished: bool,
}

impl<'a> UnitOfWork<'a> {
    pub fn begin(compensator: &'a dyn Compensator, document_id: &str) -> Self {
        Self {
            compensator,
            document_id: document_id.to_string(),
            steps: Vec::new(),
            finished: false,
        }
    }

    pub fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn pending_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn commit(mut self) {
        self.finished = true;
        self.steps.clear();
        tracing::debug!("[ip-01] unit of work for {} committed", self.document_id);
    }

    /// Undo recorded effects, newest first. Returns the number of
    /// compensations that failed.
    pub fn rollback(mut self) -> usize {
        self.run_rollback()
    }

    fn run_rollback(&mut self) -> usize {
        self.finished = true;
        let mut failed = 0;
        while let Some(step) = self.steps.pop() {
            if let Err(e) = self.compensator.compensate(&step) {
                failed += 1;
                tracing::error!(
                    "[ip-01] ❌ compensation {:?} for {} failed: {}",
                    step,
                    self.document_id,
                    e
                );
            }
        }
        tracing::warn!(
            "[ip-01] ↩️ unit of work for {} rolled back ({} compensation failures)",
            self.document_id,
            failed
        );
        failed
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.run_rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::StoreError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Compensation>>,
        fail_on_message: bool,
    }

    impl Compensator for Recorder {
        fn compensate(&self, step: &Compensation) -> Result<(), IntakeError> {
            self.seen.lock().push(step.clone());
            if self.fail_on_message && matches!(step, Compensation::DeleteMessage { .. }) {
                return Err(StoreError::Unavailable {
                    message: "down".into(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn steps() -> [Compensation; 2] {
        [
            Compensation::DiscardAttachment {
                document_id: "D1".into(),
            },
            Compensation::DeleteMessage {
                document_id: "D1".into(),
            },
        ]
    }

    #[test]
    fn test_commit_runs_nothing() {
        let recorder = Recorder::default();
        let mut uow = UnitOfWork::begin(&recorder, "D1");
        for step in steps() {
            uow.record(step);
        }
        uow.commit();
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_rollback_runs_in_reverse() {
        let recorder = Recorder::default();
        let mut uow = UnitOfWork::begin(&recorder, "D1");
        for step in steps() {
            uow.record(step);
        }
        assert_eq!(uow.rollback(), 0);

        let [first, second] = steps();
        assert_eq!(*recorder.seen.lock(), vec![second, first]);
    }

    #[test]
    fn test_drop_rolls_back_open_unit() {
        let recorder = Recorder::default();
        {
            let mut uow = UnitOfWork::begin(&recorder, "D1");
            uow.record(Compensation::CancelAcknowledgement(Uuid::nil()));
        }
        assert_eq!(
            *recorder.seen.lock(),
            vec![Compensation::CancelAcknowledgement(Uuid::nil())]
        );
    }

    #[test]
    fn test_failed_compensation_does_not_stop_rollback() {
        let recorder = Recorder {
            fail_on_message: true,
            ..Default::default()
        };
        let mut uow = UnitOfWork::begin(&recorder, "D1");
        for step in steps() {
            uow.record(step);
        }
        assert_eq!(uow.rollback(), 1);
        assert_eq!(recorder.seen.lock().len(), 2);
    }
}
