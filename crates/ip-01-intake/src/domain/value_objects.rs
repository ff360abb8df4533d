//! # Value Objects
//!
//! Configuration for the intake stage and the status update carried to the
//! conversation service.

use serde::{Deserialize, Serialize};
use shared_types::ReceiptStatus;
use std::fmt;
use std::str::FromStr;

/// When the RECEIVED acknowledgement is queued relative to the commit of the
/// intake unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcknowledgementPolicy {
    /// Queue after commit. A queue failure leaves the intake committed and
    /// parks the acknowledgement for redrive.
    #[default]
    AfterCommit,
    /// Queue inside the unit of work. A queue failure rolls the intake back.
    WithinUnitOfWork,
}

impl AcknowledgementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AfterCommit => "after-commit",
            Self::WithinUnitOfWork => "within-unit-of-work",
        }
    }
}

impl fmt::Display for AcknowledgementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcknowledgementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "after-commit" | "after_commit" => Ok(Self::AfterCommit),
            "within-unit-of-work" | "within_unit_of_work" | "transactional" => {
                Ok(Self::WithinUnitOfWork)
            }
            other => Err(format!("unknown acknowledgement policy: {other}")),
        }
    }
}

/// Intake stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub acknowledgement_policy: AcknowledgementPolicy,
    /// File name the attachment container is stored under.
    pub attachment_name: String,
    /// Seconds of clock skew tolerated past `expires_at`.
    pub expiry_grace_secs: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            acknowledgement_policy: AcknowledgementPolicy::AfterCommit,
            attachment_name: "message.asic".to_string(),
            expiry_grace_secs: 0,
        }
    }
}

impl IntakeConfig {
    /// Config for tests: default policy, fixed attachment name.
    pub fn for_testing() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: AcknowledgementPolicy) -> Self {
        self.acknowledgement_policy = policy;
        self
    }
}

/// Status appended to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ReceiptStatus,
    pub description: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: ReceiptStatus) -> Self {
        Self {
            status,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
