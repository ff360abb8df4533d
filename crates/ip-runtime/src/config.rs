//! # Runtime Configuration
//!
//! Defaults suit a local single-node setup; every field can be overridden
//! from `IP_*` environment variables.
//!
//! ## Security Requirements
//!
//! - `jws_secret` MUST be set in production. Without it every signed
//!   envelope fails with a verifier-unavailable error.

use ip_01_intake::{AcknowledgementPolicy, IntakeConfig};
use shared_types::ServiceIdentifier;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Complete runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub storage: StorageConfig,
    pub spool: SpoolConfig,
    pub security: SecurityConfig,
    pub intake: IntakeConfig,
}

impl RuntimeConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from `lookup`. Unparseable values are logged and
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("IP_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("IP_SPOOL_DIR") {
            self.spool.spool_dir = PathBuf::from(dir);
        }
        if let Some(workers) = lookup("IP_WORKERS") {
            match workers.parse::<usize>() {
                Ok(n) if n > 0 => self.spool.workers = n,
                _ => warn!("IP_WORKERS must be a positive integer, got {:?}", workers),
            }
        }
        if let Some(secs) = lookup("IP_POLL_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.spool.poll_interval = Duration::from_secs(secs),
                Err(_) => warn!("IP_POLL_SECS must be a number of seconds, got {:?}", secs),
            }
        }
        if let Some(service) = lookup("IP_SERVICE") {
            match ServiceIdentifier::safe_value_of(&service) {
                Some(si) => self.spool.service_identifier = si,
                None => warn!("IP_SERVICE {:?} is not a known service identifier", service),
            }
        }
        if let Some(policy) = lookup("IP_ACK_POLICY") {
            match policy.parse::<AcknowledgementPolicy>() {
                Ok(policy) => self.intake.acknowledgement_policy = policy,
                Err(e) => warn!("IP_ACK_POLICY ignored: {}", e),
            }
        }
        if let Some(grace) = lookup("IP_EXPIRY_GRACE_SECS") {
            match grace.parse::<u32>() {
                Ok(secs) => self.intake.expiry_grace_secs = secs,
                Err(_) => warn!("IP_EXPIRY_GRACE_SECS must be a number of seconds, got {:?}", grace),
            }
        }
        if let Some(secret_hex) = lookup("IP_JWS_SECRET") {
            match hex::decode(secret_hex.trim()) {
                Ok(secret) if !secret.is_empty() => {
                    self.security.jws_secret = secret;
                    info!("Loaded JWS secret from environment");
                }
                _ => warn!("IP_JWS_SECRET must be non-empty hex"),
            }
        }
    }

    /// Validate configuration for production readiness.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.security.jws_secret.is_empty() {
            return Err(ConfigError::MissingJwsSecret);
        }
        if self.storage.data_dir == self.spool.spool_dir {
            return Err(ConfigError::SharedDirectory(self.storage.data_dir.clone()));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "SECURITY VIOLATION: JWS secret is not set. \
         Set IP_JWS_SECRET (hex) before running in production."
    )]
    MissingJwsSecret,

    #[error("Data and spool directories must differ ({})", .0.display())]
    SharedDirectory(PathBuf),
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Holds the message records, attachments and the process lock.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn messages_path(&self) -> PathBuf {
        self.data_dir.join("messages.json")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join("attachments")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.data_dir.join("outbox")
    }

    pub fn conversations_path(&self) -> PathBuf {
        self.data_dir.join("conversations.json")
    }

    /// Acknowledgements refused by the outbox, kept until redriven.
    pub fn parked_path(&self) -> PathBuf {
        self.data_dir.join("parked-acknowledgements.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Inbound spool configuration.
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Directory scanned for `*.json` envelopes.
    pub spool_dir: PathBuf,
    /// Maximum envelopes processed concurrently.
    pub workers: usize,
    /// Pause between sweeps. Zero runs a single sweep and exits.
    pub poll_interval: Duration,
    /// Channel tag applied to spooled envelopes.
    pub service_identifier: ServiceIdentifier,
}

impl SpoolConfig {
    pub fn processed_dir(&self) -> PathBuf {
        self.spool_dir.join("processed")
    }

    pub fn failed_dir(&self) -> PathBuf {
        self.spool_dir.join("failed")
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("./spool"),
            workers: 4,
            poll_interval: Duration::from_secs(5),
            service_identifier: ServiceIdentifier::Dpo,
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// HS256 key for signed-token verification. Empty means unset.
    pub jws_secret: Vec<u8>,
}
