//! # Spool Sweep
//!
//! Feeds decoded envelopes from a spool directory into the intake API.
//!
//! ## Layout
//!
//! ```text
//! spool/
//! ├── <name>.json       envelope
//! ├── <name>.asic       optional attachment container
//! ├── processed/        envelopes the pipeline handled (any outcome)
//! └── failed/           envelopes that can never be handled
//! ```
//!
//! Transient failures leave the files in place; the next sweep is the
//! redelivery.

use crate::config::SpoolConfig;
use anyhow::{Context, Result};
use ip_01_intake::{AttachmentStream, IntakeApi, IntakeOutcome, RedriveReport};
use shared_types::{Envelope, ServiceIdentifier};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const ENVELOPE_EXTENSION: &str = "json";
const ATTACHMENT_EXTENSION: &str = "asic";

/// One spooled envelope and its optional attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolItem {
    pub envelope_path: PathBuf,
    pub attachment_path: Option<PathBuf>,
}

/// List spooled envelopes in name order.
pub fn scan(spool_dir: &Path) -> io::Result<Vec<SpoolItem>> {
    let mut items = Vec::new();
    for entry in fs::read_dir(spool_dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ENVELOPE_EXTENSION)
        {
            continue;
        }
        let attachment = path.with_extension(ATTACHMENT_EXTENSION);
        items.push(SpoolItem {
            attachment_path: attachment.is_file().then_some(attachment),
            envelope_path: path,
        });
    }
    items.sort_by(|a, b| a.envelope_path.cmp(&b.envelope_path));
    Ok(items)
}

/// What became of one spool item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Completed(IntakeOutcome),
    /// Transient failure; left in the spool for the next sweep.
    Deferred(String),
    /// Permanent failure; moved to `failed/`.
    Rejected(String),
}

/// Run one item through the intake API. Blocking.
pub fn process_item<A: IntakeApi + ?Sized>(
    api: &A,
    item: &SpoolItem,
    service_identifier: ServiceIdentifier,
) -> ItemResult {
    let envelope: Envelope = match fs::read(&item.envelope_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Ok(envelope) => envelope,
        Err(e) => return ItemResult::Rejected(format!("undecodable envelope: {e}")),
    };

    let attachment = match &item.attachment_path {
        Some(path) => match open_attachment(path) {
            Ok(stream) => Some(stream),
            Err(e) => return ItemResult::Deferred(format!("attachment unreadable: {e}")),
        },
        None => None,
    };

    match api.enqueue_incoming_message(&envelope, service_identifier, attachment) {
        Ok(outcome) => ItemResult::Completed(outcome),
        Err(e) if e.is_transient() => ItemResult::Deferred(e.to_string()),
        Err(e) => ItemResult::Rejected(e.to_string()),
    }
}

fn open_attachment(path: &Path) -> io::Result<AttachmentStream> {
    let file = fs::File::open(path)?;
    let size = file.metadata()?.len();
    Ok(AttachmentStream::new(file).with_size_hint(size))
}

/// Move the item's files according to its result.
fn settle(item: &SpoolItem, result: &ItemResult, config: &SpoolConfig) {
    let target = match result {
        ItemResult::Completed(_) => config.processed_dir(),
        ItemResult::Rejected(_) => config.failed_dir(),
        ItemResult::Deferred(_) => return,
    };
    let files = std::iter::once(&item.envelope_path).chain(item.attachment_path.as_ref());
    for path in files {
        let Some(name) = path.file_name() else {
            continue;
        };
        if let Err(e) = fs::rename(path, target.join(name)) {
            error!(
                "[ip-runtime] ❌ Could not move {} to {}: {}",
                path.display(),
                target.display(),
                e
            );
        }
    }
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub expired: usize,
    pub receipts: usize,
    /// Receipts for a message the ledger has never seen.
    pub orphan_receipts: usize,
    pub signature_rejected: usize,
    pub deferred: usize,
    pub failed: usize,
    pub redrive: RedriveReport,
}

impl SweepReport {
    fn record(&mut self, result: &ItemResult) {
        match result {
            ItemResult::Completed(IntakeOutcome::Accepted { .. }) => self.accepted += 1,
            ItemResult::Completed(IntakeOutcome::Duplicate { .. }) => self.duplicates += 1,
            ItemResult::Completed(IntakeOutcome::Expired { .. }) => self.expired += 1,
            ItemResult::Completed(IntakeOutcome::StatusRecorded {
                conversation_found,
                ..
            }) => {
                self.receipts += 1;
                if !conversation_found {
                    self.orphan_receipts += 1;
                }
            }
            ItemResult::Completed(IntakeOutcome::SignatureRejected { .. }) => {
                self.signature_rejected += 1
            }
            ItemResult::Deferred(_) => self.deferred += 1,
            ItemResult::Rejected(_) => self.failed += 1,
        }
    }

    pub fn handled(&self) -> usize {
        self.accepted + self.duplicates + self.expired + self.receipts + self.signature_rejected
    }
}

/// Process every spooled envelope once, at most `config.workers` at a time,
/// then redrive parked acknowledgements.
pub async fn sweep<A>(api: Arc<A>, config: &SpoolConfig) -> Result<SweepReport>
where
    A: IntakeApi + 'static,
{
    fs::create_dir_all(&config.spool_dir)
        .with_context(|| format!("creating spool {}", config.spool_dir.display()))?;
    fs::create_dir_all(config.processed_dir()).context("creating processed/")?;
    fs::create_dir_all(config.failed_dir()).context("creating failed/")?;

    let items = scan(&config.spool_dir)
        .with_context(|| format!("scanning spool {}", config.spool_dir.display()))?;
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut tasks = JoinSet::new();

    for item in items {
        let permit = semaphore.clone().acquire_owned().await?;
        let api = api.clone();
        let config = config.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = process_item(&*api, &item, config.service_identifier);
            match &result {
                ItemResult::Deferred(reason) => warn!(
                    "[ip-runtime] ⏳ {} deferred: {}",
                    item.envelope_path.display(),
                    reason
                ),
                ItemResult::Rejected(reason) => error!(
                    "[ip-runtime] ❌ {} failed: {}",
                    item.envelope_path.display(),
                    reason
                ),
                ItemResult::Completed(_) => {}
            }
            settle(&item, &result, &config);
            result
        });
    }

    let mut report = SweepReport::default();
    while let Some(joined) = tasks.join_next().await {
        report.record(&joined?);
    }

    let redrive_api = api.clone();
    report.redrive =
        match tokio::task::spawn_blocking(move || redrive_api.redrive_acknowledgements()).await? {
            Ok(redrive) => redrive,
            Err(e) => {
                warn!("[ip-runtime] ⏳ Redrive skipped: {}", e);
                RedriveReport::default()
            }
        };

    info!(
        "[ip-runtime] 🧹 Sweep done: {} accepted, {} duplicates, {} expired, {} receipts, {} rejected signatures, {} deferred, {} failed",
        report.accepted,
        report.duplicates,
        report.expired,
        report.receipts,
        report.signature_rejected,
        report.deferred,
        report.failed
    );
    Ok(report)
}
