use std::path::Path;

use anyhow::{Context, Result};
use pn_mock_core::{
    checklist_report, make_check_notification_status_record, make_consume_event_stream_record,
    make_create_event_stream_record, make_get_payment_notification_metadata_record,
    make_new_notification_record, make_preload_record, CheckNotificationStatusInput,
    CheckNotificationStatusRecord, CheckResult, ConsumeEventStreamInput, ConsumeEventStreamRecord,
    CreateEventStreamInput, CreateEventStreamRecord, DomainEnv, GetPaymentNotificationMetadataInput,
    GetPaymentNotificationMetadataRecord, NewNotificationInput, NewNotificationRecord,
    PreLoadInput, PreLoadRecord, Record, RecordKind, SharedLedger, StatusCoded,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub mod config;

pub use config::MockConfig;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistReport {
    pub snapshot_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub record_count: usize,
    pub results: Vec<CheckResult>,
}

/// Entry point shared by the HTTP service and the CLI: runs use cases against one ledger.
#[derive(Debug, Clone)]
pub struct MockApi {
    ledger: SharedLedger,
    env: DomainEnv,
}

impl MockApi {
    #[must_use]
    pub fn new(env: DomainEnv) -> Self {
        Self { ledger: SharedLedger::new(), env }
    }

    /// # Errors
    /// Returns an error when the configuration does not describe a valid environment.
    pub fn from_config(config: &MockConfig) -> Result<Self> {
        let env = config.domain_env().context("invalid mock configuration")?;
        Ok(Self::new(env))
    }

    /// Start from previously recorded interactions, e.g. a ledger dump.
    #[must_use]
    pub fn with_records(env: DomainEnv, records: Vec<Record>) -> Self {
        let ledger = SharedLedger::new();
        for record in records {
            ledger.append(record);
        }
        Self { ledger, env }
    }

    #[must_use]
    pub fn env(&self) -> &DomainEnv {
        &self.env
    }

    #[must_use]
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn preload(&self, input: PreLoadInput) -> PreLoadRecord {
        let record = self.ledger.append_with(|_| make_preload_record(&self.env, input));
        trace_record(RecordKind::PreLoadRecord, &record.output);
        record
    }

    pub fn new_notification(&self, input: NewNotificationInput) -> NewNotificationRecord {
        let record = self.ledger.append_with(|_| make_new_notification_record(&self.env, input));
        trace_record(RecordKind::NewNotificationRecord, &record.output);
        record
    }

    pub fn check_notification_status(
        &self,
        input: CheckNotificationStatusInput,
    ) -> CheckNotificationStatusRecord {
        let record = self.ledger.append_with(|records| {
            make_check_notification_status_record(&self.env, input, records)
        });
        trace_record(RecordKind::CheckNotificationStatusRecord, &record.output);
        record
    }

    pub fn create_event_stream(&self, input: CreateEventStreamInput) -> CreateEventStreamRecord {
        let record = self.ledger.append_with(|_| make_create_event_stream_record(&self.env, input));
        trace_record(RecordKind::CreateEventStreamRecord, &record.output);
        record
    }

    pub fn consume_event_stream(&self, input: ConsumeEventStreamInput) -> ConsumeEventStreamRecord {
        let record = self
            .ledger
            .append_with(|records| make_consume_event_stream_record(&self.env, input, records));
        trace_record(RecordKind::ConsumeEventStreamRecord, &record.output);
        record
    }

    pub fn payment_notification_metadata(
        &self,
        input: GetPaymentNotificationMetadataInput,
    ) -> GetPaymentNotificationMetadataRecord {
        let record = self.ledger.append_with(|records| {
            make_get_payment_notification_metadata_record(&self.env, input, records)
        });
        trace_record(RecordKind::GetPaymentNotificationMetadataRecord, &record.output);
        record
    }

    /// Recorded interactions in ledger order, optionally restricted to one kind.
    #[must_use]
    pub fn records(&self, kind: Option<RecordKind>) -> Vec<Record> {
        match kind {
            Some(kind) => self.ledger.read_where(|record| record.kind() == kind),
            None => self.ledger.snapshot(),
        }
    }

    /// Evaluate the preload checklist over the current ledger.
    ///
    /// # Errors
    /// Returns an error when the ledger cannot be fingerprinted.
    pub fn checklist_result(&self) -> Result<ChecklistReport> {
        let records = self.ledger.snapshot();
        let generated_at = self.env.clock.now();
        let snapshot_id = compute_snapshot_id(&records, generated_at)?;
        let results = checklist_report(&records);
        tracing::info!(
            snapshot_id = %snapshot_id,
            record_count = records.len(),
            passed = results.iter().filter(|result| result.passed).count(),
            "evaluated checklist"
        );

        Ok(ChecklistReport { snapshot_id, generated_at, record_count: records.len(), results })
    }
}

/// Read a JSON array of records, as served by `GET /records`.
///
/// # Errors
/// Returns an error when the file cannot be read or does not hold a record array.
pub fn read_ledger_dump(path: &Path) -> Result<Vec<Record>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ledger dump {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse ledger dump {}", path.display()))
}

fn trace_record(kind: RecordKind, output: &impl StatusCoded) {
    tracing::info!(record_type = kind.as_str(), status_code = output.status_code(), "recorded");
}

fn compute_snapshot_id(records: &[Record], generated_at: OffsetDateTime) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(generated_at.unix_timestamp().to_string().as_bytes());
    for record in records {
        let encoded = serde_json::to_vec(record).context("failed to encode record for hashing")?;
        hasher.update(&encoded);
    }

    let digest = hasher.finalize();
    let digest_hex = format!("{digest:x}");
    Ok(format!("chk_{}", &digest_hex[..16]))
}
