use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pn_mock_api::{read_ledger_dump, MockApi, MockConfig};
use pn_mock_core::{
    compute_snapshot, make_progress_response, resolve_payment_attachment, AuthorizationGate,
    Authorized, DomainEnv, GetPaymentNotificationMetadataInput, ProjectionMiss, Record,
    RecordKind, Unauthorized, PAGOPA_ATTACHMENT,
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pnm")]
#[command(about = "Inspect a PN mock ledger dump offline")]
struct Cli {
    /// JSON array of records, as returned by `GET /records`.
    #[arg(long)]
    ledger: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Records(RecordsArgs),
    Snapshot,
    Progress(ProgressArgs),
    Checklist,
    PaymentMetadata(PaymentMetadataArgs),
}

#[derive(Debug, Args)]
struct RecordsArgs {
    #[arg(long = "type")]
    record_type: Option<String>,
}

#[derive(Debug, Args)]
struct ProgressArgs {
    /// RFC 3339 timestamp stamped on every event; defaults to now.
    #[arg(long)]
    at: Option<String>,
}

#[derive(Debug, Args)]
struct PaymentMetadataArgs {
    #[arg(long)]
    iun: String,
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    recipient_id: i64,
    #[arg(long, default_value = PAGOPA_ATTACHMENT)]
    attachment_name: String,
}

/// Offline inspection never has a caller key to check.
#[derive(Debug)]
struct LocalGate;

impl AuthorizationGate for LocalGate {
    fn authorize(&self, _api_key: &str) -> Result<Authorized, Unauthorized> {
        Ok(Authorized)
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MockConfig::load(path)?,
        None => MockConfig::default(),
    };
    let mut env = config.domain_env().context("invalid mock configuration")?;
    env.gate = Arc::new(LocalGate);

    let records = read_ledger_dump(&cli.ledger)?;
    tracing::info!(
        ledger = %cli.ledger.display(),
        record_count = records.len(),
        "loaded ledger dump"
    );

    match cli.command {
        Command::Records(args) => run_records(&args, records),
        Command::Snapshot => run_snapshot(&records),
        Command::Progress(args) => run_progress(&args, &env, &records),
        Command::Checklist => run_checklist(env, records),
        Command::PaymentMetadata(args) => run_payment_metadata(args, &env, &records),
    }
}

fn run_records(args: &RecordsArgs, records: Vec<Record>) -> Result<()> {
    let records = match args.record_type.as_deref() {
        None => records,
        Some(value) => {
            let kind = RecordKind::parse(value)
                .with_context(|| format!("unknown record type: {value}"))?;
            records.into_iter().filter(|record| record.kind() == kind).collect()
        }
    };
    emit_json(serde_json::json!({ "records": records }))
}

fn run_snapshot(records: &[Record]) -> Result<()> {
    let mut confirmed = Vec::new();
    let mut pending = Vec::new();
    let mut malformed = Vec::new();
    for entry in compute_snapshot(records) {
        match entry {
            Ok(notification) => confirmed.push(serde_json::to_value(notification)?),
            Err(ProjectionMiss::Pending(request)) => pending.push(serde_json::to_value(request)?),
            Err(miss @ ProjectionMiss::Malformed { .. }) => {
                malformed.push(serde_json::to_value(miss)?);
            }
        }
    }

    emit_json(serde_json::json!({
        "confirmed": confirmed,
        "pending": pending,
        "malformed": malformed,
    }))
}

fn run_progress(args: &ProgressArgs, env: &DomainEnv, records: &[Record]) -> Result<()> {
    let timestamp = match args.at.as_deref() {
        Some(value) => parse_rfc3339(value)?,
        None => env.clock.now(),
    };
    let events = make_progress_response(timestamp, &compute_snapshot(records));
    emit_json(serde_json::json!({ "events": events }))
}

fn run_checklist(env: DomainEnv, records: Vec<Record>) -> Result<()> {
    let report = MockApi::with_records(env, records).checklist_result()?;
    emit_json(serde_json::to_value(report)?)
}

fn run_payment_metadata(
    args: PaymentMetadataArgs,
    env: &DomainEnv,
    records: &[Record],
) -> Result<()> {
    let input = GetPaymentNotificationMetadataInput {
        api_key: String::new(),
        iun: args.iun,
        recipient_id: args.recipient_id,
        attachment_name: args.attachment_name,
    };
    let output = resolve_payment_attachment(env, &input, records);
    emit_json(serde_json::to_value(output)?)
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
