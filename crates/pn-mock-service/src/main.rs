use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use pn_mock_api::{ChecklistReport, MockApi, MockConfig, API_CONTRACT_VERSION};
use pn_mock_core::{
    CheckNotificationStatusInput, CheckNotificationStatusOutput, ConsumeEventStreamInput,
    ConsumeEventStreamOutput, CreateEventStreamInput, CreateEventStreamOutput,
    GetPaymentNotificationMetadataInput, GetPaymentNotificationMetadataOutput,
    NewNotificationInput, NewNotificationOutput, NewNotificationRequest, PreLoadInput,
    PreLoadOutput, PreLoadRequest, Problem, RecordKind, StatusCoded, StreamCreationRequest,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
struct ServiceState {
    api: MockApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordsQuery {
    #[serde(rename = "type")]
    record_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationStatusQuery {
    notification_request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEventsQuery {
    last_event_id: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "pn-mock-service")]
#[command(about = "Local HTTP mock of the PN delivery and progress APIs")]
struct Args {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    /// Accepted API key. Repeat to accept several; replaces the keys from the config file.
    #[arg(long = "api-key")]
    api_keys: Vec<String>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(status: StatusCode, message: impl Into<String>) -> ServiceError {
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn http_status(status_code: u16) -> StatusCode {
    StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn reply<T: Serialize>(status_code: u16, body: T) -> Response {
    (http_status(status_code), Json(body)).into_response()
}

/// Maps a recorded output onto its HTTP status and payload.
trait IntoHttp: StatusCoded {
    fn into_http(self) -> Response;
}

impl IntoHttp for PreLoadOutput {
    fn into_http(self) -> Response {
        let status_code = self.status_code();
        match self {
            Self::Ok(slots) => reply(status_code, slots),
            Self::BadRequest(problem) => reply(status_code, problem),
            Self::MissingApiKey(body) | Self::Unauthorized(body) => reply(status_code, body),
        }
    }
}

impl IntoHttp for NewNotificationOutput {
    fn into_http(self) -> Response {
        let status_code = self.status_code();
        match self {
            Self::Accepted(response) => reply(status_code, response),
            Self::Unauthorized(body) => reply(status_code, body),
        }
    }
}

impl IntoHttp for CheckNotificationStatusOutput {
    fn into_http(self) -> Response {
        let status_code = self.status_code();
        match self {
            Self::Ok(status) => reply(status_code, status),
            Self::Unauthorized(body) => reply(status_code, body),
            Self::NotFound(problem) => reply(status_code, problem),
        }
    }
}

impl IntoHttp for CreateEventStreamOutput {
    fn into_http(self) -> Response {
        let status_code = self.status_code();
        match self {
            Self::Ok(stream) => reply(status_code, stream),
            Self::Unauthorized(body) => reply(status_code, body),
        }
    }
}

impl IntoHttp for ConsumeEventStreamOutput {
    fn into_http(self) -> Response {
        let status_code = self.status_code();
        match self {
            Self::Ok(events) => reply(status_code, events),
            Self::Unauthorized(body) => reply(status_code, body),
            Self::TooManyRequests => http_status(status_code).into_response(),
        }
    }
}

impl IntoHttp for GetPaymentNotificationMetadataOutput {
    fn into_http(self) -> Response {
        let status_code = self.status_code();
        match self {
            Self::Ok(metadata) => reply(status_code, metadata),
            Self::Unauthorized(body) => reply(status_code, body),
            Self::NotFound(problem) => reply(status_code, problem),
        }
    }
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers.get(API_KEY_HEADER).and_then(|value| value.to_str().ok()).map(str::to_string)
}

// Routes other than preload treat a missing key as an empty one, which the gate rejects.
fn api_key_or_empty(headers: &HeaderMap) -> String {
    api_key(headers).unwrap_or_default()
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/records", get(records))
        .route("/checklistresult", get(checklist_result))
        .route("/delivery/attachments/preload", post(preload))
        .route("/delivery/v2.3/requests", post(new_notification).get(notification_status))
        .route("/delivery-progresses/v2.3/streams", post(create_event_stream))
        .route("/delivery-progresses/v2.3/streams/:stream_id/events", get(consume_event_stream))
        .route(
            "/delivery/notifications/sent/:iun/attachments/payment/:recipient_idx/:attachment_name",
            get(payment_notification_metadata),
        )
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MockConfig::load(path)?,
        None => MockConfig::default(),
    };
    if !args.api_keys.is_empty() {
        config.api_keys = args.api_keys;
        config.validate()?;
    }
    if config.api_keys.is_empty() {
        tracing::warn!("no api keys configured; every authenticated request will be rejected");
    }

    let state = ServiceState { api: MockApi::from_config(&config)? };
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(
        bind = %args.bind,
        api_keys = config.api_keys.len(),
        "pn mock service listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn records(
    State(state): State<ServiceState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<ServiceEnvelope<Vec<pn_mock_core::Record>>>, ServiceError> {
    let kind = match query.record_type.as_deref() {
        None => None,
        Some(value) => Some(RecordKind::parse(value).ok_or_else(|| {
            ServiceState::error(StatusCode::BAD_REQUEST, format!("unknown record type: {value}"))
        })?),
    };
    Ok(Json(envelope(state.api.records(kind))))
}

async fn checklist_result(State(state): State<ServiceState>) -> Response {
    checklist_reply(state.api.checklist_result())
}

fn checklist_reply(report: Result<ChecklistReport>) -> Response {
    match report {
        Ok(report) => Json(envelope(report)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "checklist evaluation failed");
            reply(500, Problem::from_status(500))
        }
    }
}

async fn preload(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<Vec<PreLoadRequest>>,
) -> Response {
    state.api.preload(PreLoadInput { api_key: api_key(&headers), body }).output.into_http()
}

async fn new_notification(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<NewNotificationRequest>,
) -> Response {
    state
        .api
        .new_notification(NewNotificationInput { api_key: api_key_or_empty(&headers), body })
        .output
        .into_http()
}

async fn notification_status(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<NotificationStatusQuery>,
) -> Response {
    state
        .api
        .check_notification_status(CheckNotificationStatusInput {
            api_key: api_key_or_empty(&headers),
            notification_request_id: query.notification_request_id,
        })
        .output
        .into_http()
}

async fn create_event_stream(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<StreamCreationRequest>,
) -> Response {
    state
        .api
        .create_event_stream(CreateEventStreamInput { api_key: api_key_or_empty(&headers), body })
        .output
        .into_http()
}

async fn consume_event_stream(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(stream_id): Path<String>,
    Query(query): Query<StreamEventsQuery>,
) -> Response {
    state
        .api
        .consume_event_stream(ConsumeEventStreamInput {
            api_key: api_key_or_empty(&headers),
            stream_id,
            last_event_id: query.last_event_id,
        })
        .output
        .into_http()
}

async fn payment_notification_metadata(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path((iun, recipient_id, attachment_name)): Path<(String, i64, String)>,
) -> Response {
    state
        .api
        .payment_notification_metadata(GetPaymentNotificationMetadataInput {
            api_key: api_key_or_empty(&headers),
            iun,
            recipient_id,
            attachment_name,
        })
        .output
        .into_http()
}
