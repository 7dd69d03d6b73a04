use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProblemError {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Structured error payload returned alongside a non-success status code.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub status: u16,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: Vec<ProblemError>,
}

impl Problem {
    /// Generic problem for a bare status code, with no domain error codes attached.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        Self { status, title: status_title(status).to_string(), detail: None, errors: Vec::new() }
    }

    #[must_use]
    pub fn with_code(status: u16, code: &str, detail: &str) -> Self {
        Self {
            status,
            title: status_title(status).to_string(),
            detail: Some(detail.to_string()),
            errors: vec![ProblemError {
                code: code.to_string(),
                element: None,
                detail: Some(detail.to_string()),
            }],
        }
    }

    #[must_use]
    pub fn not_found(code: &str) -> Self {
        Self::with_code(404, code, "resource not found")
    }
}

fn status_title(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        419 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unexpected Error",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UnauthorizedMessageBody {
    pub message: String,
}

impl UnauthorizedMessageBody {
    #[must_use]
    pub fn missing_api_key() -> Self {
        Self { message: "Unauthorized".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Digests {
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub key: String,
    pub version_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPaymentAttachment {
    pub digests: Digests,
    pub content_type: String,
    #[serde(rename = "ref")]
    pub reference: AttachmentRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDocument {
    pub digests: Digests,
    pub content_type: String,
    #[serde(rename = "ref")]
    pub reference: AttachmentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PagoPaPayment {
    pub notice_code: String,
    pub creditor_tax_id: String,
    pub apply_cost: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<NotificationPaymentAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct F24Payment {
    pub title: String,
    pub apply_cost: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_attachment: Option<NotificationPaymentAttachment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPaymentItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pago_pa: Option<PagoPaPayment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f24: Option<F24Payment>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum RecipientType {
    #[serde(rename = "PF")]
    NaturalPerson,
    #[serde(rename = "PG")]
    LegalPerson,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecipient {
    pub recipient_type: RecipientType,
    pub tax_id: String,
    pub denomination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payments: Option<Vec<NotificationPaymentItem>>,
}

/// Submission payload of a new notification, as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNotificationRequest {
    pub pa_protocol_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotence_token: Option<String>,
    pub subject: String,
    pub recipients: Vec<NotificationRecipient>,
    #[serde(default)]
    pub documents: Vec<NotificationDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNotificationResponse {
    pub notification_request_id: String,
    pub pa_protocol_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotence_token: Option<String>,
}

/// A submitted notification that has not been confirmed yet.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub notification_request_id: String,
    #[serde(flatten)]
    pub payload: NewNotificationRequest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Accepted,
}

/// A confirmed notification: the originating request plus its IUN.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(flatten)]
    pub request: NotificationRequest,
    pub iun: String,
    pub notification_status: NotificationStatus,
}

impl Notification {
    #[must_use]
    pub fn accepted(request: NotificationRequest, iun: &str) -> Self {
        Self { request, iun: iun.to_string(), notification_status: NotificationStatus::Accepted }
    }

    #[must_use]
    pub fn recipients(&self) -> &[NotificationRecipient] {
        &self.request.payload.recipients
    }

    #[must_use]
    pub fn notification_request_id(&self) -> &str {
        &self.request.notification_request_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationRequestStatus {
    Waiting,
    Accepted,
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNotificationRequestStatusResponse {
    pub notification_request_id: String,
    pub notification_request_status: NotificationRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iun: Option<String>,
    pub pa_protocol_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotence_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponseElement {
    pub event_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub notification_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iun: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<NotificationStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamCreationRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadataResponse {
    pub stream_id: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub activation_date: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreLoadRequest {
    pub preload_idx: String,
    pub content_type: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Put,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreLoadResponse {
    pub preload_idx: String,
    pub secret: String,
    pub http_method: HttpMethod,
    pub url: String,
    pub key: String,
}

/// Returns true when no two items of a preload body share a `preloadIdx`.
#[must_use]
pub fn preload_indices_are_unique(body: &[PreLoadRequest]) -> bool {
    let unique = body.iter().map(|item| item.preload_idx.as_str()).collect::<BTreeSet<_>>();
    unique.len() == body.len()
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAttachmentDownloadMetadataResponse {
    pub filename: String,
    pub content_type: String,
    pub content_length: u64,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}
