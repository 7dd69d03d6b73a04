use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::model::{
    NewNotificationRequest, NewNotificationRequestStatusResponse, NewNotificationResponse,
    NotificationAttachmentDownloadMetadataResponse, PreLoadRequest, PreLoadResponse, Problem,
    ProgressResponseElement, StreamCreationRequest, StreamMetadataResponse,
    UnauthorizedMessageBody,
};

/// Status code carried by a recorded output.
pub trait StatusCoded {
    fn status_code(&self) -> u16;

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputRef<'a, T: Serialize> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    returned: Option<&'a T>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusCodeRepr {
    Number(u16),
    // Dumps written before status codes were numeric.
    Text(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutput {
    status_code: StatusCodeRepr,
    #[serde(default)]
    returned: serde_json::Value,
}

impl RawOutput {
    fn status_code<E: de::Error>(&self) -> Result<u16, E> {
        match &self.status_code {
            StatusCodeRepr::Number(code) => Ok(*code),
            StatusCodeRepr::Text(text) => text
                .parse()
                .map_err(|_| E::custom(format!("statusCode is not a number: {text}"))),
        }
    }

    fn returned<T: DeserializeOwned, E: de::Error>(self) -> Result<T, E> {
        serde_json::from_value(self.returned).map_err(E::custom)
    }
}

fn unexpected_status<E: de::Error>(output: &str, status_code: u16) -> E {
    E::custom(format!("unexpected statusCode {status_code} for {output}"))
}

/// Outputs are written as `{"statusCode": <number>, "returned": <body>}`.
macro_rules! status_coded_output {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($code:literal => $variant:ident($payload:ty),)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Eq, PartialEq)]
        pub enum $name {
            $($variant($payload),)+
        }

        impl StatusCoded for $name {
            fn status_code(&self) -> u16 {
                match self {
                    $(Self::$variant(_) => $code,)+
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self {
                    $(Self::$variant(returned) => {
                        OutputRef { status_code: $code, returned: Some(returned) }
                            .serialize(serializer)
                    })+
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = RawOutput::deserialize(deserializer)?;
                match raw.status_code::<D::Error>()? {
                    $($code => raw.returned().map(Self::$variant),)+
                    other => Err(unexpected_status(stringify!($name), other)),
                }
            }
        }
    };
}

status_coded_output! {
    pub enum PreLoadOutput {
        200 => Ok(Vec<PreLoadResponse>),
        400 => BadRequest(Problem),
        401 => MissingApiKey(UnauthorizedMessageBody),
        403 => Unauthorized(UnauthorizedMessageBody),
    }
}

status_coded_output! {
    pub enum NewNotificationOutput {
        202 => Accepted(NewNotificationResponse),
        403 => Unauthorized(UnauthorizedMessageBody),
    }
}

status_coded_output! {
    pub enum CheckNotificationStatusOutput {
        200 => Ok(NewNotificationRequestStatusResponse),
        403 => Unauthorized(UnauthorizedMessageBody),
        404 => NotFound(Problem),
    }
}

status_coded_output! {
    pub enum CreateEventStreamOutput {
        200 => Ok(StreamMetadataResponse),
        403 => Unauthorized(UnauthorizedMessageBody),
    }
}

/// A 419 carries no body.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConsumeEventStreamOutput {
    Ok(Vec<ProgressResponseElement>),
    Unauthorized(UnauthorizedMessageBody),
    TooManyRequests,
}

impl StatusCoded for ConsumeEventStreamOutput {
    fn status_code(&self) -> u16 {
        match self {
            Self::Ok(_) => 200,
            Self::Unauthorized(_) => 403,
            Self::TooManyRequests => 419,
        }
    }
}

impl Serialize for ConsumeEventStreamOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let status_code = self.status_code();
        match self {
            Self::Ok(events) => {
                OutputRef { status_code, returned: Some(events) }.serialize(serializer)
            }
            Self::Unauthorized(body) => {
                OutputRef { status_code, returned: Some(body) }.serialize(serializer)
            }
            Self::TooManyRequests => {
                OutputRef::<()> { status_code, returned: None }.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for ConsumeEventStreamOutput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawOutput::deserialize(deserializer)?;
        match raw.status_code::<D::Error>()? {
            200 => raw.returned().map(Self::Ok),
            403 => raw.returned().map(Self::Unauthorized),
            419 => Ok(Self::TooManyRequests),
            other => Err(unexpected_status("ConsumeEventStreamOutput", other)),
        }
    }
}

status_coded_output! {
    pub enum GetPaymentNotificationMetadataOutput {
        200 => Ok(NotificationAttachmentDownloadMetadataResponse),
        403 => Unauthorized(UnauthorizedMessageBody),
        404 => NotFound(Problem),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreLoadInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub body: Vec<PreLoadRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNotificationInput {
    pub api_key: String,
    pub body: NewNotificationRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckNotificationStatusInput {
    pub api_key: String,
    pub notification_request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventStreamInput {
    pub api_key: String,
    pub body: StreamCreationRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeEventStreamInput {
    pub api_key: String,
    pub stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GetPaymentNotificationMetadataInput {
    pub api_key: String,
    pub iun: String,
    pub recipient_id: i64,
    pub attachment_name: String,
}

macro_rules! record_struct {
    ($name:ident, $input:ty, $output:ty) => {
        #[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            pub input: $input,
            pub output: $output,
            #[serde(with = "time::serde::rfc3339")]
            pub logged_at: OffsetDateTime,
        }
    };
}

record_struct!(PreLoadRecord, PreLoadInput, PreLoadOutput);
record_struct!(NewNotificationRecord, NewNotificationInput, NewNotificationOutput);
record_struct!(
    CheckNotificationStatusRecord,
    CheckNotificationStatusInput,
    CheckNotificationStatusOutput
);
record_struct!(CreateEventStreamRecord, CreateEventStreamInput, CreateEventStreamOutput);
record_struct!(ConsumeEventStreamRecord, ConsumeEventStreamInput, ConsumeEventStreamOutput);
record_struct!(
    GetPaymentNotificationMetadataRecord,
    GetPaymentNotificationMetadataInput,
    GetPaymentNotificationMetadataOutput
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordKind {
    PreLoadRecord,
    NewNotificationRecord,
    CheckNotificationStatusRecord,
    CreateEventStreamRecord,
    ConsumeEventStreamRecord,
    GetPaymentNotificationMetadataRecord,
}

impl RecordKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreLoadRecord => "PreLoadRecord",
            Self::NewNotificationRecord => "NewNotificationRecord",
            Self::CheckNotificationStatusRecord => "CheckNotificationStatusRecord",
            Self::CreateEventStreamRecord => "CreateEventStreamRecord",
            Self::ConsumeEventStreamRecord => "ConsumeEventStreamRecord",
            Self::GetPaymentNotificationMetadataRecord => "GetPaymentNotificationMetadataRecord",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PreLoadRecord" => Some(Self::PreLoadRecord),
            "NewNotificationRecord" => Some(Self::NewNotificationRecord),
            "CheckNotificationStatusRecord" => Some(Self::CheckNotificationStatusRecord),
            "CreateEventStreamRecord" => Some(Self::CreateEventStreamRecord),
            "ConsumeEventStreamRecord" => Some(Self::ConsumeEventStreamRecord),
            "GetPaymentNotificationMetadataRecord" => {
                Some(Self::GetPaymentNotificationMetadataRecord)
            }
            _ => None,
        }
    }
}

/// One logged interaction: the request input and the output the mock produced for it.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Record {
    #[serde(rename = "PreLoadRecord")]
    PreLoad(PreLoadRecord),
    #[serde(rename = "NewNotificationRecord")]
    NewNotification(NewNotificationRecord),
    #[serde(rename = "CheckNotificationStatusRecord")]
    CheckNotificationStatus(CheckNotificationStatusRecord),
    #[serde(rename = "CreateEventStreamRecord")]
    CreateEventStream(CreateEventStreamRecord),
    #[serde(rename = "ConsumeEventStreamRecord")]
    ConsumeEventStream(ConsumeEventStreamRecord),
    #[serde(rename = "GetPaymentNotificationMetadataRecord")]
    GetPaymentNotificationMetadata(GetPaymentNotificationMetadataRecord),
}

impl Record {
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::PreLoad(_) => RecordKind::PreLoadRecord,
            Self::NewNotification(_) => RecordKind::NewNotificationRecord,
            Self::CheckNotificationStatus(_) => RecordKind::CheckNotificationStatusRecord,
            Self::CreateEventStream(_) => RecordKind::CreateEventStreamRecord,
            Self::ConsumeEventStream(_) => RecordKind::ConsumeEventStreamRecord,
            Self::GetPaymentNotificationMetadata(_) => {
                RecordKind::GetPaymentNotificationMetadataRecord
            }
        }
    }

    #[must_use]
    pub fn logged_at(&self) -> OffsetDateTime {
        match self {
            Self::PreLoad(record) => record.logged_at,
            Self::NewNotification(record) => record.logged_at,
            Self::CheckNotificationStatus(record) => record.logged_at,
            Self::CreateEventStream(record) => record.logged_at,
            Self::ConsumeEventStream(record) => record.logged_at,
            Self::GetPaymentNotificationMetadata(record) => record.logged_at,
        }
    }

    #[must_use]
    pub fn as_preload(&self) -> Option<&PreLoadRecord> {
        match self {
            Self::PreLoad(record) => Some(record),
            Self::NewNotification(_)
            | Self::CheckNotificationStatus(_)
            | Self::CreateEventStream(_)
            | Self::ConsumeEventStream(_)
            | Self::GetPaymentNotificationMetadata(_) => None,
        }
    }
}

impl StatusCoded for Record {
    fn status_code(&self) -> u16 {
        match self {
            Self::PreLoad(record) => record.output.status_code(),
            Self::NewNotification(record) => record.output.status_code(),
            Self::CheckNotificationStatus(record) => record.output.status_code(),
            Self::CreateEventStream(record) => record.output.status_code(),
            Self::ConsumeEventStream(record) => record.output.status_code(),
            Self::GetPaymentNotificationMetadata(record) => record.output.status_code(),
        }
    }
}

macro_rules! into_record {
    ($record:ident, $variant:ident) => {
        impl From<$record> for Record {
            fn from(record: $record) -> Self {
                Self::$variant(record)
            }
        }
    };
}

into_record!(PreLoadRecord, PreLoad);
into_record!(NewNotificationRecord, NewNotification);
into_record!(CheckNotificationStatusRecord, CheckNotificationStatus);
into_record!(CreateEventStreamRecord, CreateEventStream);
into_record!(ConsumeEventStreamRecord, ConsumeEventStream);
into_record!(GetPaymentNotificationMetadataRecord, GetPaymentNotificationMetadata);

#[cfg(test)]
mod tests {
    use super::*;

    fn consume_record(output: ConsumeEventStreamOutput) -> Record {
        Record::ConsumeEventStream(ConsumeEventStreamRecord {
            input: ConsumeEventStreamInput {
                api_key: "key".to_string(),
                stream_id: "stream".to_string(),
                last_event_id: None,
            },
            output,
            logged_at: OffsetDateTime::UNIX_EPOCH,
        })
    }

    #[test]
    fn record_kind_round_trips_through_str() {
        for kind in [
            RecordKind::PreLoadRecord,
            RecordKind::NewNotificationRecord,
            RecordKind::CheckNotificationStatusRecord,
            RecordKind::CreateEventStreamRecord,
            RecordKind::ConsumeEventStreamRecord,
            RecordKind::GetPaymentNotificationMetadataRecord,
        ] {
            assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RecordKind::parse("UploadToS3Record"), None);
    }

    #[test]
    fn record_serializes_with_type_tag_and_status_branch() {
        let record = consume_record(ConsumeEventStreamOutput::TooManyRequests);
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(err) => panic!("record should serialize: {err}"),
        };

        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("ConsumeEventStreamRecord"));
        assert_eq!(
            value.get("output").and_then(|v| v.get("statusCode")).and_then(|v| v.as_u64()),
            Some(419)
        );
        assert!(value.get("output").and_then(|v| v.get("returned")).is_none());
        assert!(value.get("loggedAt").is_some());

        let decoded: Record = match serde_json::from_value(value) {
            Ok(decoded) => decoded,
            Err(err) => panic!("record should deserialize: {err}"),
        };
        assert_eq!(decoded, record);
    }

    #[test]
    fn success_is_limited_to_2xx_outputs() {
        assert!(consume_record(ConsumeEventStreamOutput::Ok(Vec::new())).is_success());
        assert!(!consume_record(ConsumeEventStreamOutput::TooManyRequests).is_success());
        assert!(!consume_record(ConsumeEventStreamOutput::Unauthorized(
            UnauthorizedMessageBody { message: "Forbidden".to_string() }
        ))
        .is_success());
    }

    #[test]
    fn status_codes_are_written_as_numbers() {
        let output = GetPaymentNotificationMetadataOutput::NotFound(Problem::not_found("X"));
        let value = match serde_json::to_value(&output) {
            Ok(value) => value,
            Err(err) => panic!("output should serialize: {err}"),
        };
        assert_eq!(value.get("statusCode"), Some(&serde_json::json!(404)));
        assert_eq!(
            value.get("returned").and_then(|v| v.get("status")),
            Some(&serde_json::json!(404))
        );
    }

    #[test]
    fn legacy_string_status_codes_still_load() {
        let value = serde_json::json!({
            "statusCode": "401",
            "returned": { "message": "Unauthorized" }
        });
        match serde_json::from_value::<PreLoadOutput>(value) {
            Ok(PreLoadOutput::MissingApiKey(body)) => assert_eq!(body.message, "Unauthorized"),
            Ok(other) => panic!("expected 401 output, got {other:?}"),
            Err(err) => panic!("legacy output should deserialize: {err}"),
        }
    }

    #[test]
    fn status_code_outside_the_output_is_rejected() {
        let value = serde_json::json!({ "statusCode": 500, "returned": {} });
        assert!(serde_json::from_value::<NewNotificationOutput>(value).is_err());

        let value = serde_json::json!({ "statusCode": "ok" });
        assert!(serde_json::from_value::<ConsumeEventStreamOutput>(value).is_err());
    }
}
