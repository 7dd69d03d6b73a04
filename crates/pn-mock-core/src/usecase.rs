use crate::env::{format_iun, DomainEnv};
use crate::model::{
    preload_indices_are_unique, HttpMethod, NewNotificationRequestStatusResponse,
    NewNotificationResponse, NotificationRequestStatus, PreLoadResponse, Problem,
    StreamMetadataResponse, UnauthorizedMessageBody,
};
use crate::record::{
    CheckNotificationStatusInput, CheckNotificationStatusOutput, CheckNotificationStatusRecord,
    ConsumeEventStreamInput, ConsumeEventStreamOutput, ConsumeEventStreamRecord,
    CreateEventStreamInput, CreateEventStreamOutput, CreateEventStreamRecord,
    NewNotificationInput, NewNotificationOutput, NewNotificationRecord, PreLoadInput,
    PreLoadOutput, PreLoadRecord, Record, StatusCoded,
};
use crate::snapshot::{compute_snapshot, make_progress_response, ProjectionMiss};

pub const DUPLICATE_PRELOAD_IDX: &str = "PN_DELIVERY_DUPLICATEPRELOADIDX";
pub const NOTIFICATION_REQUEST_NOT_FOUND: &str = "PN_DELIVERY_NOTIFICATIONREQUESTNOTFOUND";

#[must_use]
pub fn make_preload_record(env: &DomainEnv, input: PreLoadInput) -> PreLoadRecord {
    let output = match input.api_key.as_deref() {
        None => PreLoadOutput::MissingApiKey(UnauthorizedMessageBody::missing_api_key()),
        Some(api_key) => match env.gate.authorize(api_key) {
            Err(unauthorized) => PreLoadOutput::Unauthorized(unauthorized.into()),
            Ok(_) if !preload_indices_are_unique(&input.body) => {
                PreLoadOutput::BadRequest(Problem::with_code(
                    400,
                    DUPLICATE_PRELOAD_IDX,
                    "preloadIdx values must be unique within the request body",
                ))
            }
            Ok(_) => PreLoadOutput::Ok(
                input
                    .body
                    .iter()
                    .map(|item| PreLoadResponse {
                        preload_idx: item.preload_idx.clone(),
                        secret: env.ids.next_id(),
                        http_method: HttpMethod::Put,
                        url: env.upload_to_s3_url.clone(),
                        key: format!("PN_NOTIFICATION_ATTACHMENTS-{}.pdf", env.ids.next_id()),
                    })
                    .collect(),
            ),
        },
    };

    PreLoadRecord { input, output, logged_at: env.clock.now() }
}

#[must_use]
pub fn make_new_notification_record(
    env: &DomainEnv,
    input: NewNotificationInput,
) -> NewNotificationRecord {
    let output = match env.gate.authorize(&input.api_key) {
        Err(unauthorized) => NewNotificationOutput::Unauthorized(unauthorized.into()),
        Ok(_) => NewNotificationOutput::Accepted(NewNotificationResponse {
            notification_request_id: env.ids.next_id(),
            pa_protocol_number: input.body.pa_protocol_number.clone(),
            idempotence_token: input.body.idempotence_token.clone(),
        }),
    };

    NewNotificationRecord { input, output, logged_at: env.clock.now() }
}

/// Report the status of a submitted notification, assigning an IUN on the first check.
#[must_use]
pub fn make_check_notification_status_record(
    env: &DomainEnv,
    input: CheckNotificationStatusInput,
    records: &[Record],
) -> CheckNotificationStatusRecord {
    let now = env.clock.now();
    let output = match env.gate.authorize(&input.api_key) {
        Err(unauthorized) => CheckNotificationStatusOutput::Unauthorized(unauthorized.into()),
        Ok(_) => compute_snapshot(records)
            .into_iter()
            .find_map(|entry| match entry {
                Ok(notification)
                    if notification.notification_request_id() == input.notification_request_id =>
                {
                    let iun = notification.iun;
                    Some((notification.request, iun))
                }
                Err(ProjectionMiss::Pending(request))
                    if request.notification_request_id == input.notification_request_id =>
                {
                    let iun = format_iun(&env.ids.next_id(), now);
                    Some((request, iun))
                }
                Ok(_) | Err(_) => None,
            })
            .map_or_else(
                || {
                    CheckNotificationStatusOutput::NotFound(Problem::not_found(
                        NOTIFICATION_REQUEST_NOT_FOUND,
                    ))
                },
                |(request, iun)| {
                    CheckNotificationStatusOutput::Ok(NewNotificationRequestStatusResponse {
                        notification_request_id: request.notification_request_id,
                        notification_request_status: NotificationRequestStatus::Accepted,
                        iun: Some(iun),
                        pa_protocol_number: request.payload.pa_protocol_number,
                        idempotence_token: request.payload.idempotence_token,
                    })
                },
            ),
    };

    CheckNotificationStatusRecord { input, output, logged_at: now }
}

#[must_use]
pub fn make_create_event_stream_record(
    env: &DomainEnv,
    input: CreateEventStreamInput,
) -> CreateEventStreamRecord {
    let now = env.clock.now();
    let output = match env.gate.authorize(&input.api_key) {
        Err(unauthorized) => CreateEventStreamOutput::Unauthorized(unauthorized.into()),
        Ok(_) => CreateEventStreamOutput::Ok(StreamMetadataResponse {
            stream_id: env.ids.next_id(),
            title: input.body.title.clone(),
            activation_date: now,
        }),
    };

    CreateEventStreamRecord { input, output, logged_at: now }
}

/// Progress events for every projected notification, or 419 when the stream is polled again
/// before `env.consume_retry_after` has elapsed.
#[must_use]
pub fn make_consume_event_stream_record(
    env: &DomainEnv,
    input: ConsumeEventStreamInput,
    records: &[Record],
) -> ConsumeEventStreamRecord {
    let now = env.clock.now();
    let output = match env.gate.authorize(&input.api_key) {
        Err(unauthorized) => ConsumeEventStreamOutput::Unauthorized(unauthorized.into()),
        Ok(_) if is_throttled(env, &input.stream_id, records, now) => {
            ConsumeEventStreamOutput::TooManyRequests
        }
        Ok(_) => ConsumeEventStreamOutput::Ok(make_progress_response(
            now,
            &compute_snapshot(records),
        )),
    };

    ConsumeEventStreamRecord { input, output, logged_at: now }
}

fn is_throttled(
    env: &DomainEnv,
    stream_id: &str,
    records: &[Record],
    now: time::OffsetDateTime,
) -> bool {
    if !env.consume_retry_after.is_positive() {
        return false;
    }

    records
        .iter()
        .rev()
        .find_map(|record| match record {
            Record::ConsumeEventStream(record)
                if record.input.stream_id == stream_id && record.output.is_success() =>
            {
                Some(record.logged_at)
            }
            Record::PreLoad(_)
            | Record::NewNotification(_)
            | Record::CheckNotificationStatus(_)
            | Record::CreateEventStream(_)
            | Record::ConsumeEventStream(_)
            | Record::GetPaymentNotificationMetadata(_) => None,
        })
        .is_some_and(|last_consumed| now - last_consumed < env.consume_retry_after)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::env::{FixedClock, SequentialIdGenerator, StaticKeyGate};
    use crate::model::{NewNotificationRequest, PreLoadRequest, StreamCreationRequest};

    const API_KEY: &str = "valid-key";

    fn fixture_time() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000)
    }

    fn env_with_clock(clock: Arc<FixedClock>) -> DomainEnv {
        match DomainEnv::new(
            Arc::new(StaticKeyGate::new([API_KEY])),
            "http://localhost:3000/upload",
            "http://localhost:3000/download",
        ) {
            Ok(env) => env.with_clock(clock).with_ids(Arc::new(SequentialIdGenerator::default())),
            Err(err) => panic!("fixture env should build: {err}"),
        }
    }

    fn env() -> DomainEnv {
        env_with_clock(Arc::new(FixedClock::new(fixture_time())))
    }

    fn preload_item(idx: &str) -> PreLoadRequest {
        PreLoadRequest {
            preload_idx: idx.to_string(),
            content_type: "application/pdf".to_string(),
            sha256: "jezIVxlG1M1woCSUngM6KipUN3/p8cG5RMIPnuEanlE=".to_string(),
        }
    }

    fn new_notification(api_key: &str) -> NewNotificationInput {
        NewNotificationInput {
            api_key: api_key.to_string(),
            body: NewNotificationRequest {
                pa_protocol_number: "proto-1".to_string(),
                idempotence_token: Some("token-1".to_string()),
                subject: "Payment notice".to_string(),
                recipients: Vec::new(),
                documents: Vec::new(),
            },
        }
    }

    fn check_status(request_id: &str) -> CheckNotificationStatusInput {
        CheckNotificationStatusInput {
            api_key: API_KEY.to_string(),
            notification_request_id: request_id.to_string(),
        }
    }

    fn consume(stream_id: &str) -> ConsumeEventStreamInput {
        ConsumeEventStreamInput {
            api_key: API_KEY.to_string(),
            stream_id: stream_id.to_string(),
            last_event_id: None,
        }
    }

    fn accepted_request_id(record: &NewNotificationRecord) -> String {
        match &record.output {
            NewNotificationOutput::Accepted(response) => response.notification_request_id.clone(),
            other => panic!("expected 202 output, got {other:?}"),
        }
    }

    fn assigned_iun(record: &CheckNotificationStatusRecord) -> String {
        match &record.output {
            CheckNotificationStatusOutput::Ok(status) => {
                status.iun.clone().unwrap_or_else(|| panic!("status should carry an iun"))
            }
            other => panic!("expected 200 output, got {other:?}"),
        }
    }

    #[test]
    fn preload_without_api_key_is_401() {
        let record = make_preload_record(
            &env(),
            PreLoadInput { api_key: None, body: vec![preload_item("0")] },
        );
        assert_eq!(record.output.status_code(), 401);
    }

    #[test]
    fn preload_with_rejected_key_is_403() {
        let record = make_preload_record(
            &env(),
            PreLoadInput { api_key: Some("wrong".to_string()), body: vec![preload_item("0")] },
        );
        assert_eq!(record.output.status_code(), 403);
    }

    #[test]
    fn preload_with_duplicate_indices_is_400() {
        let record = make_preload_record(
            &env(),
            PreLoadInput {
                api_key: Some(API_KEY.to_string()),
                body: vec![preload_item("0"), preload_item("0")],
            },
        );
        match record.output {
            PreLoadOutput::BadRequest(problem) => {
                assert_eq!(problem.errors[0].code, DUPLICATE_PRELOAD_IDX);
            }
            other => panic!("expected 400 output, got {other:?}"),
        }
    }

    #[test]
    fn preload_returns_one_upload_slot_per_item() {
        let record = make_preload_record(
            &env(),
            PreLoadInput {
                api_key: Some(API_KEY.to_string()),
                body: vec![preload_item("0"), preload_item("1")],
            },
        );
        let slots = match record.output {
            PreLoadOutput::Ok(slots) => slots,
            other => panic!("expected 200 output, got {other:?}"),
        };
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].preload_idx, "0");
        assert_eq!(slots[1].preload_idx, "1");
        assert_eq!(slots[0].http_method, HttpMethod::Put);
        assert_eq!(slots[0].url, "http://localhost:3000/upload");
        assert!(slots[0].key.starts_with("PN_NOTIFICATION_ATTACHMENTS-"));
        assert_ne!(slots[0].key, slots[1].key);
        assert_eq!(record.logged_at, fixture_time());
    }

    #[test]
    fn new_notification_echoes_protocol_and_token() {
        let record = make_new_notification_record(&env(), new_notification(API_KEY));
        match &record.output {
            NewNotificationOutput::Accepted(response) => {
                assert!(!response.notification_request_id.is_empty());
                assert_eq!(response.pa_protocol_number, "proto-1");
                assert_eq!(response.idempotence_token.as_deref(), Some("token-1"));
            }
            other => panic!("expected 202 output, got {other:?}"),
        }

        let rejected = make_new_notification_record(&env(), new_notification("wrong"));
        assert_eq!(rejected.output.status_code(), 403);
    }

    #[test]
    fn status_check_assigns_iun_once_and_then_reuses_it() {
        let env = env();
        let mut records = Vec::new();
        let submitted = make_new_notification_record(&env, new_notification(API_KEY));
        let request_id = accepted_request_id(&submitted);
        records.push(Record::from(submitted));

        let first =
            make_check_notification_status_record(&env, check_status(&request_id), &records);
        let first_iun = assigned_iun(&first);
        assert!(first_iun.ends_with("-1"));
        records.push(Record::from(first));

        let second =
            make_check_notification_status_record(&env, check_status(&request_id), &records);
        assert_eq!(assigned_iun(&second), first_iun);
    }

    #[test]
    fn status_check_for_unknown_request_is_404() {
        let record = make_check_notification_status_record(&env(), check_status("missing"), &[]);
        match record.output {
            CheckNotificationStatusOutput::NotFound(problem) => {
                assert_eq!(problem.errors[0].code, NOTIFICATION_REQUEST_NOT_FOUND);
            }
            other => panic!("expected 404 output, got {other:?}"),
        }
    }

    #[test]
    fn create_stream_echoes_title_and_activation_date() {
        let record = make_create_event_stream_record(
            &env(),
            CreateEventStreamInput {
                api_key: API_KEY.to_string(),
                body: StreamCreationRequest { title: "progress".to_string() },
            },
        );
        match record.output {
            CreateEventStreamOutput::Ok(stream) => {
                assert_eq!(stream.title, "progress");
                assert_eq!(stream.activation_date, fixture_time());
            }
            other => panic!("expected 200 output, got {other:?}"),
        }
    }

    #[test]
    fn consume_reports_pending_and_confirmed_notifications() {
        let env = env();
        let mut records = Vec::new();
        for _ in 0..2 {
            let submitted = make_new_notification_record(&env, new_notification(API_KEY));
            records.push(Record::from(submitted));
        }
        let confirmed_id = match &records[1] {
            Record::NewNotification(record) => accepted_request_id(record),
            other => panic!("unexpected fixture: {other:?}"),
        };
        records.push(Record::from(make_check_notification_status_record(
            &env,
            check_status(&confirmed_id),
            &records,
        )));

        let record = make_consume_event_stream_record(&env, consume("stream-1"), &records);
        let events = match record.output {
            ConsumeEventStreamOutput::Ok(events) => events,
            other => panic!("expected 200 output, got {other:?}"),
        };
        assert_eq!(events.len(), 2);
        assert!(events[0].iun.is_none());
        assert!(events[1].iun.is_some());
        assert!(events
            .iter()
            .all(|event| event.event_id == "0" && event.timestamp == fixture_time()));
    }

    #[test]
    fn consume_within_retry_window_is_419() {
        let clock = Arc::new(FixedClock::new(fixture_time()));
        let env =
            env_with_clock(Arc::clone(&clock)).with_consume_retry_after(Duration::seconds(10));
        let mut records = vec![Record::from(make_consume_event_stream_record(
            &env,
            consume("stream-1"),
            &[],
        ))];

        clock.advance(Duration::seconds(3));
        let throttled = make_consume_event_stream_record(&env, consume("stream-1"), &records);
        assert_eq!(throttled.output, ConsumeEventStreamOutput::TooManyRequests);

        let other_stream = make_consume_event_stream_record(&env, consume("stream-2"), &records);
        assert_eq!(other_stream.output.status_code(), 200);

        records.push(Record::from(throttled));
        clock.advance(Duration::seconds(10));
        let allowed = make_consume_event_stream_record(&env, consume("stream-1"), &records);
        assert_eq!(allowed.output.status_code(), 200);
    }

    #[test]
    fn consume_with_rejected_key_is_403() {
        let mut input = consume("stream-1");
        input.api_key = "wrong".to_string();
        let record = make_consume_event_stream_record(&env(), input, &[]);
        assert_eq!(record.output.status_code(), 403);
    }
}
