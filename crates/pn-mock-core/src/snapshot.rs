//! Replays the ledger into the current notification state.
//!
//! Only records with a 2xx output take part. A notification starts pending when its submission
//! is accepted and becomes confirmed the first time a status check or an event stream reports it
//! as `ACCEPTED` with an IUN.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{
    NewNotificationRequest, NewNotificationResponse, Notification, NotificationRequest,
    NotificationRequestStatus, NotificationStatus, ProgressResponseElement,
};
use crate::record::{
    CheckNotificationStatusOutput, ConsumeEventStreamOutput, NewNotificationOutput, Record,
    StatusCoded,
};

/// Why a snapshot element is not a confirmed notification.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionMiss {
    Pending(NotificationRequest),
    Malformed { record_index: usize, reason: String },
}

pub type SnapshotEntry = Result<Notification, ProjectionMiss>;

const PROGRESS_EVENT_ID: &str = "0";

#[derive(Debug, Default)]
struct NotificationMap {
    entries: Vec<SnapshotEntry>,
}

impl NotificationMap {
    fn apply(mut self, record_index: usize, record: &Record) -> Self {
        match record {
            Record::NewNotification(record) => {
                if let NewNotificationOutput::Accepted(response) = &record.output {
                    self.submit(record_index, &record.input.body, response);
                }
            }
            Record::CheckNotificationStatus(record) => {
                if let CheckNotificationStatusOutput::Ok(status) = &record.output {
                    if status.notification_request_status == NotificationRequestStatus::Accepted {
                        if let Some(iun) = &status.iun {
                            self.confirm(&status.notification_request_id, iun);
                        }
                    }
                }
            }
            Record::ConsumeEventStream(record) => {
                if let ConsumeEventStreamOutput::Ok(elements) = &record.output {
                    for element in elements {
                        if element.new_status != Some(NotificationStatus::Accepted) {
                            continue;
                        }
                        if let Some(iun) = &element.iun {
                            self.confirm(&element.notification_request_id, iun);
                        }
                    }
                }
            }
            Record::PreLoad(_)
            | Record::CreateEventStream(_)
            | Record::GetPaymentNotificationMetadata(_) => {}
        }
        self
    }

    fn submit(
        &mut self,
        record_index: usize,
        body: &NewNotificationRequest,
        response: &NewNotificationResponse,
    ) {
        if response.notification_request_id.trim().is_empty() {
            self.entries.push(Err(ProjectionMiss::Malformed {
                record_index,
                reason: "notificationRequestId is blank".to_string(),
            }));
            return;
        }

        self.entries.push(Err(ProjectionMiss::Pending(NotificationRequest {
            notification_request_id: response.notification_request_id.clone(),
            payload: body.clone(),
        })));
    }

    // Confirmed entries keep the first IUN they were given.
    fn confirm(&mut self, notification_request_id: &str, iun: &str) {
        for entry in &mut self.entries {
            let confirmed = match entry {
                Err(ProjectionMiss::Pending(request))
                    if request.notification_request_id == notification_request_id =>
                {
                    Notification::accepted(request.clone(), iun)
                }
                Ok(_) | Err(_) => continue,
            };
            *entry = Ok(confirmed);
        }
    }
}

/// Fold `records` into one element per accepted submission, in submission order.
///
/// Elements are not deduplicated: two accepted submissions sharing a request id yield two
/// elements, and both are confirmed by the same status report.
#[must_use]
pub fn compute_snapshot(records: &[Record]) -> Vec<SnapshotEntry> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.is_success())
        .fold(NotificationMap::default(), |map, (index, record)| map.apply(index, record))
        .entries
}

/// Progress events describing `snapshot` as of `timestamp`. Malformed elements are skipped.
#[must_use]
pub fn make_progress_response(
    timestamp: OffsetDateTime,
    snapshot: &[SnapshotEntry],
) -> Vec<ProgressResponseElement> {
    snapshot
        .iter()
        .filter_map(|entry| match entry {
            Ok(notification) => Some(ProgressResponseElement {
                iun: Some(notification.iun.clone()),
                new_status: Some(NotificationStatus::Accepted),
                ..progress_element(timestamp, notification.notification_request_id())
            }),
            Err(ProjectionMiss::Pending(request)) => {
                Some(progress_element(timestamp, &request.notification_request_id))
            }
            Err(ProjectionMiss::Malformed { .. }) => None,
        })
        .collect()
}

fn progress_element(
    timestamp: OffsetDateTime,
    notification_request_id: &str,
) -> ProgressResponseElement {
    ProgressResponseElement {
        event_id: PROGRESS_EVENT_ID.to_string(),
        timestamp,
        notification_request_id: notification_request_id.to_string(),
        iun: None,
        new_status: None,
    }
}
