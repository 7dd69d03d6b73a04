pub mod checklist;
pub mod env;
pub mod ledger;
pub mod model;
pub mod record;
pub mod resolver;
pub mod snapshot;
pub mod usecase;

pub use checklist::{
    checklist_report, evaluate, has_application_pdf_as_content_type, has_unique_preload_idx,
    preload_checklist, Check, CheckResult, Checklist, Group,
};
pub use env::{
    format_iun, AuthorizationGate, Authorized, Clock, DomainEnv, FixedClock, IdGenerator,
    SequentialIdGenerator, StaticKeyGate, SystemClock, UlidIdGenerator, Unauthorized,
};
pub use ledger::{RecordLedger, SharedLedger};
pub use model::*;
pub use record::*;
pub use resolver::{
    make_download_metadata, make_get_payment_notification_metadata_record,
    resolve_payment_attachment, FILE_INFO_NOT_FOUND, F24_ATTACHMENT, PAGOPA_ATTACHMENT,
};
pub use snapshot::{compute_snapshot, make_progress_response, ProjectionMiss, SnapshotEntry};
pub use usecase::{
    make_check_notification_status_record, make_consume_event_stream_record,
    make_create_event_stream_record, make_new_notification_record, make_preload_record,
    DUPLICATE_PRELOAD_IDX, NOTIFICATION_REQUEST_NOT_FOUND,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DomainError {
    #[error("invalid url for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
}
