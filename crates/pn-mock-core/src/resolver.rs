use crate::env::DomainEnv;
use crate::model::{
    Notification, NotificationAttachmentDownloadMetadataResponse, NotificationPaymentAttachment,
    NotificationPaymentItem, NotificationRecipient, Problem,
};
use crate::record::{
    GetPaymentNotificationMetadataInput, GetPaymentNotificationMetadataOutput,
    GetPaymentNotificationMetadataRecord, Record,
};
use crate::snapshot::compute_snapshot;

pub const FILE_INFO_NOT_FOUND: &str = "PN_DELIVERY_FILEINFONOTFOUND";
pub const PAGOPA_ATTACHMENT: &str = "PAGOPA";
pub const F24_ATTACHMENT: &str = "F24";

/// Answer a payment-attachment lookup against `records` and stamp it as a ledger record.
#[must_use]
pub fn make_get_payment_notification_metadata_record(
    env: &DomainEnv,
    input: GetPaymentNotificationMetadataInput,
    records: &[Record],
) -> GetPaymentNotificationMetadataRecord {
    GetPaymentNotificationMetadataRecord {
        output: resolve_payment_attachment(env, &input, records),
        input,
        logged_at: env.clock.now(),
    }
}

/// Resolve the attachment named `input.attachment_name` for recipient `input.recipient_id` of
/// notification `input.iun`.
///
/// A rejected key yields 403 before the ledger is projected. Every other dead end collapses to
/// one 404 carrying [`FILE_INFO_NOT_FOUND`]. When several payments qualify, the last one in
/// ledger order wins.
#[must_use]
pub fn resolve_payment_attachment(
    env: &DomainEnv,
    input: &GetPaymentNotificationMetadataInput,
    records: &[Record],
) -> GetPaymentNotificationMetadataOutput {
    if let Err(unauthorized) = env.gate.authorize(&input.api_key) {
        return GetPaymentNotificationMetadataOutput::Unauthorized(unauthorized.into());
    }

    let notifications =
        compute_snapshot(records).into_iter().filter_map(Result::ok).collect::<Vec<_>>();

    let payments = notifications
        .iter()
        // Only PAGOPA attachments are served for now; any other name is a miss.
        .filter(|notification| {
            !notification.iun.is_empty() && input.attachment_name == PAGOPA_ATTACHMENT
        })
        .filter(|notification| {
            recipient_position(input.recipient_id, notification.recipients()).is_some()
        })
        .filter_map(|notification| selected_recipient(notification, input))
        .filter_map(|recipient| recipient.payments.as_deref())
        .flatten()
        .collect::<Vec<_>>();

    payments
        .into_iter()
        .rev()
        .find_map(|payment| attachment_by_name(&input.attachment_name, payment))
        .map(|attachment| make_download_metadata(env, attachment))
        .map_or_else(
            || {
                GetPaymentNotificationMetadataOutput::NotFound(Problem::not_found(
                    FILE_INFO_NOT_FOUND,
                ))
            },
            GetPaymentNotificationMetadataOutput::Ok,
        )
}

fn recipient_position(recipient_id: i64, recipients: &[NotificationRecipient]) -> Option<usize> {
    usize::try_from(recipient_id).ok().filter(|position| *position < recipients.len())
}

fn selected_recipient<'a>(
    notification: &'a Notification,
    input: &GetPaymentNotificationMetadataInput,
) -> Option<&'a NotificationRecipient> {
    if notification.iun != input.iun {
        return None;
    }
    recipient_position(input.recipient_id, notification.recipients())
        .and_then(|position| notification.recipients().get(position))
}

fn attachment_by_name<'a>(
    attachment_name: &str,
    payment: &'a NotificationPaymentItem,
) -> Option<&'a NotificationPaymentAttachment> {
    match attachment_name {
        PAGOPA_ATTACHMENT => {
            payment.pago_pa.as_ref().and_then(|pago_pa| pago_pa.attachment.as_ref())
        }
        F24_ATTACHMENT => payment.f24.as_ref().and_then(|f24| f24.metadata_attachment.as_ref()),
        _ => None,
    }
}

/// Download metadata for a stored attachment, pointing at the configured download URL.
#[must_use]
pub fn make_download_metadata(
    env: &DomainEnv,
    attachment: &NotificationPaymentAttachment,
) -> NotificationAttachmentDownloadMetadataResponse {
    NotificationAttachmentDownloadMetadataResponse {
        filename: attachment.reference.key.clone(),
        content_type: attachment.content_type.clone(),
        content_length: 0,
        sha256: attachment.digests.sha256.clone(),
        url: Some(env.download_document_url.clone()),
        retry_after: None,
    }
}
