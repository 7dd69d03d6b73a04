use serde::{Deserialize, Serialize};

use crate::model::preload_indices_are_unique;
use crate::record::{PreLoadRecord, Record, StatusCoded};

pub const APPLICATION_PDF: &str = "application/pdf";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Group {
    pub name: &'static str,
}

/// A named predicate over some target, evaluated as part of a [`Checklist`].
pub struct Check<T: ?Sized> {
    pub name: &'static str,
    pub group: Group,
    pub eval: fn(&T) -> bool,
}

impl<T: ?Sized> std::fmt::Debug for Check<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("name", &self.name).field("group", &self.group).finish()
    }
}

pub type Checklist<T> = Vec<Check<T>>;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub group: String,
    pub passed: bool,
}

/// Run every check against `target`, keeping declaration order.
#[must_use]
pub fn evaluate<T: ?Sized>(checklist: &[Check<T>], target: &T) -> Vec<CheckResult> {
    checklist
        .iter()
        .map(|check| CheckResult {
            name: check.name.to_string(),
            group: check.group.name.to_string(),
            passed: (check.eval)(target),
        })
        .collect()
}

#[must_use]
pub fn has_unique_preload_idx(record: &PreLoadRecord) -> bool {
    preload_indices_are_unique(&record.input.body)
}

#[must_use]
pub fn has_application_pdf_as_content_type(record: &PreLoadRecord) -> bool {
    record.input.body.iter().all(|item| item.content_type == APPLICATION_PDF)
}

const PRELOAD_GROUP: Group = Group { name: "The preload request" };

/// Checks over every recorded preload request. Each passes when at least one record satisfies it.
#[must_use]
pub fn preload_checklist() -> Checklist<[PreLoadRecord]> {
    vec![
        Check {
            name: "Exists a response with status code 401",
            group: PRELOAD_GROUP,
            eval: |records| records.iter().any(|record| record.output.status_code() == 401),
        },
        Check {
            name: "Contains an api-key",
            group: PRELOAD_GROUP,
            eval: |records| records.iter().any(|record| record.input.api_key.is_some()),
        },
        Check {
            name: "preloadIdx values are unique within the body",
            group: PRELOAD_GROUP,
            eval: |records| records.iter().any(has_unique_preload_idx),
        },
        Check {
            name: "contentType is always 'application/pdf'",
            group: PRELOAD_GROUP,
            eval: |records| records.iter().any(has_application_pdf_as_content_type),
        },
    ]
}

/// Evaluate the preload checklist over the preload records in `records`.
#[must_use]
pub fn checklist_report(records: &[Record]) -> Vec<CheckResult> {
    let preloads = records.iter().filter_map(Record::as_preload).cloned().collect::<Vec<_>>();
    evaluate(&preload_checklist(), preloads.as_slice())
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::model::{HttpMethod, PreLoadRequest, PreLoadResponse, UnauthorizedMessageBody};
    use crate::record::{PreLoadInput, PreLoadOutput};

    fn item(idx: &str, content_type: &str) -> PreLoadRequest {
        PreLoadRequest {
            preload_idx: idx.to_string(),
            content_type: content_type.to_string(),
            sha256: "jezIVxlG1M1woCSUngM6KipUN3/p8cG5RMIPnuEanlE=".to_string(),
        }
    }

    fn preload(api_key: Option<&str>, body: Vec<PreLoadRequest>) -> PreLoadRecord {
        let output = match api_key {
            None => PreLoadOutput::MissingApiKey(UnauthorizedMessageBody::missing_api_key()),
            Some(_) => PreLoadOutput::Ok(
                body.iter()
                    .map(|item| PreLoadResponse {
                        preload_idx: item.preload_idx.clone(),
                        secret: "secret".to_string(),
                        http_method: HttpMethod::Put,
                        url: "http://localhost/upload".to_string(),
                        key: "PN_NOTIFICATION_ATTACHMENTS-0.pdf".to_string(),
                    })
                    .collect(),
            ),
        };
        PreLoadRecord {
            input: PreLoadInput { api_key: api_key.map(str::to_string), body },
            output,
            logged_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn passed(results: &[CheckResult]) -> Vec<bool> {
        results.iter().map(|result| result.passed).collect()
    }

    #[test]
    fn record_predicates() {
        let single = preload(Some("key"), vec![item("0", APPLICATION_PDF)]);
        let duplicated =
            preload(Some("key"), vec![item("0", APPLICATION_PDF), item("0", APPLICATION_PDF)]);
        let mixed = preload(Some("key"), vec![item("0", APPLICATION_PDF), item("1", "image/png")]);

        assert!(has_unique_preload_idx(&single));
        assert!(!has_unique_preload_idx(&duplicated));
        assert!(has_unique_preload_idx(&mixed));
        assert!(has_application_pdf_as_content_type(&duplicated));
        assert!(!has_application_pdf_as_content_type(&mixed));
    }

    #[test]
    fn status_401_check_needs_at_least_one_unauthenticated_preload() {
        let checklist = preload_checklist();
        let with_401 = [preload(None, Vec::new()), preload(Some("key"), Vec::new())];
        let without_401 = [preload(Some("key"), Vec::new())];

        assert!((checklist[0].eval)(&with_401));
        assert!(!(checklist[0].eval)(&without_401));
        assert!(!(checklist[0].eval)(&[]));
    }

    #[test]
    fn empty_ledger_fails_every_check() {
        let results = checklist_report(&[]);
        assert_eq!(results.len(), 4);
        assert_eq!(passed(&results), vec![false; 4]);
        assert!(results.iter().all(|result| result.group == "The preload request"));
    }

    #[test]
    fn checks_are_existential_and_keep_declaration_order() {
        let records = [
            Record::from(preload(None, vec![item("0", "image/png")])),
            Record::from(preload(Some("key"), vec![item("0", APPLICATION_PDF)])),
        ];
        let results = checklist_report(&records);

        assert_eq!(results[0].name, "Exists a response with status code 401");
        assert_eq!(results[3].name, "contentType is always 'application/pdf'");
        assert_eq!(passed(&results), vec![true, true, true, true]);
    }

    #[test]
    fn only_authenticated_duplicates_fail_the_401_and_uniqueness_checks() {
        let records = [Record::from(preload(
            Some("key"),
            vec![item("0", APPLICATION_PDF), item("0", APPLICATION_PDF)],
        ))];
        assert_eq!(passed(&checklist_report(&records)), vec![false, true, false, true]);
    }

    #[test]
    fn evaluate_runs_arbitrary_checklists() {
        let checklist: Checklist<i32> = vec![
            Check { name: "positive", group: Group { name: "numbers" }, eval: |value| *value > 0 },
            Check { name: "even", group: Group { name: "numbers" }, eval: |value| value % 2 == 0 },
        ];
        assert_eq!(passed(&evaluate(&checklist, &3)), vec![true, false]);
    }
}
