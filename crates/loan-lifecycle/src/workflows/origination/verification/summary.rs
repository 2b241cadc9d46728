use std::collections::BTreeMap;

use serde::Serialize;

use super::{VerificationRecord, VerificationStatus, VerificationType};
use crate::workflows::origination::domain::ApplicationId;

/// Per-type status as seen by the aggregate. Missing records read as `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationTypeState {
    pub verification_type: VerificationType,
    pub status: VerificationStatus,
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// Derived predicates over the full verification set of one application.
///
/// Recomputed from the records on every read; nothing here is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub application_id: ApplicationId,
    pub all_success: bool,
    pub any_failed: bool,
    pub all_processed: bool,
    pub checks: Vec<VerificationTypeState>,
}

impl VerificationSummary {
    pub fn from_records(application_id: ApplicationId, records: &[VerificationRecord]) -> Self {
        let mut latest: BTreeMap<VerificationType, &VerificationRecord> = BTreeMap::new();
        for record in records
            .iter()
            .filter(|record| record.application_id == application_id)
        {
            latest
                .entry(record.verification_type)
                .and_modify(|current| {
                    if record.updated_at >= current.updated_at {
                        *current = record;
                    }
                })
                .or_insert(record);
        }

        let checks: Vec<VerificationTypeState> = VerificationType::ALL
            .into_iter()
            .map(|kind| match latest.get(&kind) {
                Some(record) => VerificationTypeState {
                    verification_type: kind,
                    status: record.status,
                    recorded: true,
                    remarks: record.remarks.clone(),
                },
                None => VerificationTypeState {
                    verification_type: kind,
                    status: VerificationStatus::Pending,
                    recorded: false,
                    remarks: None,
                },
            })
            .collect();

        let all_success = checks
            .iter()
            .all(|check| check.status == VerificationStatus::Success);
        let any_failed = checks
            .iter()
            .any(|check| check.status == VerificationStatus::Failed);
        let all_processed = checks.iter().all(|check| check.status.is_terminal());

        Self {
            application_id,
            all_success,
            any_failed,
            all_processed,
            checks,
        }
    }

    pub fn failed(&self) -> Vec<VerificationType> {
        self.with_status(|status| status == VerificationStatus::Failed)
    }

    pub fn outstanding(&self) -> Vec<VerificationType> {
        self.with_status(|status| !status.is_terminal())
    }

    fn with_status(&self, predicate: impl Fn(VerificationStatus) -> bool) -> Vec<VerificationType> {
        self.checks
            .iter()
            .filter(|check| predicate(check.status))
            .map(|check| check.verification_type)
            .collect()
    }

    /// Verification gate for advancing to credit assessment.
    ///
    /// Failed checks do not hard-block: once every check is terminal the
    /// application may proceed under a manual override.
    pub fn gate(&self) -> VerificationGate {
        if self.all_success {
            VerificationGate::Clear
        } else if self.all_processed {
            VerificationGate::ProceedWithOverride {
                failed: self.failed(),
            }
        } else {
            VerificationGate::Blocked {
                outstanding: self.outstanding(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum VerificationGate {
    /// Every check passed.
    Clear,
    /// Every check is terminal but some failed; staff may override.
    ProceedWithOverride { failed: Vec<VerificationType> },
    /// At least one check is still pending or in progress.
    Blocked { outstanding: Vec<VerificationType> },
}

impl VerificationGate {
    pub fn can_proceed(&self) -> bool {
        !matches!(self, VerificationGate::Blocked { .. })
    }

    pub fn requires_override(&self) -> bool {
        matches!(self, VerificationGate::ProceedWithOverride { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::origination::verification::VerificationRecord;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn application() -> ApplicationId {
        ApplicationId("app-42".to_string())
    }

    fn record(kind: VerificationType, status: VerificationStatus) -> VerificationRecord {
        let now = Utc::now();
        VerificationRecord {
            application_id: application(),
            verification_type: kind,
            status,
            source: "provider".to_string(),
            request_payload: BTreeMap::new(),
            response_payload: None,
            remarks: None,
            verified_at: status.is_terminal().then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn all_with(status: VerificationStatus) -> Vec<VerificationRecord> {
        VerificationType::ALL
            .into_iter()
            .map(|kind| record(kind, status))
            .collect()
    }

    #[test]
    fn all_success_reports_clear_gate() {
        let summary = VerificationSummary::from_records(
            application(),
            &all_with(VerificationStatus::Success),
        );
        assert!(summary.all_success);
        assert!(!summary.any_failed);
        assert!(summary.all_processed);
        assert_eq!(summary.gate(), VerificationGate::Clear);
    }

    #[test]
    fn one_failure_allows_override_but_not_completion() {
        let mut records = all_with(VerificationStatus::Success);
        records[3].status = VerificationStatus::Failed;

        let summary = VerificationSummary::from_records(application(), &records);
        assert!(!summary.all_success);
        assert!(summary.any_failed);
        assert!(summary.all_processed);

        let gate = summary.gate();
        assert!(gate.can_proceed());
        assert!(gate.requires_override());
        assert_eq!(
            gate,
            VerificationGate::ProceedWithOverride {
                failed: vec![VerificationType::Employment]
            }
        );
    }

    #[test]
    fn missing_records_count_as_pending_not_failed() {
        let records = vec![record(VerificationType::Pan, VerificationStatus::Success)];
        let summary = VerificationSummary::from_records(application(), &records);

        assert!(!summary.any_failed);
        assert!(!summary.all_processed);
        assert_eq!(summary.outstanding().len(), 6);
        assert!(summary.checks.iter().filter(|c| !c.recorded).count() == 6);
        assert!(!summary.gate().can_proceed());
    }

    #[test]
    fn failure_with_outstanding_checks_stays_blocked() {
        let mut records = all_with(VerificationStatus::Success);
        records[0].status = VerificationStatus::Failed;
        records[6].status = VerificationStatus::InProgress;

        let summary = VerificationSummary::from_records(application(), &records);
        assert!(summary.any_failed);
        assert_eq!(
            summary.gate(),
            VerificationGate::Blocked {
                outstanding: vec![VerificationType::VideoKyc]
            }
        );
    }

    #[test]
    fn empty_set_is_entirely_pending() {
        let summary = VerificationSummary::from_records(application(), &[]);
        assert!(!summary.all_success && !summary.any_failed && !summary.all_processed);
    }

    #[test]
    fn latest_record_wins_when_duplicates_are_supplied() {
        let mut stale = record(VerificationType::Pan, VerificationStatus::Failed);
        stale.updated_at = Utc::now() - Duration::minutes(10);
        let fresh = record(VerificationType::Pan, VerificationStatus::Success);

        let summary = VerificationSummary::from_records(application(), &[fresh, stale]);
        assert_eq!(summary.checks[0].status, VerificationStatus::Success);
        assert!(!summary.any_failed);
    }

    #[test]
    fn records_for_other_applications_are_ignored() {
        let mut foreign = all_with(VerificationStatus::Success);
        for record in &mut foreign {
            record.application_id = ApplicationId("app-other".to_string());
        }
        let summary = VerificationSummary::from_records(application(), &foreign);
        assert!(!summary.all_processed);
    }

    #[test]
    fn success_implies_processed_for_every_status_combination() {
        let statuses = [
            VerificationStatus::Pending,
            VerificationStatus::InProgress,
            VerificationStatus::Success,
            VerificationStatus::Failed,
        ];
        // Vary the first three types across every status; keep the rest fixed.
        for a in statuses {
            for b in statuses {
                for c in statuses {
                    for rest in [VerificationStatus::Success, VerificationStatus::Pending] {
                        let mut records = all_with(rest);
                        records[0].status = a;
                        records[1].status = b;
                        records[2].status = c;
                        let summary = VerificationSummary::from_records(application(), &records);
                        if summary.all_success {
                            assert!(summary.all_processed);
                            assert!(!summary.any_failed);
                        }
                        assert_eq!(
                            summary.gate().can_proceed(),
                            summary.all_processed,
                            "gate opens exactly when every check is terminal"
                        );
                    }
                }
            }
        }
    }
}
