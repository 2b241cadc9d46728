//! Disbursal worklist derivation.
//!
//! `ready` is never stored. It is derived on every read from the application stage,
//! the customer-signed document set, and the absence of a disbursement record. Once a
//! disbursement exists the application is reported solely by that record's status.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{
    Application, ApplicationId, Disbursement, DisbursementStatus, DocumentType,
    GeneratedDocument, OrganizationId, Sanction, Stage, Timestamp,
};
use super::repository::{LendingStore, RepositoryError};
use super::verification::{BankDetails, VerificationStatus, VerificationType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisbursalStatus {
    Ready,
    Pending,
    Completed,
    Failed,
}

impl DisbursalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DisbursalStatus::Ready => "ready",
            DisbursalStatus::Pending => "pending",
            DisbursalStatus::Completed => "completed",
            DisbursalStatus::Failed => "failed",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            DisbursalStatus::Ready => 0,
            DisbursalStatus::Pending => 1,
            DisbursalStatus::Failed => 2,
            DisbursalStatus::Completed => 3,
        }
    }
}

impl From<DisbursementStatus> for DisbursalStatus {
    fn from(value: DisbursementStatus) -> Self {
        match value {
            DisbursementStatus::Pending => DisbursalStatus::Pending,
            DisbursementStatus::Completed => DisbursalStatus::Completed,
            DisbursementStatus::Failed => DisbursalStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisbursementView {
    pub amount: u64,
    pub utr_number: Option<String>,
    pub proof_uploaded: bool,
}

/// One row of the disbursal worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisbursalWorklistItem {
    pub application_id: ApplicationId,
    pub applicant_name: String,
    pub current_stage: Stage,
    pub status: DisbursalStatus,
    pub approved_amount: Option<u64>,
    pub sanctioned_amount: Option<u64>,
    pub net_disbursable: Option<u64>,
    pub bank_details: Option<BankDetails>,
    /// Ready, but no usable account number: manual entry is required before payout.
    pub bank_details_missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement: Option<DisbursementView>,
    pub updated_at: Timestamp,
}

/// Customer has signed either the combined pack or both the sanction letter and agreement.
pub fn documents_signed(documents: &[GeneratedDocument]) -> bool {
    let signed = |kind: DocumentType| {
        documents
            .iter()
            .any(|document| document.document_type == kind && document.customer_signed)
    };
    signed(DocumentType::CombinedLoanPack)
        || (signed(DocumentType::SanctionLetter) && signed(DocumentType::LoanAgreement))
}

/// `true` when the application belongs in the ready set, ignoring disbursements.
pub fn eligible_for_disbursal(application: &Application, documents: &[GeneratedDocument]) -> bool {
    application.current_stage.awaits_disbursal() && documents_signed(documents)
}

/// Source rows for one organization's worklist.
#[derive(Debug, Clone, Default)]
pub struct WorklistInputs {
    pub applications: Vec<Application>,
    pub disbursements: Vec<Disbursement>,
    pub documents: HashMap<ApplicationId, Vec<GeneratedDocument>>,
    pub sanctions: HashMap<ApplicationId, Sanction>,
    pub bank_details: HashMap<ApplicationId, BankDetails>,
}

/// Union of the ready set (eligible, no disbursement) and the disbursement set.
pub fn derive_worklist(inputs: &WorklistInputs) -> Vec<DisbursalWorklistItem> {
    let applications: HashMap<&ApplicationId, &Application> = inputs
        .applications
        .iter()
        .map(|application| (&application.id, application))
        .collect();
    let disbursed: HashSet<&ApplicationId> = inputs
        .disbursements
        .iter()
        .map(|disbursement| &disbursement.application_id)
        .collect();

    let mut items = Vec::new();

    for application in &inputs.applications {
        if disbursed.contains(&application.id) {
            continue;
        }
        let documents = inputs
            .documents
            .get(&application.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if !eligible_for_disbursal(application, documents) {
            continue;
        }
        let bank_details = inputs.bank_details.get(&application.id).cloned();
        items.push(item_for(
            application,
            inputs.sanctions.get(&application.id),
            DisbursalStatus::Ready,
            bank_details,
            None,
            application.updated_at,
        ));
    }

    for disbursement in &inputs.disbursements {
        let Some(application) = applications.get(&disbursement.application_id) else {
            warn!(
                application_id = %disbursement.application_id,
                "disbursement without a visible application skipped"
            );
            continue;
        };
        items.push(item_for(
            application,
            inputs.sanctions.get(&application.id),
            disbursement.status.into(),
            inputs.bank_details.get(&application.id).cloned(),
            Some(DisbursementView {
                amount: disbursement.amount,
                utr_number: disbursement.utr_number.clone(),
                proof_uploaded: disbursement.proof_uploaded,
            }),
            disbursement.updated_at,
        ));
    }

    items.sort_by(worklist_order);
    items
}

fn item_for(
    application: &Application,
    sanction: Option<&Sanction>,
    status: DisbursalStatus,
    bank_details: Option<BankDetails>,
    disbursement: Option<DisbursementView>,
    updated_at: Timestamp,
) -> DisbursalWorklistItem {
    DisbursalWorklistItem {
        application_id: application.id.clone(),
        applicant_name: application.applicant_name.clone(),
        current_stage: application.current_stage,
        status,
        approved_amount: application.approved_amount,
        sanctioned_amount: sanction.map(|sanction| sanction.sanctioned_amount),
        net_disbursable: sanction.map(Sanction::net_disbursable),
        bank_details_missing: status == DisbursalStatus::Ready && bank_details.is_none(),
        bank_details,
        disbursement,
        updated_at,
    }
}

fn worklist_order(a: &DisbursalWorklistItem, b: &DisbursalWorklistItem) -> Ordering {
    a.status
        .rank()
        .cmp(&b.status.rank())
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.application_id.cmp(&b.application_id))
}

/// Pulls worklist inputs from the store and derives statuses on every call.
pub struct DisbursalReadinessResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S> DisbursalReadinessResolver<S>
where
    S: LendingStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn worklist(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<DisbursalWorklistItem>, RepositoryError> {
        let applications = self.store.list_applications(organization_id)?;
        let disbursements = self.store.disbursements_for_organization(organization_id)?;
        let disbursed: HashSet<ApplicationId> = disbursements
            .iter()
            .map(|disbursement| disbursement.application_id.clone())
            .collect();

        let mut inputs = WorklistInputs {
            disbursements,
            ..WorklistInputs::default()
        };

        for application in &applications {
            let has_disbursement = disbursed.contains(&application.id);
            if !has_disbursement && !application.current_stage.awaits_disbursal() {
                continue;
            }
            if !has_disbursement {
                let documents = self.store.documents_for(&application.id)?;
                if !documents_signed(&documents) {
                    continue;
                }
                inputs.documents.insert(application.id.clone(), documents);
            }
            if let Some(sanction) = self.store.fetch_sanction(&application.id)? {
                inputs.sanctions.insert(application.id.clone(), sanction);
            }
            if let Some(details) = self.bank_details_for(&application.id)? {
                inputs.bank_details.insert(application.id.clone(), details);
            }
        }

        inputs.applications = applications;
        Ok(derive_worklist(&inputs))
    }

    /// Derived status for one application; `None` when it is neither ready nor disbursed.
    pub fn status_for(
        &self,
        application: &Application,
    ) -> Result<Option<DisbursalStatus>, RepositoryError> {
        if let Some(disbursement) = self.store.fetch_disbursement(&application.id)? {
            return Ok(Some(disbursement.status.into()));
        }
        let documents = self.store.documents_for(&application.id)?;
        Ok(eligible_for_disbursal(application, &documents).then_some(DisbursalStatus::Ready))
    }

    /// Payout account from a successful bank-account verification, if it carries one.
    fn bank_details_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<BankDetails>, RepositoryError> {
        let records = self.store.verifications_for(application_id)?;
        Ok(records
            .iter()
            .filter(|record| {
                record.verification_type == VerificationType::BankAccount
                    && record.status == VerificationStatus::Success
            })
            .find_map(|record| record.response_payload.as_ref()?.bank_details()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::origination::domain::{
        ApplicationStatus, FeeBreakdown, OrganizationId, SanctionStatus,
    };
    use chrono::{Duration, NaiveDate, Utc};

    fn application(id: &str, stage: Stage) -> Application {
        let now = Utc::now();
        Application {
            id: ApplicationId(id.to_string()),
            organization_id: OrganizationId("org-1".to_string()),
            applicant_name: format!("Applicant {id}"),
            current_stage: stage,
            status: ApplicationStatus::Approved,
            requested_amount: 300_000,
            approved_amount: Some(250_000),
            tenure_months: 24,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn document(id: &str, kind: DocumentType, signed: bool) -> GeneratedDocument {
        GeneratedDocument {
            application_id: ApplicationId(id.to_string()),
            document_type: kind,
            customer_signed: signed,
            signed_at: signed.then(Utc::now),
        }
    }

    fn disbursement(id: &str, status: DisbursementStatus) -> Disbursement {
        let now = Utc::now();
        Disbursement {
            application_id: ApplicationId(id.to_string()),
            amount: 245_000,
            utr_number: Some("UTR0001".to_string()),
            proof_uploaded: status == DisbursementStatus::Completed,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn bank() -> BankDetails {
        BankDetails {
            account_number: "50100012345678".to_string(),
            ifsc: Some("HDFC0000123".to_string()),
            account_holder_name: Some("Asha Rao".to_string()),
            bank_name: None,
        }
    }

    #[test]
    fn combined_pack_alone_counts_as_signed() {
        assert!(documents_signed(&[document(
            "a",
            DocumentType::CombinedLoanPack,
            true
        )]));
        assert!(!documents_signed(&[document(
            "a",
            DocumentType::CombinedLoanPack,
            false
        )]));
    }

    #[test]
    fn letter_and_agreement_must_both_be_signed() {
        let letter = document("a", DocumentType::SanctionLetter, true);
        let unsigned_agreement = document("a", DocumentType::LoanAgreement, false);
        let agreement = document("a", DocumentType::LoanAgreement, true);

        assert!(!documents_signed(&[letter.clone()]));
        assert!(!documents_signed(&[letter.clone(), unsigned_agreement]));
        assert!(documents_signed(&[letter, agreement]));
        assert!(!documents_signed(&[document(
            "a",
            DocumentType::KeyFactStatement,
            true
        )]));
    }

    #[test]
    fn only_disbursal_stages_are_eligible() {
        let signed = [document("a", DocumentType::CombinedLoanPack, true)];
        for stage in Stage::ALL {
            let expected = matches!(
                stage,
                Stage::Sanction | Stage::Sanctioned | Stage::DisbursementPending
            );
            assert_eq!(
                eligible_for_disbursal(&application("a", stage), &signed),
                expected,
                "stage {stage}"
            );
        }
    }

    #[test]
    fn disbursement_record_replaces_ready_status() {
        let mut inputs = WorklistInputs {
            applications: vec![application("a", Stage::DisbursementPending)],
            ..WorklistInputs::default()
        };
        inputs.documents.insert(
            ApplicationId("a".to_string()),
            vec![document("a", DocumentType::CombinedLoanPack, true)],
        );

        let items = derive_worklist(&inputs);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, DisbursalStatus::Ready);

        inputs
            .disbursements
            .push(disbursement("a", DisbursementStatus::Pending));
        let items = derive_worklist(&inputs);
        assert_eq!(items.len(), 1, "application appears in exactly one set");
        assert_eq!(items[0].status, DisbursalStatus::Pending);
        assert!(items[0].disbursement.is_some());
    }

    #[test]
    fn disbursed_applications_are_reported_regardless_of_stage() {
        let inputs = WorklistInputs {
            applications: vec![application("a", Stage::Closed)],
            disbursements: vec![disbursement("a", DisbursementStatus::Completed)],
            ..WorklistInputs::default()
        };
        let items = derive_worklist(&inputs);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, DisbursalStatus::Completed);
        assert!(!items[0].bank_details_missing);
    }

    #[test]
    fn ready_without_bank_details_is_flagged_not_dropped() {
        let mut inputs = WorklistInputs {
            applications: vec![
                application("with-bank", Stage::Sanctioned),
                application("without-bank", Stage::Sanctioned),
            ],
            ..WorklistInputs::default()
        };
        for id in ["with-bank", "without-bank"] {
            inputs.documents.insert(
                ApplicationId(id.to_string()),
                vec![document(id, DocumentType::CombinedLoanPack, true)],
            );
        }
        inputs
            .bank_details
            .insert(ApplicationId("with-bank".to_string()), bank());

        let items = derive_worklist(&inputs);
        assert_eq!(items.len(), 2);
        let missing = items
            .iter()
            .find(|item| item.application_id.0 == "without-bank")
            .expect("still listed");
        assert_eq!(missing.status, DisbursalStatus::Ready);
        assert!(missing.bank_details_missing);
        assert!(missing.bank_details.is_none());

        let present = items
            .iter()
            .find(|item| item.application_id.0 == "with-bank")
            .expect("listed");
        assert!(!present.bank_details_missing);
        assert_eq!(present.bank_details, Some(bank()));
    }

    #[test]
    fn worklist_orders_ready_first_then_newest() {
        let mut older = application("older", Stage::Sanctioned);
        older.updated_at = Utc::now() - Duration::hours(2);
        let newer = application("newer", Stage::Sanctioned);

        let mut inputs = WorklistInputs {
            applications: vec![
                older,
                newer,
                application("paid", Stage::Disbursed),
                application("bounced", Stage::DisbursementPending),
                application("queued", Stage::DisbursementPending),
            ],
            disbursements: vec![
                disbursement("paid", DisbursementStatus::Completed),
                disbursement("bounced", DisbursementStatus::Failed),
                disbursement("queued", DisbursementStatus::Pending),
            ],
            ..WorklistInputs::default()
        };
        for id in ["older", "newer"] {
            inputs.documents.insert(
                ApplicationId(id.to_string()),
                vec![document(id, DocumentType::CombinedLoanPack, true)],
            );
        }

        let order: Vec<_> = derive_worklist(&inputs)
            .into_iter()
            .map(|item| item.application_id.0)
            .collect();
        assert_eq!(order, vec!["newer", "older", "queued", "bounced", "paid"]);
    }

    #[test]
    fn sanction_amounts_are_attached() {
        let mut inputs = WorklistInputs {
            applications: vec![application("a", Stage::Sanctioned)],
            ..WorklistInputs::default()
        };
        inputs.documents.insert(
            ApplicationId("a".to_string()),
            vec![document("a", DocumentType::CombinedLoanPack, true)],
        );
        inputs.sanctions.insert(
            ApplicationId("a".to_string()),
            Sanction {
                application_id: ApplicationId("a".to_string()),
                sanctioned_amount: 250_000,
                fees: FeeBreakdown {
                    processing_fee: 5_000,
                    ..FeeBreakdown::default()
                },
                valid_until: NaiveDate::from_ymd_opt(2026, 12, 31).expect("valid"),
                status: SanctionStatus::Signed,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );

        let items = derive_worklist(&inputs);
        assert_eq!(items[0].sanctioned_amount, Some(250_000));
        assert_eq!(items[0].net_disbursable, Some(245_000));
    }
}
