use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::workflows::origination::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, Disbursement,
    DisbursementStatus, DocumentType, GeneratedDocument, OrganizationId, Sanction,
    SanctionDraft, SanctionStatus, Stage,
};
use crate::workflows::origination::repository::{
    ApplicationRepository, DisbursementRepository, DocumentLookup, LendingStore,
    RepositoryError, SanctionRepository, StageSwap, SwapResult, VerificationRepository,
};
use crate::workflows::origination::verification::{
    VerificationRecord, VerificationResponse, VerificationStatus, VerificationSubmission,
    VerificationType, VerificationUpdate,
};
use crate::workflows::origination::{
    origination_router, InMemoryLendingStore, LoanOriginationService, TransitionOutcome,
    TransitionRequest,
};

pub(super) fn org() -> OrganizationId {
    OrganizationId("org-sunrise".to_string())
}

pub(super) fn other_org() -> OrganizationId {
    OrganizationId("org-harbor".to_string())
}

pub(super) fn draft() -> ApplicationDraft {
    ApplicationDraft {
        applicant_name: "Asha Rao".to_string(),
        requested_amount: 500_000,
        tenure_months: 36,
        assigned_to: Some("officer-7".to_string()),
    }
}

pub(super) fn build_service() -> (
    LoanOriginationService<InMemoryLendingStore>,
    Arc<InMemoryLendingStore>,
) {
    let store = Arc::new(InMemoryLendingStore::default());
    let service = LoanOriginationService::new(store.clone());
    (service, store)
}

pub(super) fn create<S: LendingStore + 'static>(
    service: &LoanOriginationService<S>,
) -> Application {
    service
        .create_application(&org(), draft())
        .expect("application created")
}

/// Single compare-and-swap from the application's current stage to `stage`.
pub(super) fn move_to<S: LendingStore + 'static>(
    service: &LoanOriginationService<S>,
    application: &Application,
    stage: Stage,
    status: ApplicationStatus,
) -> Application {
    let current = service
        .get_application(&org(), &application.id)
        .expect("application exists");
    let outcome = service
        .transition(
            &org(),
            &TransitionRequest {
                application_id: application.id.clone(),
                expected_stage: current.current_stage,
                new_stage: stage,
                new_status: status,
            },
        )
        .expect("transition persists");
    match outcome {
        TransitionOutcome::Applied(application) => application,
        other => panic!("expected applied transition, got {other:?}"),
    }
}

pub(super) fn response_for(kind: VerificationType) -> VerificationResponse {
    match kind {
        VerificationType::Pan => VerificationResponse::Pan {
            pan_number: "ABCDE1234F".to_string(),
            name_on_card: Some("ASHA RAO".to_string()),
            name_match: Some(true),
        },
        VerificationType::Aadhaar => VerificationResponse::Aadhaar {
            masked_number: "XXXX-XXXX-4821".to_string(),
            name: Some("Asha Rao".to_string()),
            address_match: Some(true),
        },
        VerificationType::BankAccount => VerificationResponse::BankAccount {
            account_number: Some("50100012345678".to_string()),
            ifsc: Some("HDFC0000123".to_string()),
            account_holder_name: Some("Asha Rao".to_string()),
            bank_name: Some("HDFC Bank".to_string()),
            name_match_score: Some(97),
        },
        VerificationType::Employment => VerificationResponse::Employment {
            employer_name: "Konkan Logistics".to_string(),
            designation: Some("Operations Lead".to_string()),
            monthly_income: Some(92_000),
        },
        VerificationType::BankStatement => VerificationResponse::BankStatement {
            months_analysed: 6,
            average_monthly_balance: Some(48_000),
            average_monthly_credit: Some(95_000),
            bounced_transactions: 0,
        },
        VerificationType::CreditBureau => VerificationResponse::CreditBureau {
            bureau: "CIBIL".to_string(),
            score: Some(781),
            active_accounts: 2,
            overdue_accounts: 0,
        },
        VerificationType::VideoKyc => VerificationResponse::VideoKyc {
            session_id: "vkyc-1182".to_string(),
            agent: Some("agent-3".to_string()),
            liveness_passed: Some(true),
        },
    }
}

pub(super) fn verification(
    application_id: &ApplicationId,
    kind: VerificationType,
    status: VerificationStatus,
) -> VerificationSubmission {
    VerificationSubmission {
        application_id: application_id.clone(),
        verification_type: kind.label().to_string(),
        status,
        source: "provider".to_string(),
        request_payload: BTreeMap::from([("reference".to_string(), format!("{kind}-req"))]),
        response_payload: Some(response_for(kind)),
        remarks: None,
    }
}

pub(super) fn verify_all<S: LendingStore + 'static>(
    service: &LoanOriginationService<S>,
    application_id: &ApplicationId,
    status: VerificationStatus,
) {
    for kind in VerificationType::ALL {
        service
            .submit_verification(&org(), verification(application_id, kind, status))
            .expect("verification stored");
    }
}

pub(super) fn signed(application_id: &ApplicationId, kind: DocumentType) -> GeneratedDocument {
    GeneratedDocument {
        application_id: application_id.clone(),
        document_type: kind,
        customer_signed: true,
        signed_at: Some(Utc::now()),
    }
}

pub(super) fn sanction_draft(application_id: &ApplicationId) -> SanctionDraft {
    SanctionDraft {
        application_id: application_id.clone(),
        sanctioned_amount: 450_000,
        fees: Default::default(),
        valid_until: NaiveDate::from_ymd_opt(2026, 12, 31).expect("valid"),
    }
}

/// Application at `sanctioned` with a signed combined pack and passing verifications.
pub(super) fn ready_application(
    service: &LoanOriginationService<InMemoryLendingStore>,
    store: &InMemoryLendingStore,
) -> Application {
    let application = create(service);
    verify_all(service, &application.id, VerificationStatus::Success);
    move_to(service, &application, Stage::Sanctioned, ApplicationStatus::Approved);
    store
        .register_document(signed(&application.id, DocumentType::CombinedLoanPack))
        .expect("document registered");
    application
}

pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl ApplicationRepository for UnavailableStore {
    fn allocate_application_id(&self) -> Result<ApplicationId, RepositoryError> {
        offline()
    }

    fn insert_application(&self, _: Application) -> Result<Application, RepositoryError> {
        offline()
    }

    fn fetch_application(
        &self,
        _: &OrganizationId,
        _: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        offline()
    }

    fn list_applications(&self, _: &OrganizationId) -> Result<Vec<Application>, RepositoryError> {
        offline()
    }

    fn compare_and_swap_stage(&self, _: &StageSwap) -> Result<SwapResult, RepositoryError> {
        offline()
    }

    fn set_approved_amount(
        &self,
        _: &OrganizationId,
        _: &ApplicationId,
        _: u64,
    ) -> Result<(), RepositoryError> {
        offline()
    }
}

impl VerificationRepository for UnavailableStore {
    fn upsert_verification(
        &self,
        _: VerificationUpdate,
    ) -> Result<VerificationRecord, RepositoryError> {
        offline()
    }

    fn verifications_for(
        &self,
        _: &ApplicationId,
    ) -> Result<Vec<VerificationRecord>, RepositoryError> {
        offline()
    }
}

impl SanctionRepository for UnavailableStore {
    fn insert_sanction(&self, _: Sanction) -> Result<Sanction, RepositoryError> {
        offline()
    }

    fn fetch_sanction(&self, _: &ApplicationId) -> Result<Option<Sanction>, RepositoryError> {
        offline()
    }

    fn update_sanction_status(
        &self,
        _: &ApplicationId,
        _: SanctionStatus,
    ) -> Result<Sanction, RepositoryError> {
        offline()
    }
}

impl DisbursementRepository for UnavailableStore {
    fn insert_disbursement(&self, _: Disbursement) -> Result<Disbursement, RepositoryError> {
        offline()
    }

    fn fetch_disbursement(
        &self,
        _: &ApplicationId,
    ) -> Result<Option<Disbursement>, RepositoryError> {
        offline()
    }

    fn disbursements_for_organization(
        &self,
        _: &OrganizationId,
    ) -> Result<Vec<Disbursement>, RepositoryError> {
        offline()
    }

    fn update_disbursement(
        &self,
        _: &ApplicationId,
        _: DisbursementStatus,
        _: Option<String>,
        _: bool,
    ) -> Result<Disbursement, RepositoryError> {
        offline()
    }
}

impl DocumentLookup for UnavailableStore {
    fn documents_for(&self, _: &ApplicationId) -> Result<Vec<GeneratedDocument>, RepositoryError> {
        offline()
    }
}

pub(super) fn router_with_service(
    service: LoanOriginationService<InMemoryLendingStore>,
) -> axum::Router {
    origination_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
