use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::disbursal::{DisbursalReadinessResolver, DisbursalStatus, DisbursalWorklistItem};
use super::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, Disbursement,
    DisbursementDraft, DisbursementStatus, OrganizationId, Sanction, SanctionDraft,
    SanctionStatus, Stage, MAX_AMOUNT,
};
use super::repository::{LendingStore, RepositoryError};
use super::stage::{StageEngine, TransitionOutcome, TransitionRequest};
use super::verification::{
    VerificationError, VerificationRecord, VerificationSubmission, VerificationSummary,
};

fn ensure_storable(field: &str, amount: u64) -> Result<(), LendingServiceError> {
    if amount > MAX_AMOUNT {
        return Err(LendingServiceError::InvalidInput(format!(
            "{field} must not exceed {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

/// Status change for an existing disbursement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementUpdate {
    pub status: DisbursementStatus,
    #[serde(default)]
    pub utr_number: Option<String>,
    #[serde(default)]
    pub proof_uploaded: bool,
}

/// Facade over the stage engine, verification aggregate, and readiness resolver.
///
/// Every operation is scoped by an explicit organization id.
pub struct LoanOriginationService<S> {
    store: Arc<S>,
    stages: StageEngine<S>,
    readiness: DisbursalReadinessResolver<S>,
}

impl<S> LoanOriginationService<S>
where
    S: LendingStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            stages: StageEngine::new(store.clone()),
            readiness: DisbursalReadinessResolver::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Intake a new application at `application_login` / `draft`.
    pub fn create_application(
        &self,
        organization_id: &OrganizationId,
        draft: ApplicationDraft,
    ) -> Result<Application, LendingServiceError> {
        if draft.applicant_name.trim().is_empty() {
            return Err(LendingServiceError::InvalidInput(
                "applicant_name must not be blank".to_string(),
            ));
        }
        if draft.requested_amount == 0 || draft.tenure_months == 0 {
            return Err(LendingServiceError::InvalidInput(
                "requested_amount and tenure_months must be positive".to_string(),
            ));
        }
        ensure_storable("requested_amount", draft.requested_amount)?;

        let now = Utc::now();
        let application = Application {
            id: self.store.allocate_application_id()?,
            organization_id: organization_id.clone(),
            applicant_name: draft.applicant_name.trim().to_string(),
            current_stage: Stage::ApplicationLogin,
            status: ApplicationStatus::Draft,
            requested_amount: draft.requested_amount,
            approved_amount: None,
            tenure_months: draft.tenure_months,
            assigned_to: draft.assigned_to,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert_application(application)?;
        info!(application_id = %stored.id, organization_id = %organization_id, "application created");
        Ok(stored)
    }

    pub fn get_application(
        &self,
        organization_id: &OrganizationId,
        application_id: &ApplicationId,
    ) -> Result<Application, LendingServiceError> {
        let application = self
            .store
            .fetch_application(organization_id, application_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(application)
    }

    pub fn list_applications(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Application>, LendingServiceError> {
        Ok(self.store.list_applications(organization_id)?)
    }

    /// Validate and upsert a verification result. Unknown types never reach storage.
    pub fn submit_verification(
        &self,
        organization_id: &OrganizationId,
        submission: VerificationSubmission,
    ) -> Result<VerificationRecord, LendingServiceError> {
        let application_id = submission.application_id.clone();
        let update = submission.validate().inspect_err(|err| {
            warn!(application_id = %application_id, error = %err, "verification rejected at boundary");
        })?;

        self.get_application(organization_id, &update.application_id)?;
        let record = self.store.upsert_verification(update)?;
        info!(
            application_id = %record.application_id,
            verification_type = %record.verification_type,
            status = record.status.label(),
            "verification recorded"
        );
        Ok(record)
    }

    pub fn verifications(
        &self,
        organization_id: &OrganizationId,
        application_id: &ApplicationId,
    ) -> Result<Vec<VerificationRecord>, LendingServiceError> {
        self.get_application(organization_id, application_id)?;
        Ok(self.store.verifications_for(application_id)?)
    }

    /// Freshly computed from the records on each call.
    pub fn verification_summary(
        &self,
        organization_id: &OrganizationId,
        application_id: &ApplicationId,
    ) -> Result<VerificationSummary, LendingServiceError> {
        let records = self.verifications(organization_id, application_id)?;
        Ok(VerificationSummary::from_records(
            application_id.clone(),
            &records,
        ))
    }

    pub fn transition(
        &self,
        organization_id: &OrganizationId,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, LendingServiceError> {
        Ok(self.stages.transition(organization_id, request)?)
    }

    /// Abort the application from any non-terminal stage.
    pub fn cancel(
        &self,
        organization_id: &OrganizationId,
        application_id: &ApplicationId,
        expected_stage: Stage,
    ) -> Result<TransitionOutcome, LendingServiceError> {
        if expected_stage.is_terminal() {
            return Err(LendingServiceError::TerminalStage {
                stage: expected_stage,
            });
        }
        self.transition(
            organization_id,
            &TransitionRequest {
                application_id: application_id.clone(),
                expected_stage,
                new_stage: Stage::Cancelled,
                new_status: ApplicationStatus::Cancelled,
            },
        )
    }

    /// Issue the single sanction for an approved application.
    pub fn issue_sanction(
        &self,
        organization_id: &OrganizationId,
        draft: SanctionDraft,
    ) -> Result<Sanction, LendingServiceError> {
        let application = self.get_application(organization_id, &draft.application_id)?;
        if !application.current_stage.accepts_sanction() {
            return Err(LendingServiceError::SanctionNotAllowed {
                stage: application.current_stage,
            });
        }
        if draft.sanctioned_amount == 0 {
            return Err(LendingServiceError::InvalidInput(
                "sanctioned_amount must be positive".to_string(),
            ));
        }
        ensure_storable("sanctioned_amount", draft.sanctioned_amount)?;
        ensure_storable("each fee", draft.fees.largest())?;
        match draft.fees.total() {
            Some(total) if total < draft.sanctioned_amount => {}
            _ => {
                return Err(LendingServiceError::InvalidInput(
                    "fees must be less than the sanctioned amount".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let sanction = self.store.insert_sanction(Sanction {
            application_id: draft.application_id,
            sanctioned_amount: draft.sanctioned_amount,
            fees: draft.fees,
            valid_until: draft.valid_until,
            status: SanctionStatus::Pending,
            created_at: now,
            updated_at: now,
        })?;

        if application.approved_amount.is_none() {
            self.store.set_approved_amount(
                organization_id,
                &application.id,
                sanction.sanctioned_amount,
            )?;
        }
        info!(application_id = %application.id, amount = sanction.sanctioned_amount, "sanction issued");
        Ok(sanction)
    }

    pub fn sign_sanction(
        &self,
        organization_id: &OrganizationId,
        application_id: &ApplicationId,
    ) -> Result<Sanction, LendingServiceError> {
        self.get_application(organization_id, application_id)?;
        Ok(self
            .store
            .update_sanction_status(application_id, SanctionStatus::Signed)?)
    }

    /// Record released funds. Only a `ready` application can receive its first disbursement.
    pub fn record_disbursement(
        &self,
        organization_id: &OrganizationId,
        draft: DisbursementDraft,
    ) -> Result<Disbursement, LendingServiceError> {
        let application = self.get_application(organization_id, &draft.application_id)?;
        match self.readiness.status_for(&application)? {
            Some(DisbursalStatus::Ready) => {}
            status => return Err(LendingServiceError::DisbursalNotReady { status }),
        }
        if draft.amount == 0 {
            return Err(LendingServiceError::InvalidInput(
                "disbursement amount must be positive".to_string(),
            ));
        }
        ensure_storable("disbursement amount", draft.amount)?;

        let now = Utc::now();
        let disbursement = self.store.insert_disbursement(Disbursement {
            application_id: draft.application_id,
            amount: draft.amount,
            utr_number: draft.utr_number.filter(|utr| !utr.trim().is_empty()),
            proof_uploaded: draft.proof_uploaded,
            status: DisbursementStatus::Pending,
            created_at: now,
            updated_at: now,
        })?;
        info!(application_id = %application.id, amount = disbursement.amount, "disbursement recorded");
        Ok(disbursement)
    }

    pub fn update_disbursement(
        &self,
        organization_id: &OrganizationId,
        application_id: &ApplicationId,
        update: DisbursementUpdate,
    ) -> Result<Disbursement, LendingServiceError> {
        self.get_application(organization_id, application_id)?;
        let existing = self
            .store
            .fetch_disbursement(application_id)?
            .ok_or(RepositoryError::NotFound)?;

        if existing.status == DisbursementStatus::Completed
            && update.status != DisbursementStatus::Completed
        {
            warn!(
                application_id = %application_id,
                requested = update.status.label(),
                "refused to reopen a completed disbursement"
            );
            return Err(LendingServiceError::DisbursementCompleted);
        }

        let utr_number = update.utr_number.filter(|utr| !utr.trim().is_empty());
        if update.status == DisbursementStatus::Completed
            && utr_number.is_none()
            && existing.utr_number.is_none()
        {
            return Err(LendingServiceError::InvalidInput(
                "a UTR number is required to complete a disbursement".to_string(),
            ));
        }

        Ok(self.store.update_disbursement(
            application_id,
            update.status,
            utr_number,
            update.proof_uploaded,
        )?)
    }

    pub fn disbursal_worklist(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<DisbursalWorklistItem>, LendingServiceError> {
        Ok(self.readiness.worklist(organization_id)?)
    }
}

/// Error raised by the origination service.
#[derive(Debug, thiserror::Error)]
pub enum LendingServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("application is already {stage} and cannot be cancelled")]
    TerminalStage { stage: Stage },
    #[error("a sanction cannot be issued while the application is {stage}")]
    SanctionNotAllowed { stage: Stage },
    #[error("application is not ready for disbursal (status {})", .status.map(DisbursalStatus::label).unwrap_or("not eligible"))]
    DisbursalNotReady { status: Option<DisbursalStatus> },
    #[error("disbursement is already completed and cannot change status")]
    DisbursementCompleted,
}
