use super::domain::{
    Application, ApplicationId, ApplicationStatus, Disbursement, DisbursementStatus,
    GeneratedDocument, OrganizationId, Sanction, SanctionStatus, Stage,
};
use super::verification::{VerificationRecord, VerificationUpdate};

/// Conditional stage write: applied only while the persisted stage equals `expected_stage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSwap {
    pub organization_id: OrganizationId,
    pub application_id: ApplicationId,
    pub expected_stage: Stage,
    pub new_stage: Stage,
    pub new_status: ApplicationStatus,
}

/// Result of a [`StageSwap`] that found the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapResult {
    /// The row as written by the swap itself.
    Applied(Application),
    Stale { current_stage: Stage },
}

/// Application storage. `compare_and_swap_stage` is the only path that writes the stage.
pub trait ApplicationRepository: Send + Sync {
    /// Reserve a fresh application id. Ids are never reused, including across restarts
    /// of a durable store.
    fn allocate_application_id(&self) -> Result<ApplicationId, RepositoryError>;

    fn insert_application(&self, application: Application) -> Result<Application, RepositoryError>;

    fn fetch_application(
        &self,
        organization_id: &OrganizationId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;

    fn list_applications(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Application>, RepositoryError>;

    /// Atomically compares the persisted stage and writes the new stage and status.
    ///
    /// The compare, the write, and the read of the outcome happen in one step, so an
    /// applied swap is never followed by a separate read that could fail. Returns
    /// `NotFound` when the application does not exist within the organization.
    fn compare_and_swap_stage(&self, swap: &StageSwap) -> Result<SwapResult, RepositoryError>;

    fn set_approved_amount(
        &self,
        organization_id: &OrganizationId,
        id: &ApplicationId,
        amount: u64,
    ) -> Result<(), RepositoryError>;
}

/// One active record per (application, verification type).
pub trait VerificationRepository: Send + Sync {
    /// Inserts on first attempt and supersedes in place afterwards.
    fn upsert_verification(
        &self,
        update: VerificationUpdate,
    ) -> Result<VerificationRecord, RepositoryError>;

    fn verifications_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<VerificationRecord>, RepositoryError>;
}

pub trait SanctionRepository: Send + Sync {
    /// Fails with `Conflict` if the application already has a sanction.
    fn insert_sanction(&self, sanction: Sanction) -> Result<Sanction, RepositoryError>;

    fn fetch_sanction(&self, application_id: &ApplicationId)
        -> Result<Option<Sanction>, RepositoryError>;

    fn update_sanction_status(
        &self,
        application_id: &ApplicationId,
        status: SanctionStatus,
    ) -> Result<Sanction, RepositoryError>;
}

pub trait DisbursementRepository: Send + Sync {
    /// Fails with `Conflict` if the application already has a disbursement.
    fn insert_disbursement(
        &self,
        disbursement: Disbursement,
    ) -> Result<Disbursement, RepositoryError>;

    fn fetch_disbursement(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Disbursement>, RepositoryError>;

    /// Disbursements whose application belongs to the organization.
    fn disbursements_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Disbursement>, RepositoryError>;

    fn update_disbursement(
        &self,
        application_id: &ApplicationId,
        status: DisbursementStatus,
        utr_number: Option<String>,
        proof_uploaded: bool,
    ) -> Result<Disbursement, RepositoryError>;
}

/// Read-only view onto the document service's generated documents.
pub trait DocumentLookup: Send + Sync {
    fn documents_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<GeneratedDocument>, RepositoryError>;
}

/// Everything the origination service needs from one backing store.
pub trait LendingStore:
    ApplicationRepository
    + VerificationRepository
    + SanctionRepository
    + DisbursementRepository
    + DocumentLookup
{
}

impl<T> LendingStore for T where
    T: ApplicationRepository
        + VerificationRepository
        + SanctionRepository
        + DisbursementRepository
        + DocumentLookup
{
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}
