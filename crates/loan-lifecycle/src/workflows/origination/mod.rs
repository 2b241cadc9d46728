//! Loan application lifecycle: stage transitions, verification gating, and disbursal readiness.
//!
//! The stage engine is the only writer of an application's stage and status. The
//! verification summary and the disbursal worklist are derived from stored records on
//! every read and never persisted.

pub mod disbursal;
pub mod domain;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod stage;
pub mod verification;

#[cfg(test)]
mod tests;

pub use disbursal::{
    DisbursalReadinessResolver, DisbursalStatus, DisbursalWorklistItem, DisbursementView,
};
pub use domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, Disbursement,
    DisbursementDraft, DisbursementStatus, DocumentType, FeeBreakdown, GeneratedDocument,
    OrganizationId, Sanction, SanctionDraft, SanctionStatus, Stage, MAX_AMOUNT,
};
pub use memory::InMemoryLendingStore;
pub use repository::{
    ApplicationRepository, DisbursementRepository, DocumentLookup, LendingStore,
    RepositoryError, SanctionRepository, StageSwap, SwapResult, VerificationRepository,
};
pub use router::origination_router;
pub use service::{DisbursementUpdate, LendingServiceError, LoanOriginationService};
pub use sqlite::SqliteLendingStore;
pub use stage::{StageEngine, TransitionOutcome, TransitionRequest, STALE_TRANSITION_MESSAGE};
pub use verification::{
    BankDetails, VerificationError, VerificationGate, VerificationRecord, VerificationResponse,
    VerificationStatus, VerificationSubmission, VerificationSummary, VerificationType,
};
