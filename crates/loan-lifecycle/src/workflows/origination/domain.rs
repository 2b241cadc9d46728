use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

/// Upper bound for any money amount, set by the signed 64-bit storage column.
pub const MAX_AMOUNT: u64 = i64::MAX as u64;

/// Identifier wrapper for loan applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    /// Id for the `sequence`-th application allocated by a store.
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("loan-{sequence:06}"))
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant scope. Every read and write is keyed by one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an application in the loan lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ApplicationLogin,
    DocumentCollection,
    Verification,
    CreditAssessment,
    ApprovalPending,
    Approved,
    Rejected,
    /// Sanction letter is being prepared for the approved application.
    Sanction,
    Sanctioned,
    DisbursementPending,
    Disbursed,
    Closed,
    Cancelled,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::ApplicationLogin,
        Stage::DocumentCollection,
        Stage::Verification,
        Stage::CreditAssessment,
        Stage::ApprovalPending,
        Stage::Approved,
        Stage::Rejected,
        Stage::Sanction,
        Stage::Sanctioned,
        Stage::DisbursementPending,
        Stage::Disbursed,
        Stage::Closed,
        Stage::Cancelled,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Stage::ApplicationLogin => "application_login",
            Stage::DocumentCollection => "document_collection",
            Stage::Verification => "verification",
            Stage::CreditAssessment => "credit_assessment",
            Stage::ApprovalPending => "approval_pending",
            Stage::Approved => "approved",
            Stage::Rejected => "rejected",
            Stage::Sanction => "sanction",
            Stage::Sanctioned => "sanctioned",
            Stage::DisbursementPending => "disbursement_pending",
            Stage::Disbursed => "disbursed",
            Stage::Closed => "closed",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Rejected, closed, and cancelled applications never move again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Stage::Rejected | Stage::Closed | Stage::Cancelled)
    }

    /// Stages where the disbursal worklist considers an application.
    pub const fn awaits_disbursal(self) -> bool {
        matches!(
            self,
            Stage::Sanction | Stage::Sanctioned | Stage::DisbursementPending
        )
    }

    /// Stages from which a sanction may be issued.
    pub const fn accepts_sanction(self) -> bool {
        matches!(self, Stage::Approved | Stage::Sanction | Stage::Sanctioned)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.label() == normalized)
            .ok_or_else(|| UnknownStage(value.to_string()))
    }
}

/// Coarse lifecycle flag carried alongside the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    New,
    InProgress,
    Approved,
    Rejected,
    Disbursed,
    Cancelled,
    Closed,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        ApplicationStatus::Draft,
        ApplicationStatus::New,
        ApplicationStatus::InProgress,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::Disbursed,
        ApplicationStatus::Cancelled,
        ApplicationStatus::Closed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::New => "new",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Disbursed => "disbursed",
            ApplicationStatus::Cancelled => "cancelled",
            ApplicationStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.label() == normalized)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// The central entity. `current_stage` and `status` are written only by the stage engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub organization_id: OrganizationId,
    pub applicant_name: String,
    pub current_stage: Stage,
    pub status: ApplicationStatus,
    pub requested_amount: u64,
    pub approved_amount: Option<u64>,
    pub tenure_months: u16,
    pub assigned_to: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Intake payload for a new application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub applicant_name: String,
    pub requested_amount: u64,
    pub tenure_months: u16,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionStatus {
    Pending,
    Signed,
}

impl SanctionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SanctionStatus::Pending => "pending",
            SanctionStatus::Signed => "signed",
        }
    }
}

impl FromStr for SanctionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "signed" => Ok(Self::Signed),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// Charges deducted from or added to the sanctioned amount, in minor currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub processing_fee: u64,
    #[serde(default)]
    pub documentation_fee: u64,
    #[serde(default)]
    pub insurance_premium: u64,
    #[serde(default)]
    pub tax: u64,
}

impl FeeBreakdown {
    /// Sum of every charge, or `None` if it does not fit in a `u64`.
    pub fn total(&self) -> Option<u64> {
        self.processing_fee
            .checked_add(self.documentation_fee)?
            .checked_add(self.insurance_premium)?
            .checked_add(self.tax)
    }

    fn amounts(&self) -> [u64; 4] {
        [
            self.processing_fee,
            self.documentation_fee,
            self.insurance_premium,
            self.tax,
        ]
    }

    /// Largest single charge, for range checks against [`MAX_AMOUNT`].
    pub fn largest(&self) -> u64 {
        self.amounts().into_iter().max().unwrap_or_default()
    }
}

/// Formal approval artifact. At most one per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sanction {
    pub application_id: ApplicationId,
    pub sanctioned_amount: u64,
    pub fees: FeeBreakdown,
    pub valid_until: NaiveDate,
    pub status: SanctionStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Sanction {
    pub fn net_disbursable(&self) -> u64 {
        self.fees
            .total()
            .map_or(0, |fees| self.sanctioned_amount.saturating_sub(fees))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionDraft {
    pub application_id: ApplicationId,
    pub sanctioned_amount: u64,
    #[serde(default)]
    pub fees: FeeBreakdown,
    pub valid_until: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
    Pending,
    Completed,
    Failed,
}

impl DisbursementStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DisbursementStatus::Pending => "pending",
            DisbursementStatus::Completed => "completed",
            DisbursementStatus::Failed => "failed",
        }
    }
}

impl FromStr for DisbursementStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// Record of released funds. At most one per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    pub application_id: ApplicationId,
    pub amount: u64,
    pub utr_number: Option<String>,
    pub proof_uploaded: bool,
    pub status: DisbursementStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementDraft {
    pub application_id: ApplicationId,
    pub amount: u64,
    #[serde(default)]
    pub utr_number: Option<String>,
    #[serde(default)]
    pub proof_uploaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    SanctionLetter,
    LoanAgreement,
    CombinedLoanPack,
    KeyFactStatement,
}

impl DocumentType {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::SanctionLetter => "sanction_letter",
            DocumentType::LoanAgreement => "loan_agreement",
            DocumentType::CombinedLoanPack => "combined_loan_pack",
            DocumentType::KeyFactStatement => "key_fact_statement",
        }
    }
}

impl FromStr for DocumentType {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sanction_letter" => Ok(Self::SanctionLetter),
            "loan_agreement" => Ok(Self::LoanAgreement),
            "combined_loan_pack" => Ok(Self::CombinedLoanPack),
            "key_fact_statement" => Ok(Self::KeyFactStatement),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// Document produced by the document service, read here only for its signed flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub application_id: ApplicationId,
    pub document_type: DocumentType,
    pub customer_signed: bool,
    pub signed_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_round_trip_through_from_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.label().parse::<Stage>().expect("label parses"), stage);
        }
        assert_eq!(
            "moon_landing".parse::<Stage>(),
            Err(UnknownStage("moon_landing".to_string()))
        );
    }

    #[test]
    fn terminal_stages_are_exits() {
        let terminal: Vec<_> = Stage::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Stage::Rejected, Stage::Closed, Stage::Cancelled]);
    }

    #[test]
    fn stage_serializes_as_snake_case() {
        let json = serde_json::to_string(&Stage::DisbursementPending).expect("serializes");
        assert_eq!(json, "\"disbursement_pending\"");
    }

    #[test]
    fn net_disbursable_subtracts_fees() {
        let sanction = Sanction {
            application_id: ApplicationId("app-1".to_string()),
            sanctioned_amount: 500_000,
            fees: FeeBreakdown {
                processing_fee: 5_000,
                documentation_fee: 1_000,
                insurance_premium: 0,
                tax: 900,
            },
            valid_until: NaiveDate::from_ymd_opt(2026, 12, 31).expect("valid"),
            status: SanctionStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(sanction.net_disbursable(), 493_100);
    }

    #[test]
    fn fee_total_reports_overflow() {
        let fees = FeeBreakdown {
            processing_fee: u64::MAX,
            tax: 1,
            ..FeeBreakdown::default()
        };
        assert_eq!(fees.total(), None);
        assert_eq!(fees.largest(), u64::MAX);
    }

    #[test]
    fn sequence_ids_are_zero_padded() {
        assert_eq!(ApplicationId::from_sequence(42).0, "loan-000042");
    }
}
