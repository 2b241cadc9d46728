//! Verification records, their typed provider payloads, and the gating aggregate.

mod payload;
mod summary;

pub use payload::{BankDetails, VerificationResponse};
pub use summary::{VerificationGate, VerificationSummary, VerificationTypeState};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, Timestamp};

/// Fixed set of independent identity and financial checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    Pan,
    Aadhaar,
    BankAccount,
    Employment,
    BankStatement,
    CreditBureau,
    VideoKyc,
}

impl VerificationType {
    pub const ALL: [VerificationType; 7] = [
        VerificationType::Pan,
        VerificationType::Aadhaar,
        VerificationType::BankAccount,
        VerificationType::Employment,
        VerificationType::BankStatement,
        VerificationType::CreditBureau,
        VerificationType::VideoKyc,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            VerificationType::Pan => "pan",
            VerificationType::Aadhaar => "aadhaar",
            VerificationType::BankAccount => "bank_account",
            VerificationType::Employment => "employment",
            VerificationType::BankStatement => "bank_statement",
            VerificationType::CreditBureau => "credit_bureau",
            VerificationType::VideoKyc => "video_kyc",
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VerificationType {
    type Err = VerificationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        VerificationType::ALL
            .into_iter()
            .find(|kind| kind.label() == normalized)
            .ok_or_else(|| VerificationError::InvalidVerificationType(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Success => "success",
            VerificationStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, VerificationStatus::Success | VerificationStatus::Failed)
    }
}

impl FromStr for VerificationStatus {
    type Err = VerificationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(VerificationError::InvalidStatus(value.to_string())),
        }
    }
}

/// The single active record for one (application, verification type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub application_id: ApplicationId,
    pub verification_type: VerificationType,
    pub status: VerificationStatus,
    pub source: String,
    pub request_payload: BTreeMap<String, String>,
    pub response_payload: Option<VerificationResponse>,
    pub remarks: Option<String>,
    pub verified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl VerificationRecord {
    /// Apply a newer result in place, keeping the original creation time.
    pub fn supersede(&mut self, update: VerificationUpdate, now: Timestamp) {
        self.status = update.status;
        self.source = update.source;
        self.request_payload = update.request_payload;
        self.response_payload = update.response_payload;
        self.remarks = update.remarks;
        self.verified_at = update.status.is_terminal().then_some(now);
        self.updated_at = now;
    }

    pub fn from_update(update: VerificationUpdate, now: Timestamp) -> Self {
        Self {
            application_id: update.application_id,
            verification_type: update.verification_type,
            status: update.status,
            source: update.source,
            request_payload: update.request_payload,
            response_payload: update.response_payload,
            remarks: update.remarks,
            verified_at: update.status.is_terminal().then_some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Inbound result as submitted by the provider integration or staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub application_id: ApplicationId,
    pub verification_type: String,
    pub status: VerificationStatus,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub request_payload: BTreeMap<String, String>,
    #[serde(default)]
    pub response_payload: Option<VerificationResponse>,
    #[serde(default)]
    pub remarks: Option<String>,
}

fn default_source() -> String {
    "manual".to_string()
}

impl VerificationSubmission {
    /// Boundary validation: the type must be known and the payload must belong to it.
    pub fn validate(self) -> Result<VerificationUpdate, VerificationError> {
        let verification_type: VerificationType = self.verification_type.parse()?;

        if let Some(payload) = &self.response_payload {
            let found = payload.verification_type();
            if found != verification_type {
                return Err(VerificationError::PayloadMismatch {
                    expected: verification_type,
                    found,
                });
            }
        }

        Ok(VerificationUpdate {
            application_id: self.application_id,
            verification_type,
            status: self.status,
            source: self.source,
            request_payload: self.request_payload,
            response_payload: self.response_payload,
            remarks: self.remarks.filter(|remarks| !remarks.trim().is_empty()),
        })
    }
}

/// Validated submission, ready for the store's upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationUpdate {
    pub application_id: ApplicationId,
    pub verification_type: VerificationType,
    pub status: VerificationStatus,
    pub source: String,
    pub request_payload: BTreeMap<String, String>,
    pub response_payload: Option<VerificationResponse>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("unknown verification type '{0}'")]
    InvalidVerificationType(String),
    #[error("unknown verification status '{0}'")]
    InvalidStatus(String),
    #[error("response payload for {found} submitted as {expected}")]
    PayloadMismatch {
        expected: VerificationType,
        found: VerificationType,
    },
}
