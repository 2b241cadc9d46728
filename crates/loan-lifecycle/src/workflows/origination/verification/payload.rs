use serde::{Deserialize, Serialize};

use super::VerificationType;

/// Provider response, tagged by the verification type that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationResponse {
    Pan {
        pan_number: String,
        #[serde(default)]
        name_on_card: Option<String>,
        #[serde(default)]
        name_match: Option<bool>,
    },
    Aadhaar {
        masked_number: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        address_match: Option<bool>,
    },
    BankAccount {
        #[serde(default)]
        account_number: Option<String>,
        #[serde(default)]
        ifsc: Option<String>,
        #[serde(default)]
        account_holder_name: Option<String>,
        #[serde(default)]
        bank_name: Option<String>,
        #[serde(default)]
        name_match_score: Option<u8>,
    },
    Employment {
        employer_name: String,
        #[serde(default)]
        designation: Option<String>,
        #[serde(default)]
        monthly_income: Option<u64>,
    },
    BankStatement {
        months_analysed: u8,
        #[serde(default)]
        average_monthly_balance: Option<i64>,
        #[serde(default)]
        average_monthly_credit: Option<i64>,
        #[serde(default)]
        bounced_transactions: u32,
    },
    CreditBureau {
        bureau: String,
        #[serde(default)]
        score: Option<u16>,
        #[serde(default)]
        active_accounts: u32,
        #[serde(default)]
        overdue_accounts: u32,
    },
    VideoKyc {
        session_id: String,
        #[serde(default)]
        agent: Option<String>,
        #[serde(default)]
        liveness_passed: Option<bool>,
    },
}

impl VerificationResponse {
    pub const fn verification_type(&self) -> VerificationType {
        match self {
            VerificationResponse::Pan { .. } => VerificationType::Pan,
            VerificationResponse::Aadhaar { .. } => VerificationType::Aadhaar,
            VerificationResponse::BankAccount { .. } => VerificationType::BankAccount,
            VerificationResponse::Employment { .. } => VerificationType::Employment,
            VerificationResponse::BankStatement { .. } => VerificationType::BankStatement,
            VerificationResponse::CreditBureau { .. } => VerificationType::CreditBureau,
            VerificationResponse::VideoKyc { .. } => VerificationType::VideoKyc,
        }
    }

    /// Payout details, present only when the account number is non-blank.
    pub fn bank_details(&self) -> Option<BankDetails> {
        match self {
            VerificationResponse::BankAccount {
                account_number: Some(account_number),
                ifsc,
                account_holder_name,
                bank_name,
                ..
            } if !account_number.trim().is_empty() => Some(BankDetails {
                account_number: account_number.trim().to_string(),
                ifsc: ifsc.clone(),
                account_holder_name: account_holder_name.clone(),
                bank_name: bank_name.clone(),
            }),
            _ => None,
        }
    }
}

/// Beneficiary account attached to a disbursal worklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_number: String,
    pub ifsc: Option<String>,
    pub account_holder_name: Option<String>,
    pub bank_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_by_type_tag() {
        let payload: VerificationResponse = serde_json::from_value(json!({
            "type": "credit_bureau",
            "bureau": "CIBIL",
            "score": 782,
            "active_accounts": 3
        }))
        .expect("credit bureau payload");

        assert_eq!(payload.verification_type(), VerificationType::CreditBureau);
        assert_eq!(
            payload,
            VerificationResponse::CreditBureau {
                bureau: "CIBIL".to_string(),
                score: Some(782),
                active_accounts: 3,
                overdue_accounts: 0,
            }
        );
    }

    #[test]
    fn rejects_fields_missing_from_variant() {
        let result = serde_json::from_value::<VerificationResponse>(json!({
            "type": "employment",
            "designation": "Engineer"
        }));
        assert!(result.is_err(), "employer_name is required");
    }

    #[test]
    fn blank_account_number_yields_no_bank_details() {
        let payload = VerificationResponse::BankAccount {
            account_number: Some("   ".to_string()),
            ifsc: Some("HDFC0000123".to_string()),
            account_holder_name: None,
            bank_name: None,
            name_match_score: None,
        };
        assert_eq!(payload.bank_details(), None);

        let payload = VerificationResponse::BankAccount {
            account_number: Some("50100012345678".to_string()),
            ifsc: Some("HDFC0000123".to_string()),
            account_holder_name: Some("Asha Rao".to_string()),
            bank_name: Some("HDFC Bank".to_string()),
            name_match_score: Some(96),
        };
        let details = payload.bank_details().expect("details present");
        assert_eq!(details.account_number, "50100012345678");
        assert_eq!(details.ifsc.as_deref(), Some("HDFC0000123"));
    }
}
