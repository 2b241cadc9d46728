use chrono::{Duration, Local, Utc};
use clap::Args;
use loan_lifecycle::error::AppError;
use loan_lifecycle::workflows::origination::{
    ApplicationDraft, ApplicationId, ApplicationStatus, DisbursalWorklistItem, DisbursementDraft,
    DisbursementStatus, DisbursementUpdate, DocumentType, FeeBreakdown, GeneratedDocument,
    InMemoryLendingStore, LoanOriginationService, OrganizationId, SanctionDraft, Stage,
    TransitionOutcome, TransitionRequest, VerificationResponse, VerificationStatus,
    VerificationSubmission, VerificationType,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Organization the demo application is created under.
    #[arg(long, default_value = "org-demo")]
    pub(crate) organization: String,
    /// Fail the bank statement check to show the override gate.
    #[arg(long)]
    pub(crate) with_failed_check: bool,
    /// Stop once the application reaches the disbursal worklist.
    #[arg(long)]
    pub(crate) skip_disbursement: bool,
}

type DemoService = LoanOriginationService<InMemoryLendingStore>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        organization,
        with_failed_check,
        skip_disbursement,
    } = args;
    let org = OrganizationId(organization);
    let store = Arc::new(InMemoryLendingStore::new());
    let service = LoanOriginationService::new(store.clone());

    println!("Loan lifecycle demo ({org})");
    let application = service.create_application(
        &org,
        ApplicationDraft {
            applicant_name: "Meera Iyer".to_string(),
            requested_amount: 750_000,
            tenure_months: 48,
            assigned_to: Some("credit-officer-2".to_string()),
        },
    )?;
    println!(
        "- created {} for {} at {}",
        application.id, application.applicant_name, application.current_stage
    );

    advance(&service, &org, &application.id, Stage::ApplicationLogin, Stage::Verification)?;

    for kind in VerificationType::ALL {
        let failed = with_failed_check && kind == VerificationType::BankStatement;
        let status = if failed {
            VerificationStatus::Failed
        } else {
            VerificationStatus::Success
        };
        service.submit_verification(
            &org,
            VerificationSubmission {
                application_id: application.id.clone(),
                verification_type: kind.label().to_string(),
                status,
                source: "demo".to_string(),
                request_payload: BTreeMap::new(),
                response_payload: demo_response(kind),
                remarks: failed.then(|| "three bounced debits in the last quarter".to_string()),
            },
        )?;
    }

    let summary = service.verification_summary(&org, &application.id)?;
    println!(
        "\nVerification summary: all_success={} any_failed={} all_processed={}",
        summary.all_success, summary.any_failed, summary.all_processed
    );
    for check in &summary.checks {
        println!("- {}: {}", check.verification_type, check.status.label());
    }
    let gate = summary.gate();
    if !gate.can_proceed() {
        println!("Verification gate is blocked; stopping.");
        return Ok(());
    }
    if gate.requires_override() {
        println!("Failed checks present: proceeding under manual override");
    }

    advance(&service, &org, &application.id, Stage::Verification, Stage::CreditAssessment)?;
    advance(&service, &org, &application.id, Stage::CreditAssessment, Stage::ApprovalPending)?;

    let approval = TransitionRequest {
        application_id: application.id.clone(),
        expected_stage: Stage::ApprovalPending,
        new_stage: Stage::Approved,
        new_status: ApplicationStatus::Approved,
    };
    print_outcome("approve", &service.transition(&org, &approval)?);
    // A second officer still looking at approval_pending.
    print_outcome("approve again", &service.transition(&org, &approval)?);

    let sanction = service.issue_sanction(
        &org,
        SanctionDraft {
            application_id: application.id.clone(),
            sanctioned_amount: 700_000,
            fees: FeeBreakdown {
                processing_fee: 7_000,
                documentation_fee: 1_500,
                insurance_premium: 4_200,
                tax: 1_530,
            },
            valid_until: (Local::now() + Duration::days(30)).date_naive(),
        },
    )?;
    println!(
        "\nSanction issued: {} (fees {}, net disbursable {})",
        sanction.sanctioned_amount,
        sanction.fees.total().unwrap_or_default(),
        sanction.net_disbursable()
    );
    service.sign_sanction(&org, &application.id)?;
    println!("- sanction letter accepted by applicant");

    advance(&service, &org, &application.id, Stage::Approved, Stage::Sanctioned)?;
    store.register_document(GeneratedDocument {
        application_id: application.id.clone(),
        document_type: DocumentType::CombinedLoanPack,
        customer_signed: true,
        signed_at: Some(Utc::now()),
    })?;
    println!("- combined loan pack signed");

    print_worklist("Disbursal worklist", &service.disbursal_worklist(&org)?);
    if skip_disbursement {
        return Ok(());
    }

    service.record_disbursement(
        &org,
        DisbursementDraft {
            application_id: application.id.clone(),
            amount: sanction.net_disbursable(),
            utr_number: None,
            proof_uploaded: false,
        },
    )?;
    print_worklist("After release", &service.disbursal_worklist(&org)?);

    service.update_disbursement(
        &org,
        &application.id,
        DisbursementUpdate {
            status: DisbursementStatus::Completed,
            utr_number: Some("HDFCR52026101400731".to_string()),
            proof_uploaded: true,
        },
    )?;
    advance(&service, &org, &application.id, Stage::Sanctioned, Stage::Disbursed)?;
    print_worklist("After bank confirmation", &service.disbursal_worklist(&org)?);

    Ok(())
}

fn advance(
    service: &DemoService,
    org: &OrganizationId,
    application_id: &ApplicationId,
    from: Stage,
    to: Stage,
) -> Result<(), AppError> {
    let status = match to {
        Stage::Approved | Stage::Sanction | Stage::Sanctioned | Stage::DisbursementPending => {
            ApplicationStatus::Approved
        }
        Stage::Disbursed => ApplicationStatus::Disbursed,
        _ => ApplicationStatus::InProgress,
    };
    let outcome = service.transition(
        org,
        &TransitionRequest {
            application_id: application_id.clone(),
            expected_stage: from,
            new_stage: to,
            new_status: status,
        },
    )?;
    print_outcome(to.label(), &outcome);
    Ok(())
}

fn print_outcome(action: &str, outcome: &TransitionOutcome) {
    match outcome {
        TransitionOutcome::Applied(application) => println!(
            "- {action}: now {} ({})",
            application.current_stage,
            application.status.label()
        ),
        TransitionOutcome::Stale { current_stage, .. } => println!(
            "- {action}: rejected, stage is already {current_stage}"
        ),
    }
}

fn print_worklist(title: &str, items: &[DisbursalWorklistItem]) {
    println!("\n{title}");
    if items.is_empty() {
        println!("- nothing awaiting disbursal");
        return;
    }
    for item in items {
        let account = match (&item.bank_details, item.bank_details_missing) {
            (Some(details), _) => details.account_number.clone(),
            (None, true) => "bank details required".to_string(),
            (None, false) => "-".to_string(),
        };
        println!(
            "- {} | {} | {} | net {} | account {}",
            item.application_id,
            item.applicant_name,
            item.status.label(),
            item.net_disbursable.unwrap_or_default(),
            account
        );
        if let Some(disbursement) = &item.disbursement {
            println!(
                "    released {} utr {} proof {}",
                disbursement.amount,
                disbursement.utr_number.as_deref().unwrap_or("pending"),
                if disbursement.proof_uploaded { "yes" } else { "no" }
            );
        }
    }
}

fn demo_response(kind: VerificationType) -> Option<VerificationResponse> {
    let response = match kind {
        VerificationType::BankAccount => VerificationResponse::BankAccount {
            account_number: Some("000401571234".to_string()),
            ifsc: Some("ICIC0000004".to_string()),
            account_holder_name: Some("MEERA IYER".to_string()),
            bank_name: Some("ICICI Bank".to_string()),
            name_match_score: Some(94),
        },
        VerificationType::CreditBureau => VerificationResponse::CreditBureau {
            bureau: "Experian".to_string(),
            score: Some(764),
            active_accounts: 3,
            overdue_accounts: 0,
        },
        VerificationType::Employment => VerificationResponse::Employment {
            employer_name: "Nilgiri Software Pvt Ltd".to_string(),
            designation: Some("Senior Engineer".to_string()),
            monthly_income: Some(145_000),
        },
        _ => return None,
    };
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end() {
        run_demo(DemoArgs {
            organization: "org-test".to_string(),
            with_failed_check: true,
            skip_disbursement: false,
        })
        .expect("demo completes");
    }

    #[test]
    fn demo_responses_match_their_type() {
        for kind in VerificationType::ALL {
            if let Some(response) = demo_response(kind) {
                assert_eq!(response.verification_type(), kind);
            }
        }
    }
}
