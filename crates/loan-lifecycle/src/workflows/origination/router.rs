use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{
    ApplicationDraft, ApplicationId, ApplicationStatus, DisbursementDraft, FeeBreakdown,
    OrganizationId, SanctionDraft, Stage,
};
use super::repository::{LendingStore, RepositoryError};
use super::service::{DisbursementUpdate, LendingServiceError, LoanOriginationService};
use super::stage::{TransitionOutcome, TransitionRequest, STALE_TRANSITION_MESSAGE};
use super::verification::{
    VerificationGate, VerificationResponse, VerificationStatus, VerificationSubmission,
    VerificationSummary,
};

type SharedService<S> = Arc<LoanOriginationService<S>>;

/// Router builder exposing the lifecycle endpoints, all scoped under an organization.
pub fn origination_router<S>(service: SharedService<S>) -> Router
where
    S: LendingStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/orgs/:org_id/applications",
            post(create_application_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id",
            get(application_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/verifications",
            put(submit_verification_handler::<S>).get(verifications_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/verifications/summary",
            get(verification_summary_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/transitions",
            post(transition_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/cancel",
            post(cancel_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/sanction",
            post(issue_sanction_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/sanction/sign",
            post(sign_sanction_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/applications/:application_id/disbursement",
            post(record_disbursement_handler::<S>).put(update_disbursement_handler::<S>),
        )
        .route(
            "/api/v1/orgs/:org_id/disbursals",
            get(worklist_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerificationBody {
    pub(crate) verification_type: String,
    pub(crate) status: VerificationStatus,
    #[serde(default)]
    pub(crate) source: Option<String>,
    #[serde(default)]
    pub(crate) request_payload: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) response_payload: Option<VerificationResponse>,
    #[serde(default)]
    pub(crate) remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    pub(crate) expected_stage: Stage,
    pub(crate) new_stage: Stage,
    pub(crate) new_status: ApplicationStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelBody {
    pub(crate) expected_stage: Stage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SanctionBody {
    pub(crate) sanctioned_amount: u64,
    #[serde(default)]
    pub(crate) fees: FeeBreakdown,
    pub(crate) valid_until: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DisbursementBody {
    pub(crate) amount: u64,
    #[serde(default)]
    pub(crate) utr_number: Option<String>,
    #[serde(default)]
    pub(crate) proof_uploaded: bool,
}

#[derive(Debug, Serialize)]
struct VerificationSummaryView {
    #[serde(flatten)]
    summary: VerificationSummary,
    gate: VerificationGate,
}

fn error_response(err: LendingServiceError) -> Response {
    let status = match &err {
        LendingServiceError::Verification(_)
        | LendingServiceError::InvalidInput(_)
        | LendingServiceError::TerminalStage { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LendingServiceError::SanctionNotAllowed { .. }
        | LendingServiceError::DisbursalNotReady { .. }
        | LendingServiceError::DisbursementCompleted
        | LendingServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        LendingServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LendingServiceError::Repository(_) => {
            error!(error = %err, "origination request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn transition_response(outcome: TransitionOutcome) -> Response {
    match outcome {
        TransitionOutcome::Applied(application) => {
            let payload = json!({ "applied": true, "application": application });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        TransitionOutcome::Stale {
            expected_stage,
            current_stage,
        } => {
            let payload = json!({
                "applied": false,
                "error": STALE_TRANSITION_MESSAGE,
                "expected_stage": expected_stage,
                "current_stage": current_stage,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
    }
}

fn ids(org_id: String, application_id: String) -> (OrganizationId, ApplicationId) {
    (OrganizationId(org_id), ApplicationId(application_id))
}

pub(crate) async fn create_application_handler<S>(
    State(service): State<SharedService<S>>,
    Path(org_id): Path<String>,
    axum::Json(draft): axum::Json<ApplicationDraft>,
) -> Response
where
    S: LendingStore + 'static,
{
    match service.create_application(&OrganizationId(org_id), draft) {
        Ok(application) => (StatusCode::CREATED, axum::Json(application)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn application_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    match service.get_application(&org, &id) {
        Ok(application) => (StatusCode::OK, axum::Json(application)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_verification_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<VerificationBody>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    let submission = VerificationSubmission {
        application_id: id,
        verification_type: body.verification_type,
        status: body.status,
        source: body.source.unwrap_or_else(|| "manual".to_string()),
        request_payload: body.request_payload,
        response_payload: body.response_payload,
        remarks: body.remarks,
    };
    match service.submit_verification(&org, submission) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verifications_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    match service.verifications(&org, &id) {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verification_summary_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    match service.verification_summary(&org, &id) {
        Ok(summary) => {
            let gate = summary.gate();
            let view = VerificationSummaryView { summary, gate };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn transition_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<TransitionBody>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    let request = TransitionRequest {
        application_id: id,
        expected_stage: body.expected_stage,
        new_stage: body.new_stage,
        new_status: body.new_status,
    };
    match service.transition(&org, &request) {
        Ok(outcome) => transition_response(outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<CancelBody>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    match service.cancel(&org, &id, body.expected_stage) {
        Ok(outcome) => transition_response(outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn issue_sanction_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<SanctionBody>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    let draft = SanctionDraft {
        application_id: id,
        sanctioned_amount: body.sanctioned_amount,
        fees: body.fees,
        valid_until: body.valid_until,
    };
    match service.issue_sanction(&org, draft) {
        Ok(sanction) => (StatusCode::CREATED, axum::Json(sanction)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn sign_sanction_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    match service.sign_sanction(&org, &id) {
        Ok(sanction) => (StatusCode::OK, axum::Json(sanction)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn record_disbursement_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<DisbursementBody>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    let draft = DisbursementDraft {
        application_id: id,
        amount: body.amount,
        utr_number: body.utr_number,
        proof_uploaded: body.proof_uploaded,
    };
    match service.record_disbursement(&org, draft) {
        Ok(disbursement) => (StatusCode::CREATED, axum::Json(disbursement)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_disbursement_handler<S>(
    State(service): State<SharedService<S>>,
    Path((org_id, application_id)): Path<(String, String)>,
    axum::Json(update): axum::Json<DisbursementUpdate>,
) -> Response
where
    S: LendingStore + 'static,
{
    let (org, id) = ids(org_id, application_id);
    match service.update_disbursement(&org, &id, update) {
        Ok(disbursement) => (StatusCode::OK, axum::Json(disbursement)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn worklist_handler<S>(
    State(service): State<SharedService<S>>,
    Path(org_id): Path<String>,
) -> Response
where
    S: LendingStore + 'static,
{
    match service.disbursal_worklist(&OrganizationId(org_id)) {
        Ok(items) => (StatusCode::OK, axum::Json(items)).into_response(),
        Err(err) => error_response(err),
    }
}
