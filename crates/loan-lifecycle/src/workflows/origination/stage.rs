use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::domain::{Application, ApplicationId, ApplicationStatus, OrganizationId, Stage};
use super::repository::{ApplicationRepository, RepositoryError, StageSwap, SwapResult};

/// Shown to staff whenever their view of the stage was out of date.
pub const STALE_TRANSITION_MESSAGE: &str =
    "this application was just updated, refresh and try again";

/// Caller-supplied transition. The engine does not judge whether the pair is a
/// sensible lifecycle move; it only guarantees the move is applied against the
/// stage the caller saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub application_id: ApplicationId,
    pub expected_stage: Stage,
    pub new_stage: Stage,
    pub new_status: ApplicationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(Application),
    /// The persisted stage differed from `expected_stage`; nothing was written.
    Stale {
        expected_stage: Stage,
        current_stage: Stage,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Sole writer of `current_stage` and `status`, via optimistic compare-and-swap.
pub struct StageEngine<R: ?Sized> {
    repository: Arc<R>,
}

impl<R> StageEngine<R>
where
    R: ApplicationRepository + ?Sized,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Apply `request` if and only if the persisted stage still equals `expected_stage`.
    ///
    /// A mismatch is an expected outcome and comes back as [`TransitionOutcome::Stale`];
    /// storage failures come back as errors and are never reported as stale.
    pub fn transition(
        &self,
        organization_id: &OrganizationId,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let swap = StageSwap {
            organization_id: organization_id.clone(),
            application_id: request.application_id.clone(),
            expected_stage: request.expected_stage,
            new_stage: request.new_stage,
            new_status: request.new_status,
        };

        let result = self
            .repository
            .compare_and_swap_stage(&swap)
            .inspect_err(|err| {
                if !matches!(err, RepositoryError::NotFound) {
                    error!(
                        application_id = %request.application_id,
                        organization_id = %organization_id,
                        error = %err,
                        "stage transition failed to persist"
                    );
                }
            })?;

        match result {
            SwapResult::Applied(application) => {
                info!(
                    application_id = %request.application_id,
                    organization_id = %organization_id,
                    from = %request.expected_stage,
                    to = %request.new_stage,
                    status = %request.new_status,
                    "stage transition applied"
                );
                Ok(TransitionOutcome::Applied(application))
            }
            SwapResult::Stale { current_stage } => {
                debug!(
                    application_id = %request.application_id,
                    expected = %request.expected_stage,
                    current = %current_stage,
                    "stale stage transition rejected"
                );
                Ok(TransitionOutcome::Stale {
                    expected_stage: request.expected_stage,
                    current_stage,
                })
            }
        }
    }
}
