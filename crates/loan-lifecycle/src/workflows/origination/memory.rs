use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::domain::{
    Application, ApplicationId, Disbursement, DisbursementStatus, GeneratedDocument,
    OrganizationId, Sanction, SanctionStatus,
};
use super::repository::{
    ApplicationRepository, DisbursementRepository, DocumentLookup, RepositoryError,
    SanctionRepository, StageSwap, SwapResult, VerificationRepository,
};
use super::verification::{VerificationRecord, VerificationType, VerificationUpdate};

#[derive(Default)]
struct MemoryState {
    last_application_sequence: u64,
    applications: HashMap<ApplicationId, Application>,
    verifications: HashMap<(ApplicationId, VerificationType), VerificationRecord>,
    sanctions: HashMap<ApplicationId, Sanction>,
    disbursements: HashMap<ApplicationId, Disbursement>,
    documents: HashMap<ApplicationId, Vec<GeneratedDocument>>,
}

/// Process-local store. One lock guards every table so each call is a single atomic step.
#[derive(Default, Clone)]
pub struct InMemoryLendingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Record a document produced by the document service. Replaces any prior
    /// document of the same type for the application.
    pub fn register_document(&self, document: GeneratedDocument) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.applications.contains_key(&document.application_id) {
            return Err(RepositoryError::NotFound);
        }
        let documents = state
            .documents
            .entry(document.application_id.clone())
            .or_default();
        documents.retain(|existing| existing.document_type != document.document_type);
        documents.push(document);
        Ok(())
    }
}

impl ApplicationRepository for InMemoryLendingStore {
    fn allocate_application_id(&self) -> Result<ApplicationId, RepositoryError> {
        let mut state = self.lock()?;
        state.last_application_sequence += 1;
        Ok(ApplicationId::from_sequence(state.last_application_sequence))
    }

    fn insert_application(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut state = self.lock()?;
        if state.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch_application(
        &self,
        organization_id: &OrganizationId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .applications
            .get(id)
            .filter(|application| &application.organization_id == organization_id)
            .cloned())
    }

    fn list_applications(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Application>, RepositoryError> {
        let state = self.lock()?;
        let mut applications: Vec<Application> = state
            .applications
            .values()
            .filter(|application| &application.organization_id == organization_id)
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(applications)
    }

    fn compare_and_swap_stage(&self, swap: &StageSwap) -> Result<SwapResult, RepositoryError> {
        let mut state = self.lock()?;
        let application = state
            .applications
            .get_mut(&swap.application_id)
            .filter(|application| application.organization_id == swap.organization_id)
            .ok_or(RepositoryError::NotFound)?;

        if application.current_stage != swap.expected_stage {
            return Ok(SwapResult::Stale {
                current_stage: application.current_stage,
            });
        }

        application.current_stage = swap.new_stage;
        application.status = swap.new_status;
        application.updated_at = Utc::now();
        Ok(SwapResult::Applied(application.clone()))
    }

    fn set_approved_amount(
        &self,
        organization_id: &OrganizationId,
        id: &ApplicationId,
        amount: u64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let application = state
            .applications
            .get_mut(id)
            .filter(|application| &application.organization_id == organization_id)
            .ok_or(RepositoryError::NotFound)?;
        application.approved_amount = Some(amount);
        application.updated_at = Utc::now();
        Ok(())
    }
}

impl VerificationRepository for InMemoryLendingStore {
    fn upsert_verification(
        &self,
        update: VerificationUpdate,
    ) -> Result<VerificationRecord, RepositoryError> {
        let mut state = self.lock()?;
        if !state.applications.contains_key(&update.application_id) {
            return Err(RepositoryError::NotFound);
        }

        let now = Utc::now();
        let key = (update.application_id.clone(), update.verification_type);
        let record = match state.verifications.get_mut(&key) {
            Some(record) => {
                record.supersede(update, now);
                record.clone()
            }
            None => {
                let record = VerificationRecord::from_update(update, now);
                state.verifications.insert(key, record.clone());
                record
            }
        };
        Ok(record)
    }

    fn verifications_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<VerificationRecord>, RepositoryError> {
        let state = self.lock()?;
        let mut records: Vec<VerificationRecord> = state
            .verifications
            .values()
            .filter(|record| &record.application_id == application_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.verification_type);
        Ok(records)
    }
}

impl SanctionRepository for InMemoryLendingStore {
    fn insert_sanction(&self, sanction: Sanction) -> Result<Sanction, RepositoryError> {
        let mut state = self.lock()?;
        if state.sanctions.contains_key(&sanction.application_id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .sanctions
            .insert(sanction.application_id.clone(), sanction.clone());
        Ok(sanction)
    }

    fn fetch_sanction(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Sanction>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.sanctions.get(application_id).cloned())
    }

    fn update_sanction_status(
        &self,
        application_id: &ApplicationId,
        status: SanctionStatus,
    ) -> Result<Sanction, RepositoryError> {
        let mut state = self.lock()?;
        let sanction = state
            .sanctions
            .get_mut(application_id)
            .ok_or(RepositoryError::NotFound)?;
        sanction.status = status;
        sanction.updated_at = Utc::now();
        Ok(sanction.clone())
    }
}

impl DisbursementRepository for InMemoryLendingStore {
    fn insert_disbursement(
        &self,
        disbursement: Disbursement,
    ) -> Result<Disbursement, RepositoryError> {
        let mut state = self.lock()?;
        if state.disbursements.contains_key(&disbursement.application_id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .disbursements
            .insert(disbursement.application_id.clone(), disbursement.clone());
        Ok(disbursement)
    }

    fn fetch_disbursement(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Disbursement>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.disbursements.get(application_id).cloned())
    }

    fn disbursements_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Disbursement>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .disbursements
            .values()
            .filter(|disbursement| {
                state
                    .applications
                    .get(&disbursement.application_id)
                    .is_some_and(|application| &application.organization_id == organization_id)
            })
            .cloned()
            .collect())
    }

    fn update_disbursement(
        &self,
        application_id: &ApplicationId,
        status: DisbursementStatus,
        utr_number: Option<String>,
        proof_uploaded: bool,
    ) -> Result<Disbursement, RepositoryError> {
        let mut state = self.lock()?;
        let disbursement = state
            .disbursements
            .get_mut(application_id)
            .ok_or(RepositoryError::NotFound)?;
        disbursement.status = status;
        if utr_number.is_some() {
            disbursement.utr_number = utr_number;
        }
        disbursement.proof_uploaded = disbursement.proof_uploaded || proof_uploaded;
        disbursement.updated_at = Utc::now();
        Ok(disbursement.clone())
    }
}

impl DocumentLookup for InMemoryLendingStore {
    fn documents_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<GeneratedDocument>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .documents
            .get(application_id)
            .cloned()
            .unwrap_or_default())
    }
}
