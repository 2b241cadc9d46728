use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::domain::{
    Application, ApplicationId, Disbursement, DisbursementStatus, FeeBreakdown,
    GeneratedDocument, OrganizationId, Sanction, SanctionStatus,
};
use super::repository::{
    ApplicationRepository, DisbursementRepository, DocumentLookup, RepositoryError,
    SanctionRepository, StageSwap, SwapResult, VerificationRepository,
};
use super::verification::{VerificationRecord, VerificationUpdate};

const MIGRATION: &str = include_str!("../../../migrations/001_lifecycle.sql");

const APPLICATION_COLUMNS: &str = "id, organization_id, applicant_name, current_stage, status, \
     requested_amount, approved_amount, tenure_months, assigned_to, created_at, updated_at";

const VERIFICATION_COLUMNS: &str = "application_id, verification_type, status, source, \
     request_payload, response_payload, remarks, verified_at, created_at, updated_at";

const SANCTION_COLUMNS: &str = "application_id, sanctioned_amount, processing_fee, \
     documentation_fee, insurance_premium, tax, valid_until, status, created_at, updated_at";

const DISBURSEMENT_COLUMNS: &str =
    "application_id, amount, utr_number, proof_uploaded, status, created_at, updated_at";

/// SQLite-backed store. Stage changes are a single conditional `UPDATE`; uniqueness of
/// verifications, sanctions, and disbursements is enforced by table constraints.
pub struct SqliteLendingStore {
    conn: Mutex<Connection>,
}

impl SqliteLendingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(path = %path.display(), error = %err, "could not enable WAL journal mode");
        }
        debug!(path = %path.display(), "opened sqlite lending store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(MIGRATION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    /// Record a document produced by the document service.
    pub fn register_document(&self, document: GeneratedDocument) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO generated_documents (application_id, document_type, customer_signed, signed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (application_id, document_type) DO UPDATE SET
                 customer_signed = excluded.customer_signed,
                 signed_at = excluded.signed_at",
            params![
                document.application_id.0,
                document.document_type.label(),
                document.customer_signed,
                document.signed_at,
            ],
        )?;
        Ok(())
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                RepositoryError::NotFound
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => RepositoryError::Corrupt(err.to_string()),
            _ => RepositoryError::Unavailable(err.to_string()),
        }
    }
}

/// Amounts are range-checked by the service; anything wider reaching here is a bug upstream.
fn sql_amount(amount: u64) -> Result<i64, RepositoryError> {
    i64::try_from(amount)
        .map_err(|_| RepositoryError::Corrupt(format!("amount {amount} exceeds storage range")))
}

fn conversion_error(
    idx: usize,
    kind: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, kind, Box::new(err))
}

fn label_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| conversion_error(idx, Type::Text, err))
}

fn amount_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|err| conversion_error(idx, Type::Integer, err))
}

fn optional_amount_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(u64::try_from)
        .transpose()
        .map_err(|err| conversion_error(idx, Type::Integer, err))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|err| conversion_error(idx, Type::Text, err))
}

fn optional_json_column<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| serde_json::from_str(&value))
        .transpose()
        .map_err(|err| conversion_error(idx, Type::Text, err))
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: ApplicationId(row.get(0)?),
        organization_id: OrganizationId(row.get(1)?),
        applicant_name: row.get(2)?,
        current_stage: label_column(row, 3)?,
        status: label_column(row, 4)?,
        requested_amount: amount_column(row, 5)?,
        approved_amount: optional_amount_column(row, 6)?,
        tenure_months: row.get(7)?,
        assigned_to: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn verification_from_row(row: &Row<'_>) -> rusqlite::Result<VerificationRecord> {
    Ok(VerificationRecord {
        application_id: ApplicationId(row.get(0)?),
        verification_type: label_column(row, 1)?,
        status: label_column(row, 2)?,
        source: row.get(3)?,
        request_payload: json_column(row, 4)?,
        response_payload: optional_json_column(row, 5)?,
        remarks: row.get(6)?,
        verified_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn sanction_from_row(row: &Row<'_>) -> rusqlite::Result<Sanction> {
    Ok(Sanction {
        application_id: ApplicationId(row.get(0)?),
        sanctioned_amount: amount_column(row, 1)?,
        fees: FeeBreakdown {
            processing_fee: amount_column(row, 2)?,
            documentation_fee: amount_column(row, 3)?,
            insurance_premium: amount_column(row, 4)?,
            tax: amount_column(row, 5)?,
        },
        valid_until: row.get(6)?,
        status: label_column(row, 7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn disbursement_from_row(row: &Row<'_>) -> rusqlite::Result<Disbursement> {
    Ok(Disbursement {
        application_id: ApplicationId(row.get(0)?),
        amount: amount_column(row, 1)?,
        utr_number: row.get(2)?,
        proof_uploaded: row.get(3)?,
        status: label_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<GeneratedDocument> {
    Ok(GeneratedDocument {
        application_id: ApplicationId(row.get(0)?),
        document_type: label_column(row, 1)?,
        customer_signed: row.get(2)?,
        signed_at: row.get(3)?,
    })
}

fn select_disbursement(
    conn: &Connection,
    application_id: &ApplicationId,
) -> Result<Option<Disbursement>, RepositoryError> {
    let disbursement = conn
        .query_row(
            &format!("SELECT {DISBURSEMENT_COLUMNS} FROM disbursements WHERE application_id = ?1"),
            params![application_id.0],
            disbursement_from_row,
        )
        .optional()?;
    Ok(disbursement)
}

fn select_sanction(
    conn: &Connection,
    application_id: &ApplicationId,
) -> Result<Option<Sanction>, RepositoryError> {
    let sanction = conn
        .query_row(
            &format!("SELECT {SANCTION_COLUMNS} FROM sanctions WHERE application_id = ?1"),
            params![application_id.0],
            sanction_from_row,
        )
        .optional()?;
    Ok(sanction)
}

impl ApplicationRepository for SqliteLendingStore {
    fn allocate_application_id(&self) -> Result<ApplicationId, RepositoryError> {
        let conn = self.conn()?;
        // Seeded from existing rows the first time, so databases created before the
        // sequence row existed keep allocating past their highest id.
        let next: i64 = conn.query_row(
            "INSERT INTO id_sequences (name, last_value)
             VALUES ('application', (
                 SELECT COALESCE(MAX(CAST(substr(id, 6) AS INTEGER)), 0) + 1
                 FROM applications WHERE id LIKE 'loan-%'
             ))
             ON CONFLICT (name) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
            [],
            |row| row.get(0),
        )?;
        let sequence = u64::try_from(next)
            .map_err(|_| RepositoryError::Corrupt(format!("application sequence {next}")))?;
        Ok(ApplicationId::from_sequence(sequence))
    }

    fn insert_application(&self, application: Application) -> Result<Application, RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO applications ({APPLICATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                application.id.0,
                application.organization_id.0,
                application.applicant_name,
                application.current_stage.label(),
                application.status.label(),
                sql_amount(application.requested_amount)?,
                application.approved_amount.map(sql_amount).transpose()?,
                application.tenure_months,
                application.assigned_to,
                application.created_at,
                application.updated_at,
            ],
        )?;
        Ok(application)
    }

    fn fetch_application(
        &self,
        organization_id: &OrganizationId,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        let conn = self.conn()?;
        let application = conn
            .query_row(
                &format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications
                     WHERE id = ?1 AND organization_id = ?2"
                ),
                params![id.0, organization_id.0],
                application_from_row,
            )
            .optional()?;
        Ok(application)
    }

    fn list_applications(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Application>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications
             WHERE organization_id = ?1 ORDER BY id"
        ))?;
        let applications = stmt
            .query_map(params![organization_id.0], application_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(applications)
    }

    fn compare_and_swap_stage(&self, swap: &StageSwap) -> Result<SwapResult, RepositoryError> {
        let conn = self.conn()?;
        let updated = conn
            .query_row(
                &format!(
                    "UPDATE applications
                     SET current_stage = ?4, status = ?5, updated_at = ?6
                     WHERE id = ?1 AND organization_id = ?2 AND current_stage = ?3
                     RETURNING {APPLICATION_COLUMNS}"
                ),
                params![
                    swap.application_id.0,
                    swap.organization_id.0,
                    swap.expected_stage.label(),
                    swap.new_stage.label(),
                    swap.new_status.label(),
                    Utc::now(),
                ],
                application_from_row,
            )
            .optional()?;
        if let Some(application) = updated {
            return Ok(SwapResult::Applied(application));
        }

        let current_stage = conn
            .query_row(
                "SELECT current_stage FROM applications WHERE id = ?1 AND organization_id = ?2",
                params![swap.application_id.0, swap.organization_id.0],
                |row| label_column(row, 0),
            )
            .optional()?
            .ok_or(RepositoryError::NotFound)?;
        Ok(SwapResult::Stale { current_stage })
    }

    fn set_approved_amount(
        &self,
        organization_id: &OrganizationId,
        id: &ApplicationId,
        amount: u64,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE applications SET approved_amount = ?3, updated_at = ?4
             WHERE id = ?1 AND organization_id = ?2",
            params![id.0, organization_id.0, sql_amount(amount)?, Utc::now()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl VerificationRepository for SqliteLendingStore {
    fn upsert_verification(
        &self,
        update: VerificationUpdate,
    ) -> Result<VerificationRecord, RepositoryError> {
        let conn = self.conn()?;
        let known = conn
            .query_row(
                "SELECT 1 FROM applications WHERE id = ?1",
                params![update.application_id.0],
                |_| Ok(()),
            )
            .optional()?;
        if known.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let record = VerificationRecord::from_update(update, Utc::now());
        let request_payload = serde_json::to_string(&record.request_payload)
            .map_err(|err| RepositoryError::Corrupt(err.to_string()))?;
        let response_payload = record
            .response_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| RepositoryError::Corrupt(err.to_string()))?;

        conn.execute(
            &format!(
                "INSERT INTO verification_records ({VERIFICATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (application_id, verification_type) DO UPDATE SET
                     status = excluded.status,
                     source = excluded.source,
                     request_payload = excluded.request_payload,
                     response_payload = excluded.response_payload,
                     remarks = excluded.remarks,
                     verified_at = excluded.verified_at,
                     updated_at = excluded.updated_at"
            ),
            params![
                record.application_id.0,
                record.verification_type.label(),
                record.status.label(),
                record.source,
                request_payload,
                response_payload,
                record.remarks,
                record.verified_at,
                record.created_at,
                record.updated_at,
            ],
        )?;

        let stored = conn.query_row(
            &format!(
                "SELECT {VERIFICATION_COLUMNS} FROM verification_records
                 WHERE application_id = ?1 AND verification_type = ?2"
            ),
            params![record.application_id.0, record.verification_type.label()],
            verification_from_row,
        )?;
        Ok(stored)
    }

    fn verifications_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<VerificationRecord>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verification_records WHERE application_id = ?1"
        ))?;
        let mut records = stmt
            .query_map(params![application_id.0], verification_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        records.sort_by_key(|record| record.verification_type);
        Ok(records)
    }
}

impl SanctionRepository for SqliteLendingStore {
    fn insert_sanction(&self, sanction: Sanction) -> Result<Sanction, RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO sanctions ({SANCTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                sanction.application_id.0,
                sql_amount(sanction.sanctioned_amount)?,
                sql_amount(sanction.fees.processing_fee)?,
                sql_amount(sanction.fees.documentation_fee)?,
                sql_amount(sanction.fees.insurance_premium)?,
                sql_amount(sanction.fees.tax)?,
                sanction.valid_until,
                sanction.status.label(),
                sanction.created_at,
                sanction.updated_at,
            ],
        )?;
        Ok(sanction)
    }

    fn fetch_sanction(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Sanction>, RepositoryError> {
        let conn = self.conn()?;
        select_sanction(&conn, application_id)
    }

    fn update_sanction_status(
        &self,
        application_id: &ApplicationId,
        status: SanctionStatus,
    ) -> Result<Sanction, RepositoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sanctions SET status = ?2, updated_at = ?3 WHERE application_id = ?1",
            params![application_id.0, status.label(), Utc::now()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        select_sanction(&conn, application_id)?.ok_or(RepositoryError::NotFound)
    }
}

impl DisbursementRepository for SqliteLendingStore {
    fn insert_disbursement(
        &self,
        disbursement: Disbursement,
    ) -> Result<Disbursement, RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO disbursements ({DISBURSEMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                disbursement.application_id.0,
                sql_amount(disbursement.amount)?,
                disbursement.utr_number,
                disbursement.proof_uploaded,
                disbursement.status.label(),
                disbursement.created_at,
                disbursement.updated_at,
            ],
        )?;
        Ok(disbursement)
    }

    fn fetch_disbursement(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<Disbursement>, RepositoryError> {
        let conn = self.conn()?;
        select_disbursement(&conn, application_id)
    }

    fn disbursements_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Disbursement>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.application_id, d.amount, d.utr_number, d.proof_uploaded, d.status,
                    d.created_at, d.updated_at
             FROM disbursements d
             JOIN applications a ON a.id = d.application_id
             WHERE a.organization_id = ?1",
        )?;
        let disbursements = stmt
            .query_map(params![organization_id.0], disbursement_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(disbursements)
    }

    fn update_disbursement(
        &self,
        application_id: &ApplicationId,
        status: DisbursementStatus,
        utr_number: Option<String>,
        proof_uploaded: bool,
    ) -> Result<Disbursement, RepositoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE disbursements
             SET status = ?2,
                 utr_number = COALESCE(?3, utr_number),
                 proof_uploaded = MAX(proof_uploaded, ?4),
                 updated_at = ?5
             WHERE application_id = ?1",
            params![
                application_id.0,
                status.label(),
                utr_number,
                proof_uploaded,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        select_disbursement(&conn, application_id)?.ok_or(RepositoryError::NotFound)
    }
}

impl DocumentLookup for SqliteLendingStore {
    fn documents_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<GeneratedDocument>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT application_id, document_type, customer_signed, signed_at
             FROM generated_documents WHERE application_id = ?1",
        )?;
        let documents = stmt
            .query_map(params![application_id.0], document_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }
}
