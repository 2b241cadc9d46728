use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use loan_lifecycle::config::StorageConfig;
use loan_lifecycle::error::AppError;
use loan_lifecycle::workflows::origination::{
    InMemoryLendingStore, LoanOriginationService, SqliteLendingStore,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::routes::with_lifecycle_routes;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store selected by `APP_DATABASE_URL` or `--database-url`.
pub(crate) enum LendingBackend {
    Memory(Arc<InMemoryLendingStore>),
    Sqlite(Arc<SqliteLendingStore>),
}

impl LendingBackend {
    pub(crate) fn open(storage: &StorageConfig) -> Result<Self, AppError> {
        let backend = match storage {
            StorageConfig::Memory => Self::Memory(Arc::new(InMemoryLendingStore::new())),
            StorageConfig::SqliteInMemory => {
                Self::Sqlite(Arc::new(SqliteLendingStore::open_in_memory()?))
            }
            StorageConfig::SqliteFile(path) => {
                Self::Sqlite(Arc::new(SqliteLendingStore::open(path)?))
            }
        };
        Ok(backend)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            LendingBackend::Memory(_) => "memory",
            LendingBackend::Sqlite(_) => "sqlite",
        }
    }

    /// Full application router for whichever store was opened.
    pub(crate) fn router(&self) -> axum::Router {
        match self {
            LendingBackend::Memory(store) => {
                with_lifecycle_routes(Arc::new(LoanOriginationService::new(store.clone())))
            }
            LendingBackend::Sqlite(store) => {
                with_lifecycle_routes(Arc::new(LoanOriginationService::new(store.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_the_configured_backend() {
        let memory = LendingBackend::open(&StorageConfig::Memory).expect("memory store");
        assert_eq!(memory.label(), "memory");

        let sqlite = LendingBackend::open(&StorageConfig::SqliteInMemory).expect("sqlite store");
        assert_eq!(sqlite.label(), "sqlite");
    }
}
