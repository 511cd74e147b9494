use deadpool_postgres::{CreatePoolError, PoolError};
use thiserror::Error as ThisError;
use tokio_postgres::Error as TokioPostgresError;
use uniqueness_checker::ports::errors::{BackingStoreError, BackingStoreErrorKind, StorageErrorCategory};

use super::categorizer::{categorize_pg_error, categorize_pool_error};

#[derive(Debug, ThisError)]
pub enum PgError {
    // Deadpool errors
    #[error("Error creating pool - {0}")]
    CreatePool(#[source] CreatePoolError),
    #[error("Error getting client from pool - {0} ")]
    GetClientFromPool(#[source] PoolError),

    // Tokio-postgres errors
    #[error("Error {1} - {0}")]
    Query(#[source] TokioPostgresError, String),

    // Config errors
    #[error("Invalid postgres port {0}")]
    InvalidPort(String),
}

impl PgError {
    pub fn query(context: impl Into<String>) -> impl FnOnce(TokioPostgresError) -> PgError {
        let context = context.into();
        move |e| PgError::Query(e, context)
    }

    pub fn category(&self) -> StorageErrorCategory {
        match self {
            PgError::CreatePool(_) | PgError::InvalidPort(_) => StorageErrorCategory::Fatal,
            PgError::GetClientFromPool(e) => categorize_pool_error(e),
            PgError::Query(e, _) => categorize_pg_error(e),
        }
    }

    pub fn into_backing_store_error(self, kind: BackingStoreErrorKind) -> BackingStoreError {
        let data = match &self {
            PgError::GetClientFromPool(PoolError::Backend(e)) | PgError::Query(e, _) => e.code().map(|code| code.code().to_owned()),
            _ => None,
        };
        let error = BackingStoreError::new(kind, self.category(), self.to_string());

        match data {
            Some(sql_state) => error.with_data(format!("sqlstate={sql_state}")),
            None => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_fatal() {
        let error = PgError::InvalidPort("not-a-port".to_owned()).into_backing_store_error(BackingStoreErrorKind::Session);

        assert_eq!(error.kind, BackingStoreErrorKind::Session);
        assert_eq!(error.category, StorageErrorCategory::Fatal);
        assert_eq!(error.reason, "Invalid postgres port not-a-port");
        assert_eq!(error.data, None);
    }

    #[test]
    fn pool_errors_carry_the_pool_category() {
        let closed = PgError::GetClientFromPool(PoolError::Closed);
        assert_eq!(closed.category(), StorageErrorCategory::Fatal);
        assert!(!closed.into_backing_store_error(BackingStoreErrorKind::Begin).is_retryable());
    }
}
