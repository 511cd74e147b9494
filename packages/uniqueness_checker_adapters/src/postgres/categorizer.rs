//! Maps postgres and pool failures onto the four storage error categories that drive the retry
//! loop. Nothing outside this crate looks at postgres error types.

use std::error::Error;

use deadpool_postgres::PoolError;
use tokio_postgres::Error as TokioPostgresError;
use uniqueness_checker::ports::errors::StorageErrorCategory;

/// Categorise a SQLSTATE code.
pub fn categorize_sql_state(code: &str) -> StorageErrorCategory {
    match code {
        // serialization failure, deadlock, lock not available, query cancelled, shutdowns,
        // cannot connect now, too many connections
        "40001" | "40P01" | "55P03" | "57014" | "57P01" | "57P02" | "57P03" | "53300" => StorageErrorCategory::Transient,
        // connection exceptions
        c if c.starts_with("08") => StorageErrorCategory::Transient,
        // integrity constraint violations, data exceptions, syntax errors and undefined objects
        c if c.starts_with("23") || c.starts_with("22") || c.starts_with("42") => StorageErrorCategory::DataRelated,
        _ => StorageErrorCategory::Uncategorized,
    }
}

pub fn categorize_pg_error(error: &TokioPostgresError) -> StorageErrorCategory {
    if error.is_closed() {
        return StorageErrorCategory::Fatal;
    }

    match error.code() {
        Some(sql_state) => categorize_sql_state(sql_state.code()),
        None if is_io_error(error) => StorageErrorCategory::Transient,
        None => StorageErrorCategory::Uncategorized,
    }
}

pub fn categorize_pool_error(error: &PoolError) -> StorageErrorCategory {
    match error {
        PoolError::Timeout(_) => StorageErrorCategory::Transient,
        PoolError::Backend(e) => categorize_pg_error(e),
        PoolError::Closed | PoolError::NoRuntimeSpecified => StorageErrorCategory::Fatal,
        _ => StorageErrorCategory::Uncategorized,
    }
}

fn is_io_error(error: &TokioPostgresError) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::error::SqlState;

    #[test]
    fn transient_sql_states() {
        for sql_state in [
            SqlState::T_R_SERIALIZATION_FAILURE,
            SqlState::T_R_DEADLOCK_DETECTED,
            SqlState::LOCK_NOT_AVAILABLE,
            SqlState::QUERY_CANCELED,
            SqlState::ADMIN_SHUTDOWN,
            SqlState::CRASH_SHUTDOWN,
            SqlState::CANNOT_CONNECT_NOW,
            SqlState::TOO_MANY_CONNECTIONS,
            SqlState::CONNECTION_EXCEPTION,
            SqlState::CONNECTION_FAILURE,
        ] {
            assert_eq!(categorize_sql_state(sql_state.code()), StorageErrorCategory::Transient, "{}", sql_state.code());
        }
    }

    #[test]
    fn data_related_sql_states() {
        for sql_state in [
            SqlState::UNIQUE_VIOLATION,
            SqlState::FOREIGN_KEY_VIOLATION,
            SqlState::NOT_NULL_VIOLATION,
            SqlState::INVALID_TEXT_REPRESENTATION,
            SqlState::NUMERIC_VALUE_OUT_OF_RANGE,
            SqlState::SYNTAX_ERROR,
            SqlState::UNDEFINED_TABLE,
            SqlState::UNDEFINED_COLUMN,
        ] {
            assert_eq!(categorize_sql_state(sql_state.code()), StorageErrorCategory::DataRelated, "{}", sql_state.code());
        }
    }

    #[test]
    fn everything_else_is_uncategorized() {
        for sql_state in [SqlState::DISK_FULL, SqlState::OUT_OF_MEMORY, SqlState::INTERNAL_ERROR, SqlState::UNDEFINED_DATABASE] {
            assert_eq!(categorize_sql_state(sql_state.code()), StorageErrorCategory::Uncategorized, "{}", sql_state.code());
        }
    }

    #[test]
    fn closed_pool_is_fatal() {
        assert_eq!(categorize_pool_error(&PoolError::Closed), StorageErrorCategory::Fatal);
        assert_eq!(categorize_pool_error(&PoolError::NoRuntimeSpecified), StorageErrorCategory::Fatal);
    }
}
