//! Storage error model shared by the subscription and usage stores.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency check failed (stale version or concurrent insert).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("record not found")]
    NotFound,

    /// Connection, query or lock failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, StoreError::Concurrency(_))
    }
}

/// Map a SQLx error for `operation`.
///
/// | SQLx error | Postgres code | StoreError |
/// |---|---|---|
/// | unique violation | `23505` | `Concurrency` |
/// | row not found | n/a | `NotFound` |
/// | anything else | any | `Backend` |
#[cfg(feature = "postgres")]
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
