//! # Database and Engine Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Error Propagation                              │
//! │                                                                     │
//! │  SQLite Error (sqlx::Error)                                         │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  DbError (storage)  ← categorizes constraint/connection failures    │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  EngineError (this crate's public surface)                          │
//! │  ├── Validation   ← bazaar-core, pre-mutation input failures        │
//! │  ├── Conflict     ← bazaar-core, request contradicts state          │
//! │  ├── NotFound     ← unknown item/bill/return id                     │
//! │  └── Persistence  ← commit/transaction failure, REDACTED message;   │
//! │                     the wrapped DbError stays on `source()` for     │
//! │                     operator logs                                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use thiserror::Error;

use bazaar_core::{ConflictError, ValidationError};

// =============================================================================
// DbError
// =============================================================================

/// Storage-level failures. These wrap sqlx errors and add categorization;
/// they are not shown to callers directly.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unique constraint violation.
    #[error("Duplicate {field}: already exists")]
    UniqueViolation { field: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Convert sqlx errors to DbError.
///
/// SQLite reports constraint failures as database errors with a message
/// prefix; we parse the prefix to categorize.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation { field }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation { message: msg.to_string() }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for storage operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// EngineError
// =============================================================================

/// The error surface of every engine operation.
///
/// The first three kinds carry enough detail for the caller to correct the
/// input. `Persistence` deliberately does not: its `Display` is redacted
/// and the underlying cause is only reachable through `source()`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Transaction or commit failure after a full rollback. The caller
    /// must resubmit; there is no automatic retry.
    #[error("storage failure; the operation was rolled back")]
    Persistence(#[source] DbError),
}

impl EngineError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        EngineError::NotFound { entity, id: id.to_string() }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::Persistence(err)
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Persistence(DbError::from(err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_persistence_display_is_redacted() {
        let err = EngineError::Persistence(DbError::QueryFailed(
            "near \"FROOM\": syntax error".to_string(),
        ));
        assert_eq!(err.to_string(), "storage failure; the operation was rolled back");

        // The cause stays reachable for operator logs.
        let source = err.source().expect("source");
        assert!(source.to_string().contains("syntax error"));
    }

    #[test]
    fn test_validation_passes_through() {
        let err = EngineError::from(ValidationError::EmptyBill);
        assert_eq!(err.to_string(), "Bill must have at least one item");
    }
}
