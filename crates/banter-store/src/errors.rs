//! Store error types.

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error (preserves source chain).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or unavailable.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A schema migration failed.
    #[error("migration {version} failed: {message}")]
    Migration {
        /// Migration version that failed.
        version: u32,
        /// Underlying failure.
        message: String,
    },

    /// The shared counter/cache store is unreachable.
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_variants() {
        let err = StoreError::Migration {
            version: 2,
            message: "syntax error".into(),
        };
        assert_eq!(err.to_string(), "migration 2 failed: syntax error");

        let err = StoreError::Unavailable("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn sqlite_source_chain_preserved() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("SQLite error"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }
}
