use thiserror::Error;

/// Errors surfaced by the fitpulse core to its callers.
///
/// `Validation`, `NotFound` and `Conflict` are caller mistakes and are never
/// retried. `Store` wraps any other failure from the relational store.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.into())
    }
}

/// True when the root cause is SQLite reporting a table that does not exist.
///
/// Older databases may predate a category's table; aggregation treats that
/// as an empty category instead of a failure.
#[must_use]
pub fn is_missing_table(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.starts_with("no such table")
        )
    })
}

/// Substitute `T::default()` when `result` failed only because a table is missing.
pub fn degrade_missing<T: Default>(result: anyhow::Result<T>, what: &str) -> anyhow::Result<T> {
    match result {
        Err(err) if is_missing_table(&err) => {
            tracing::warn!(source = what, error = %err, "missing table, using default");
            Ok(T::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn missing_table_error() -> anyhow::Error {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 1 FROM nope", [], |row| row.get::<_, i64>(0))
            .unwrap_err();
        anyhow::Error::from(err).context("reading nope")
    }

    #[test]
    fn test_is_missing_table_through_context() {
        assert!(is_missing_table(&missing_table_error()));
        assert!(!is_missing_table(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn test_degrade_missing_substitutes_default() {
        let degraded: i64 = degrade_missing(Err(missing_table_error()), "nope").unwrap();
        assert_eq!(degraded, 0);
    }

    #[test]
    fn test_degrade_missing_keeps_other_errors() {
        let result: anyhow::Result<i64> =
            Err(anyhow::anyhow!("disk I/O error")).context("reading logs");
        assert!(degrade_missing(result, "logs").is_err());
    }

    #[test]
    fn test_store_error_display_includes_chain() {
        let err = CoreError::from(anyhow::anyhow!("locked").context("writing cursor"));
        assert_eq!(err.to_string(), "store error: writing cursor: locked");
    }
}
