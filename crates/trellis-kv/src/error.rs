//! Store error types.

/// Errors raised by the key-value store and its transaction wrapper.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
  /// A concurrent commit invalidated something this transaction read.
  #[error("transaction conflict")]
  Conflict,

  /// The transaction's read version fell out of the store's conflict window.
  #[error("transaction too old")]
  TransactionTooOld,

  /// The caller cancelled the operation.
  #[error("transaction cancelled")]
  Cancelled,

  /// The transaction exceeded its deadline.
  #[error("transaction timed out")]
  TimedOut,

  /// A retryable error persisted through every allowed attempt.
  #[error("retry limit exceeded after {attempts} attempts: {source}")]
  RetryLimitExceeded {
    attempts: u32,
    #[source]
    source: Box<KvError>,
  },

  #[error("invalid key range: {0}")]
  InvalidRange(String),

  /// The backend's in-process state can no longer be used.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("database error: {0}")]
  Database(#[source] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

impl KvError {
  /// Whether retrying the whole transaction may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, KvError::Conflict | KvError::TransactionTooOld)
  }
}

/// Errors that can flow out of a transaction closure.
///
/// [`Database::transact`](crate::Database::transact) needs to tell retryable
/// store failures apart from application failures, whatever the closure's
/// error type is.
pub trait TransactionError: From<KvError> + std::fmt::Display {
  fn is_retryable(&self) -> bool;

  /// Wrap a retryable error once the retry budget is spent.
  fn exhausted(self, attempts: u32) -> Self;
}

impl TransactionError for KvError {
  fn is_retryable(&self) -> bool {
    KvError::is_retryable(self)
  }

  fn exhausted(self, attempts: u32) -> Self {
    KvError::RetryLimitExceeded {
      attempts,
      source: Box::new(self),
    }
  }
}

/// Map a sqlx error, turning SQLite lock contention into a retryable conflict.
pub(crate) fn from_sqlx(err: sqlx::Error) -> KvError {
  if let sqlx::Error::Database(db_err) = &err {
    // SQLITE_BUSY, SQLITE_LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT
    if let Some(code) = db_err.code()
      && matches!(code.as_ref(), "5" | "6" | "261" | "262" | "517")
    {
      return KvError::Conflict;
    }
  }
  KvError::Database(err)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_classification() {
    assert!(KvError::Conflict.is_retryable());
    assert!(KvError::TransactionTooOld.is_retryable());
    assert!(!KvError::Cancelled.is_retryable());
    assert!(!KvError::TimedOut.is_retryable());
    assert!(!KvError::InvalidRange("x".into()).is_retryable());
  }

  #[test]
  fn test_exhausted_is_not_retryable() {
    let err = TransactionError::exhausted(KvError::Conflict, 3);
    assert!(!err.is_retryable());
    assert_eq!(
      err.to_string(),
      "retry limit exceeded after 3 attempts: transaction conflict"
    );
  }
}
