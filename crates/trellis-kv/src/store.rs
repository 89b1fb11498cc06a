use async_trait::async_trait;

use crate::error::KvError;
use crate::mutation::Mutation;
use crate::range::{KeyRange, KeyValue};

/// Trait for a transactional, ordered key-value store.
///
/// Any backend offering serializable transactions with point reads, ordered
/// range reads, and atomic application of a batch of writes satisfies the
/// contract. Retrying, cancellation and write buffering live in
/// [`Database`](crate::Database) and [`Transaction`](crate::Transaction), so
/// backends only implement the primitives.
#[async_trait]
pub trait KvStore: Send + Sync {
  /// Open a new transaction.
  async fn begin(&self) -> Result<Box<dyn TransactionBackend>, KvError>;
}

/// A single backend transaction.
///
/// Reads observe committed state only; the caller overlays its own buffered
/// writes. A backend must fail [`commit`](TransactionBackend::commit) with a
/// retryable error if anything read through this transaction was changed by
/// another commit in the meantime.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
  /// Get a value by key.
  async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

  /// Read rows in `range` in ascending key order, at most `limit` of them.
  async fn get_range(
    &self,
    range: &KeyRange,
    limit: Option<usize>,
  ) -> Result<Vec<KeyValue>, KvError>;

  /// Atomically apply `mutations` in order and end the transaction.
  ///
  /// With no mutations this only validates the reads.
  async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), KvError>;
}
