use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::KvError;
use crate::mutation::WriteBuffer;
use crate::range::{KeyRange, KeyValue};
use crate::store::TransactionBackend;

struct TransactionInner {
  backend: Box<dyn TransactionBackend>,
  writes: Mutex<WriteBuffer>,
}

impl TransactionInner {
  fn writes(&self) -> Result<MutexGuard<'_, WriteBuffer>, KvError> {
    self
      .writes
      .lock()
      .map_err(|_| KvError::Unavailable("transaction write buffer poisoned".to_string()))
  }

  async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
    let buffered = self.writes()?.lookup(key);
    if let Some(value) = buffered {
      return Ok(value);
    }
    self.backend.get(key).await
  }

  async fn get_range(
    &self,
    range: &KeyRange,
    limit: Option<usize>,
  ) -> Result<Vec<KeyValue>, KvError> {
    if range.is_empty() {
      return Ok(Vec::new());
    }

    let overlapping = self.writes()?.touches(range);
    if !overlapping {
      return self.backend.get_range(range, limit).await;
    }

    // Buffered clears may hide committed rows, so the limit is applied
    // after the overlay.
    let base = self.backend.get_range(range, None).await?;
    let mut rows = self.writes()?.overlay(range, base);
    if let Some(limit) = limit {
      rows.truncate(limit);
    }
    Ok(rows)
  }
}

/// Handle to a read-write transaction.
///
/// Cheap to clone; clones share the same buffered writes. Writes are buffered
/// in memory and applied atomically when the owning
/// [`Database`](crate::Database) commits the transaction.
#[derive(Clone)]
pub struct Transaction {
  inner: Arc<TransactionInner>,
}

impl Transaction {
  pub(crate) fn new(backend: Box<dyn TransactionBackend>) -> Self {
    Self {
      inner: Arc::new(TransactionInner {
        backend,
        writes: Mutex::new(WriteBuffer::new()),
      }),
    }
  }

  pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
    self.inner.get(key).await
  }

  pub async fn get_range(
    &self,
    range: &KeyRange,
    limit: Option<usize>,
  ) -> Result<Vec<KeyValue>, KvError> {
    self.inner.get_range(range, limit).await
  }

  pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
    self.inner.writes()?.set(key, value);
    Ok(())
  }

  pub fn clear_range(&self, range: &KeyRange) -> Result<(), KvError> {
    self.inner.writes()?.clear_range(range);
    Ok(())
  }

  /// Read-only view over this transaction, including its buffered writes.
  pub fn read(&self) -> ReadTransaction {
    ReadTransaction {
      inner: self.inner.clone(),
    }
  }

  pub(crate) async fn commit(&self) -> Result<(), KvError> {
    let mutations = self.inner.writes()?.take();
    self.inner.backend.commit(mutations).await
  }
}

/// Handle to a read-only transaction.
#[derive(Clone)]
pub struct ReadTransaction {
  inner: Arc<TransactionInner>,
}

impl ReadTransaction {
  pub(crate) fn new(backend: Box<dyn TransactionBackend>) -> Self {
    Self {
      inner: Arc::new(TransactionInner {
        backend,
        writes: Mutex::new(WriteBuffer::new()),
      }),
    }
  }

  pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
    self.inner.get(key).await
  }

  pub async fn get_range(
    &self,
    range: &KeyRange,
    limit: Option<usize>,
  ) -> Result<Vec<KeyValue>, KvError> {
    self.inner.get_range(range, limit).await
  }

  pub(crate) async fn finish(&self) -> Result<(), KvError> {
    self.inner.backend.commit(Vec::new()).await
  }
}
