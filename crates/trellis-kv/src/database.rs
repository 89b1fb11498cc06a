//! Retrying transaction runner.
//!
//! [`Database`] is the only way graph code talks to a [`KvStore`]. It owns the
//! retry policy and turns cancellation and deadlines into errors that are
//! distinct from store failures.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trellis_config::RetryConfig;

use crate::error::{KvError, TransactionError};
use crate::range::{KeyRange, KeyValue, key_after};
use crate::store::KvStore;
use crate::transaction::{ReadTransaction, Transaction};

/// Shared handle to a transactional store.
#[derive(Clone)]
pub struct Database {
  store: Arc<dyn KvStore>,
  retry: RetryConfig,
  timeout: Option<Duration>,
}

impl Database {
  /// Create a database over `store` with the default retry policy.
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self {
      store,
      retry: RetryConfig::default(),
      timeout: None,
    }
  }

  pub fn with_retry(mut self, retry: RetryConfig) -> Self {
    self.retry = retry;
    self
  }

  /// Bound every transaction attempt by `timeout`.
  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn retry_config(&self) -> &RetryConfig {
    &self.retry
  }

  /// Run `f` inside a read-write transaction and commit it.
  ///
  /// `f` is invoked once per attempt with a fresh transaction, so it must not
  /// carry side effects outside the transaction. Retryable failures, whether
  /// raised by `f` or by the commit, restart the closure after a backoff.
  pub async fn transact<F, Fut, T, E>(&self, cancel: &CancellationToken, f: F) -> Result<T, E>
  where
    F: Fn(Transaction) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransactionError,
  {
    self
      .run_with_retry(cancel, || async {
        let tx = Transaction::new(self.store.begin().await?);
        let value = f(tx.clone()).await?;
        tx.commit().await?;
        Ok::<T, E>(value)
      })
      .await
  }

  /// Run `f` inside a read-only transaction.
  ///
  /// Reads are validated when `f` returns, so a result is only handed back if
  /// it was consistent with a single point in the commit order.
  pub async fn read_transact<F, Fut, T, E>(
    &self,
    cancel: &CancellationToken,
    f: F,
  ) -> Result<T, E>
  where
    F: Fn(ReadTransaction) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransactionError,
  {
    self
      .run_with_retry(cancel, || async {
        let tx = ReadTransaction::new(self.store.begin().await?);
        let value = f(tx.clone()).await?;
        tx.finish().await?;
        Ok::<T, E>(value)
      })
      .await
  }

  /// Clear every key in `range` in one transaction.
  pub async fn clear_range(
    &self,
    cancel: &CancellationToken,
    range: &KeyRange,
  ) -> Result<(), KvError> {
    self
      .transact(cancel, |tx| async move { tx.clear_range(range) })
      .await
  }

  /// Lazily scan `range` in ascending key order.
  ///
  /// Each page of at most `page_size` rows is read in its own transaction.
  /// The next page starts strictly after the last key already yielded, so a
  /// retried page resumes instead of repeating rows.
  pub fn scan(
    &self,
    range: KeyRange,
    page_size: usize,
    cancel: CancellationToken,
  ) -> BoxStream<'static, Result<KeyValue, KvError>> {
    let state = ScanState {
      db: self.clone(),
      remaining: range,
      page_size: page_size.max(1),
      buffered: VecDeque::new(),
      exhausted: false,
      cancel,
    };

    stream::try_unfold(state, |mut state| async move {
      loop {
        if let Some(kv) = state.buffered.pop_front() {
          return Ok(Some((kv, state)));
        }
        if state.exhausted || state.remaining.is_empty() {
          return Ok(None);
        }
        state.fetch_page().await?;
      }
    })
    .boxed()
  }

  async fn run_with_retry<A, Fut, T, E>(
    &self,
    cancel: &CancellationToken,
    attempt: A,
  ) -> Result<T, E>
  where
    A: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransactionError,
  {
    let max_attempts = self.retry.max_attempts.max(1);
    let mut attempts = 0;

    loop {
      attempts += 1;

      let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(KvError::Cancelled.into()),
        result = self.with_deadline(attempt()) => result,
      };

      match result {
        Ok(value) => {
          if attempts > 1 {
            debug!(attempts, "transaction_committed_after_retry");
          }
          return Ok(value);
        }
        Err(e) if e.is_retryable() => {
          if attempts >= max_attempts {
            warn!(attempts, error = %e, "transaction_retries_exhausted");
            return Err(e.exhausted(attempts));
          }

          let delay = self.retry.delay_for(attempts);
          warn!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "transaction_retry"
          );

          tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KvError::Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
          }
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn with_deadline<Fut, T, E>(&self, fut: Fut) -> Result<T, E>
  where
    Fut: Future<Output = Result<T, E>>,
    E: From<KvError>,
  {
    match self.timeout {
      Some(timeout) => tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(KvError::TimedOut.into())),
      None => fut.await,
    }
  }
}

struct ScanState {
  db: Database,
  remaining: KeyRange,
  page_size: usize,
  buffered: VecDeque<KeyValue>,
  exhausted: bool,
  cancel: CancellationToken,
}

impl ScanState {
  async fn fetch_page(&mut self) -> Result<(), KvError> {
    let remaining = &self.remaining;
    let limit = self.page_size;

    let page = self
      .db
      .read_transact(&self.cancel, |tx| async move {
        tx.get_range(remaining, Some(limit)).await
      })
      .await?;

    if page.len() < limit {
      self.exhausted = true;
    }
    if let Some(last) = page.last() {
      self.remaining.begin = key_after(&last.key);
    }

    self.buffered.extend(page);
    Ok(())
  }
}
