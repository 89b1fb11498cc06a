use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{KvError, from_sqlx};
use crate::mutation::Mutation;
use crate::range::{KeyRange, KeyValue};
use crate::store::{KvStore, TransactionBackend};

/// SQLite-backed durable store.
///
/// Keys live in a single `kv` table ordered by SQLite's bytewise BLOB
/// comparison. Transactions run in WAL mode: reads see one snapshot, and a
/// write that would upgrade a stale snapshot fails with
/// [`KvError::Conflict`].
#[derive(Clone)]
pub struct SqliteKvStore {
  pool: SqlitePool,
}

impl SqliteKvStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database file at `path` and migrate it.
  pub async fn connect(path: impl AsRef<Path>) -> Result<Self, KvError> {
    let options = SqliteConnectOptions::new()
      .filename(path.as_ref())
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal)
      .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
      .max_connections(8)
      .connect_with(options)
      .await
      .map_err(from_sqlx)?;

    let store = Self::new(pool);
    store.migrate().await?;
    debug!(path = %path.as_ref().display(), "sqlite_store_opened");
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), KvError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Close every pooled connection.
  pub async fn close(&self) {
    self.pool.close().await;
  }
}

#[async_trait]
impl KvStore for SqliteKvStore {
  async fn begin(&self) -> Result<Box<dyn TransactionBackend>, KvError> {
    let tx = self.pool.begin().await.map_err(from_sqlx)?;
    Ok(Box::new(SqliteTransaction {
      tx: Mutex::new(Some(tx)),
    }))
  }
}

struct SqliteTransaction {
  tx: Mutex<Option<sqlx::Transaction<'static, Sqlite>>>,
}

fn finished() -> KvError {
  KvError::Unavailable("transaction already finished".to_string())
}

#[async_trait]
impl TransactionBackend for SqliteTransaction {
  async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or_else(finished)?;

    sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM kv WHERE key = ?")
      .bind(key)
      .fetch_optional(&mut **tx)
      .await
      .map_err(from_sqlx)
  }

  async fn get_range(
    &self,
    range: &KeyRange,
    limit: Option<usize>,
  ) -> Result<Vec<KeyValue>, KvError> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit
      .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
      .unwrap_or(-1);

    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or_else(finished)?;

    let rows: Vec<(Vec<u8>, Vec<u8>)> = sqlx::query_as(
      r#"
      SELECT key, value FROM kv
      WHERE key >= ? AND key < ?
      ORDER BY key
      LIMIT ?
      "#,
    )
    .bind(range.begin.as_slice())
    .bind(range.end.as_slice())
    .bind(limit)
    .fetch_all(&mut **tx)
    .await
    .map_err(from_sqlx)?;

    Ok(rows.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect())
  }

  async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), KvError> {
    let mut tx = self.tx.lock().await.take().ok_or_else(finished)?;

    for mutation in &mutations {
      match mutation {
        Mutation::Set { key, value } => {
          sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
          )
          .bind(key.as_slice())
          .bind(value.as_slice())
          .execute(&mut *tx)
          .await
          .map_err(from_sqlx)?;
        }
        Mutation::ClearRange(range) => {
          sqlx::query("DELETE FROM kv WHERE key >= ? AND key < ?")
            .bind(range.begin.as_slice())
            .bind(range.end.as_slice())
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx)?;
        }
      }
    }

    tx.commit().await.map_err(from_sqlx)
  }
}
