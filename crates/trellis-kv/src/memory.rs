use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::error::KvError;
use crate::mutation::Mutation;
use crate::range::{KeyRange, KeyValue, key_after};
use crate::store::{KvStore, TransactionBackend};

/// Number of recent commits kept for conflict detection.
const DEFAULT_CONFLICT_WINDOW: usize = 4096;

/// In-memory ordered KV store with optimistic concurrency control.
///
/// Suitable for tests and ephemeral graphs. Every transaction reads from the
/// snapshot that was current when it began and records what it read; at
/// commit, a write committed by someone else after the transaction began that
/// overlaps those reads fails the commit with [`KvError::Conflict`].
/// Transactions that only write never conflict.
#[derive(Clone)]
pub struct InMemoryKvStore {
  state: Arc<RwLock<MemoryState>>,
}

type Snapshot = BTreeMap<Vec<u8>, Vec<u8>>;

struct MemoryState {
  /// Copied on write while a transaction still holds the previous snapshot.
  data: Arc<Snapshot>,
  version: u64,
  commits: VecDeque<CommitRecord>,
  /// Highest version whose commit record was dropped from `commits`.
  pruned_through: u64,
  window: usize,
}

/// Keys and ranges written by one commit.
struct CommitRecord {
  version: u64,
  keys: Vec<Vec<u8>>,
  ranges: Vec<KeyRange>,
}

impl CommitRecord {
  fn overlaps(&self, reads: &ReadSet) -> bool {
    let key_hit = self.keys.iter().any(|key| reads.covers(key));
    let range_hit = self.ranges.iter().any(|range| reads.intersects(range));
    key_hit || range_hit
  }
}

#[derive(Default)]
struct ReadSet {
  keys: Vec<Vec<u8>>,
  ranges: Vec<KeyRange>,
}

impl ReadSet {
  fn covers(&self, key: &[u8]) -> bool {
    self.keys.iter().any(|k| k.as_slice() == key) || self.ranges.iter().any(|r| r.contains(key))
  }

  fn intersects(&self, range: &KeyRange) -> bool {
    self.keys.iter().any(|k| range.contains(k)) || self.ranges.iter().any(|r| r.intersects(range))
  }
}

impl InMemoryKvStore {
  pub fn new() -> Self {
    Self::with_conflict_window(DEFAULT_CONFLICT_WINDOW)
  }

  /// Create a store that remembers the last `window` commits.
  ///
  /// Transactions that began before the oldest remembered commit fail with
  /// [`KvError::TransactionTooOld`] when they try to commit.
  pub fn with_conflict_window(window: usize) -> Self {
    Self {
      state: Arc::new(RwLock::new(MemoryState {
        data: Arc::new(BTreeMap::new()),
        version: 0,
        commits: VecDeque::new(),
        pruned_through: 0,
        window: window.max(1),
      })),
    }
  }

  /// Number of committed keys, for diagnostics and tests.
  pub fn len(&self) -> usize {
    self.state.read().map(|s| s.data.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for InMemoryKvStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
  async fn begin(&self) -> Result<Box<dyn TransactionBackend>, KvError> {
    let (read_version, snapshot) = {
      let state = self.state.read().map_err(|_| poisoned())?;
      (state.version, state.data.clone())
    };

    Ok(Box::new(MemoryTransaction {
      state: self.state.clone(),
      read_version,
      snapshot,
      reads: Mutex::new(ReadSet::default()),
    }))
  }
}

struct MemoryTransaction {
  state: Arc<RwLock<MemoryState>>,
  read_version: u64,
  snapshot: Arc<Snapshot>,
  reads: Mutex<ReadSet>,
}

impl MemoryTransaction {
  fn record_key(&self, key: &[u8]) -> Result<(), KvError> {
    self.reads.lock().map_err(|_| poisoned())?.keys.push(key.to_vec());
    Ok(())
  }

  fn record_range(&self, range: KeyRange) -> Result<(), KvError> {
    self.reads.lock().map_err(|_| poisoned())?.ranges.push(range);
    Ok(())
  }
}

#[async_trait]
impl TransactionBackend for MemoryTransaction {
  async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
    self.record_key(key)?;
    Ok(self.snapshot.get(key).cloned())
  }

  async fn get_range(
    &self,
    range: &KeyRange,
    limit: Option<usize>,
  ) -> Result<Vec<KeyValue>, KvError> {
    let rows: Vec<KeyValue> = self
      .snapshot
      .range(range.begin.clone()..range.end.clone())
      .take(limit.unwrap_or(usize::MAX))
      .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
      .collect();

    // A page cut short by the limit only depends on the keys it returned.
    let observed = match (limit, rows.last()) {
      (Some(limit), Some(last)) if rows.len() == limit => {
        KeyRange::new(range.begin.clone(), key_after(&last.key))
      }
      _ => range.clone(),
    };
    self.record_range(observed)?;

    Ok(rows)
  }

  async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), KvError> {
    let reads = std::mem::take(&mut *self.reads.lock().map_err(|_| poisoned())?);
    let mut state = self.state.write().map_err(|_| poisoned())?;

    let has_reads = !reads.keys.is_empty() || !reads.ranges.is_empty();
    if has_reads {
      if self.read_version < state.pruned_through {
        return Err(KvError::TransactionTooOld);
      }
      let conflicted = state
        .commits
        .iter()
        .filter(|c| c.version > self.read_version)
        .any(|c| c.overlaps(&reads));
      if conflicted {
        return Err(KvError::Conflict);
      }
    }

    if mutations.is_empty() {
      return Ok(());
    }

    let mut record = CommitRecord {
      version: state.version + 1,
      keys: Vec::new(),
      ranges: Vec::new(),
    };

    let data = Arc::make_mut(&mut state.data);
    for mutation in mutations {
      match mutation {
        Mutation::Set { key, value } => {
          record.keys.push(key.clone());
          data.insert(key, value);
        }
        Mutation::ClearRange(range) => {
          let doomed: Vec<Vec<u8>> = data
            .range(range.begin.clone()..range.end.clone())
            .map(|(k, _)| k.clone())
            .collect();
          for key in doomed {
            data.remove(&key);
          }
          record.ranges.push(range);
        }
      }
    }

    state.version = record.version;
    state.commits.push_back(record);
    while state.commits.len() > state.window {
      if let Some(dropped) = state.commits.pop_front() {
        state.pruned_through = dropped.version;
      }
    }

    Ok(())
  }
}

fn poisoned() -> KvError {
  KvError::Unavailable("in-memory store lock poisoned".to_string())
}
