use std::collections::BTreeMap;

use crate::range::{KeyRange, KeyValue};

/// A buffered write, applied to the store at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  Set { key: Vec<u8>, value: Vec<u8> },
  ClearRange(KeyRange),
}

impl Mutation {
  /// Whether applying this mutation can change anything inside `range`.
  pub fn touches(&self, range: &KeyRange) -> bool {
    match self {
      Mutation::Set { key, .. } => range.contains(key),
      Mutation::ClearRange(cleared) => cleared.intersects(range),
    }
  }
}

/// Ordered log of a transaction's writes.
///
/// Reads consult the buffer before the backend so a transaction always sees
/// its own uncommitted writes.
#[derive(Debug, Default)]
pub struct WriteBuffer {
  mutations: Vec<Mutation>,
}

impl WriteBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, key: &[u8], value: &[u8]) {
    self.mutations.push(Mutation::Set {
      key: key.to_vec(),
      value: value.to_vec(),
    });
  }

  pub fn clear_range(&mut self, range: &KeyRange) {
    if !range.is_empty() {
      self.mutations.push(Mutation::ClearRange(range.clone()));
    }
  }

  pub fn is_empty(&self) -> bool {
    self.mutations.is_empty()
  }

  /// Outcome of the buffered writes for `key`.
  ///
  /// `None` means the buffer never touched the key; `Some(None)` means the
  /// latest buffered write cleared it.
  pub fn lookup(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
    self.mutations.iter().rev().find_map(|m| match m {
      Mutation::Set { key: k, value } if k.as_slice() == key => Some(Some(value.clone())),
      Mutation::ClearRange(range) if range.contains(key) => Some(None),
      _ => None,
    })
  }

  pub fn touches(&self, range: &KeyRange) -> bool {
    self.mutations.iter().any(|m| m.touches(range))
  }

  /// Apply the buffered writes on top of committed rows read from `range`.
  pub fn overlay(&self, range: &KeyRange, base: Vec<KeyValue>) -> Vec<KeyValue> {
    let mut rows: BTreeMap<Vec<u8>, Vec<u8>> =
      base.into_iter().map(|kv| (kv.key, kv.value)).collect();

    for mutation in &self.mutations {
      match mutation {
        Mutation::Set { key, value } if range.contains(key) => {
          rows.insert(key.clone(), value.clone());
        }
        Mutation::ClearRange(cleared) if cleared.intersects(range) => {
          rows.retain(|key, _| !cleared.contains(key));
        }
        _ => {}
      }
    }

    rows
      .into_iter()
      .map(|(key, value)| KeyValue { key, value })
      .collect()
  }

  pub fn take(&mut self) -> Vec<Mutation> {
    std::mem::take(&mut self.mutations)
  }
}
