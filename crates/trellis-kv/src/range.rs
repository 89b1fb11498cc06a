use crate::error::KvError;

/// A key and its value, as returned by range reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
  pub key: Vec<u8>,
  pub value: Vec<u8>,
}

impl KeyValue {
  pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
    Self {
      key: key.into(),
      value: value.into(),
    }
  }
}

/// Half-open key range `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
  pub begin: Vec<u8>,
  pub end: Vec<u8>,
}

impl KeyRange {
  pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
    Self {
      begin: begin.into(),
      end: end.into(),
    }
  }

  /// Every key starting with `prefix`.
  pub fn prefix(prefix: &[u8]) -> Result<Self, KvError> {
    Ok(Self::new(prefix.to_vec(), strinc(prefix)?))
  }

  /// The whole user keyspace.
  pub fn all() -> Self {
    Self::new(vec![0x00], vec![0xFF])
  }

  pub fn contains(&self, key: &[u8]) -> bool {
    key >= self.begin.as_slice() && key < self.end.as_slice()
  }

  pub fn intersects(&self, other: &KeyRange) -> bool {
    self.begin < other.end && other.begin < self.end
  }

  pub fn is_empty(&self) -> bool {
    self.begin >= self.end
  }
}

/// Smallest key strictly greater than every key prefixed by `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte incremented.
pub fn strinc(prefix: &[u8]) -> Result<Vec<u8>, KvError> {
  let trimmed_len = prefix
    .iter()
    .rposition(|b| *b != 0xFF)
    .map(|i| i + 1)
    .ok_or_else(|| {
      KvError::InvalidRange("prefix must contain a byte other than 0xFF".to_string())
    })?;

  let mut end = prefix[..trimmed_len].to_vec();
  if let Some(last) = end.last_mut() {
    *last += 1;
  }
  Ok(end)
}

/// Smallest key strictly greater than `key`.
pub fn key_after(key: &[u8]) -> Vec<u8> {
  let mut next = Vec::with_capacity(key.len() + 1);
  next.extend_from_slice(key);
  next.push(0x00);
  next
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_strinc() {
    assert_eq!(strinc(b"abc").unwrap(), b"abd".to_vec());
    assert_eq!(strinc(&[0x01, 0xFF, 0xFF]).unwrap(), vec![0x02]);
    assert!(strinc(&[0xFF, 0xFF]).is_err());
    assert!(strinc(&[]).is_err());
  }

  #[test]
  fn test_prefix_range_bounds() {
    let range = KeyRange::prefix(b"ab").unwrap();
    assert!(range.contains(b"ab"));
    assert!(range.contains(b"ab\xFF\xFF"));
    assert!(!range.contains(b"ac"));
    assert!(!range.contains(b"aa\xFF"));
  }

  #[test]
  fn test_intersects() {
    let a = KeyRange::new(b"a".to_vec(), b"c".to_vec());
    let b = KeyRange::new(b"b".to_vec(), b"d".to_vec());
    let c = KeyRange::new(b"c".to_vec(), b"e".to_vec());
    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
  }

  #[test]
  fn test_key_after_sorts_immediately_after() {
    let next = key_after(b"k");
    assert!(next.as_slice() > b"k".as_slice());
    assert!(next.as_slice() < b"k\x01".as_slice());
  }
}
