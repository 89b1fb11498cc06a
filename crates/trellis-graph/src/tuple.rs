//! Order-preserving tuple encoding for keys.
//!
//! Packed tuples compare bytewise in the same order as their elements, so a
//! key made of a prefix plus a partial tuple bounds a contiguous range of
//! every key that extends it.

use uuid::Uuid;

use crate::error::DecodeError;

const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const UUID_CODE: u8 = 0x30;

const UUID_LEN: usize = 16;

/// One component of a packed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
  Bytes(Vec<u8>),
  String(String),
  Uuid(Uuid),
}

impl Element {
  pub fn type_name(&self) -> &'static str {
    match self {
      Element::Bytes(_) => "bytes",
      Element::String(_) => "string",
      Element::Uuid(_) => "uuid",
    }
  }

  fn pack_into(&self, out: &mut Vec<u8>) {
    match self {
      Element::Bytes(bytes) => {
        out.push(BYTES_CODE);
        push_escaped(out, bytes);
      }
      Element::String(s) => {
        out.push(STRING_CODE);
        push_escaped(out, s.as_bytes());
      }
      Element::Uuid(uuid) => {
        out.push(UUID_CODE);
        out.extend_from_slice(uuid.as_bytes());
      }
    }
  }
}

/// Append the packed form of `elements` to `out`.
pub fn pack_into(out: &mut Vec<u8>, elements: &[Element]) {
  for element in elements {
    element.pack_into(out);
  }
}

pub fn pack(elements: &[Element]) -> Vec<u8> {
  let mut out = Vec::new();
  pack_into(&mut out, elements);
  out
}

/// Decode every element of a packed tuple.
pub fn unpack(mut bytes: &[u8]) -> Result<Vec<Element>, DecodeError> {
  let mut elements = Vec::new();

  while let Some((&code, rest)) = bytes.split_first() {
    let (element, rest) = match code {
      BYTES_CODE => {
        let (raw, rest) = read_escaped(rest)?;
        (Element::Bytes(raw), rest)
      }
      STRING_CODE => {
        let (raw, rest) = read_escaped(rest)?;
        let s = String::from_utf8(raw).map_err(|_| DecodeError::InvalidElementType {
          expected: "string",
          actual: "invalid utf-8".to_string(),
        })?;
        (Element::String(s), rest)
      }
      UUID_CODE => {
        if rest.len() < UUID_LEN {
          return Err(DecodeError::InvalidLength {
            expected: UUID_LEN,
            actual: rest.len(),
          });
        }
        let (raw, rest) = rest.split_at(UUID_LEN);
        let uuid = Uuid::from_slice(raw).map_err(|_| DecodeError::InvalidLength {
          expected: UUID_LEN,
          actual: raw.len(),
        })?;
        (Element::Uuid(uuid), rest)
      }
      other => {
        return Err(DecodeError::InvalidElementType {
          expected: "tuple element",
          actual: format!("type code 0x{other:02x}"),
        });
      }
    };

    elements.push(element);
    bytes = rest;
  }

  Ok(elements)
}

fn push_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
  for &b in bytes {
    out.push(b);
    if b == 0x00 {
      out.push(0xFF);
    }
  }
  out.push(0x00);
}

fn read_escaped(bytes: &[u8]) -> Result<(Vec<u8>, &[u8]), DecodeError> {
  let mut raw = Vec::new();
  let mut i = 0;

  while i < bytes.len() {
    if bytes[i] == 0x00 {
      if bytes.get(i + 1) == Some(&0xFF) {
        raw.push(0x00);
        i += 2;
        continue;
      }
      return Ok((raw, &bytes[i + 1..]));
    }
    raw.push(bytes[i]);
    i += 1;
  }

  Err(DecodeError::Truncated)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_string_escaping() {
    let packed = pack(&[Element::String("a\0b".to_string())]);
    assert_eq!(packed, vec![0x02, b'a', 0x00, 0xFF, b'b', 0x00]);
    assert_eq!(
      unpack(&packed).unwrap(),
      vec![Element::String("a\0b".to_string())]
    );
  }

  #[test]
  fn test_mixed_tuple() {
    let id = Uuid::now_v7();
    let elements = vec![
      Element::String("trellis".to_string()),
      Element::Bytes(vec![0x00, 0x01]),
      Element::Uuid(id),
    ];
    assert_eq!(unpack(&pack(&elements)).unwrap(), elements);
  }

  #[test]
  fn test_order_preserved_for_prefixes() {
    let short = pack(&[Element::String("ab".to_string())]);
    let long = pack(&[Element::String("abc".to_string())]);
    let with_nul = pack(&[Element::String("ab\0".to_string())]);
    assert!(short < with_nul);
    assert!(with_nul < long);
  }

  #[test]
  fn test_missing_terminator_is_truncated() {
    let err = unpack(&[0x02, b'a', b'b']).unwrap_err();
    assert!(matches!(err, DecodeError::Truncated));
  }

  #[test]
  fn test_short_uuid_is_rejected() {
    let err = unpack(&[0x30, 1, 2, 3]).unwrap_err();
    assert!(matches!(
      err,
      DecodeError::InvalidLength {
        expected: 16,
        actual: 3
      }
    ));
  }

  #[test]
  fn test_unknown_type_code() {
    let err = unpack(&[0x7f]).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidElementType { .. }));
  }
}
