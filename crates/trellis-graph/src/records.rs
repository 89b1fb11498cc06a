//! Stored values.
//!
//! Records use bincode with fixed-width integers and reject trailing bytes,
//! so every record has exactly one encoding and a truncated or padded value
//! fails to decode.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;
use crate::error::{DecodeError, GraphError};
use crate::id::ActionId;

fn options() -> impl Options {
  bincode::DefaultOptions::new()
    .with_fixint_encoding()
    .reject_trailing_bytes()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, GraphError> {
  options().serialize(value).map_err(GraphError::Encode)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
  Ok(options().deserialize(bytes)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
  pub label: String,
  pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
  pub label: String,
  pub kind: ArtifactKind,
}

/// Value of an input or output edge: the name the action binds it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
  pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRecord {
  pub action: ActionId,
}

/// Existence marker stored under a consumer key. Encodes to no bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerMarker;

impl ConsumerMarker {
  pub fn encode(&self) -> Vec<u8> {
    Vec::new()
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
    if bytes.is_empty() {
      Ok(ConsumerMarker)
    } else {
      Err(DecodeError::UnexpectedPayload(bytes.len()))
    }
  }
}
