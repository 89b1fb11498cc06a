//! Typed keys for each relation.
//!
//! Field order fixes scan order: input and output keys lead with the action
//! id, consumer keys lead with the artifact id, so a prefix scan on the
//! leading id yields that entity's edges ascending in the second id.

use uuid::Uuid;

use crate::error::DecodeError;
use crate::id::{ActionId, ArtifactId};
use crate::schema::{Relation, Schema};
use crate::tuple::Element;

/// Encoding between a typed key and its bytes under a [`Schema`].
pub trait KeyCodec: Sized {
  const RELATION: Relation;

  /// Number of tuple elements after the relation prefix.
  const ARITY: usize;

  fn elements(&self) -> Vec<Element>;

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError>;

  fn encode(&self, schema: &Schema) -> Vec<u8> {
    schema.subspace(Self::RELATION).pack(&self.elements())
  }

  fn decode(schema: &Schema, key: &[u8]) -> Result<Self, DecodeError> {
    let elements = schema.subspace(Self::RELATION).unpack(key)?;
    if elements.len() != Self::ARITY {
      return Err(DecodeError::InvalidTupleLength {
        expected: Self::ARITY,
        actual: elements.len(),
      });
    }
    Self::from_elements(elements)
  }
}

fn take_uuid(element: Element) -> Result<Uuid, DecodeError> {
  match element {
    Element::Uuid(uuid) => Ok(uuid),
    other => Err(DecodeError::InvalidElementType {
      expected: "uuid",
      actual: other.type_name().to_string(),
    }),
  }
}

fn take_pair(elements: Vec<Element>) -> Result<(Uuid, Uuid), DecodeError> {
  let actual = elements.len();
  let mut it = elements.into_iter();
  match (it.next(), it.next()) {
    (Some(first), Some(second)) => Ok((take_uuid(first)?, take_uuid(second)?)),
    _ => Err(DecodeError::InvalidTupleLength {
      expected: 2,
      actual,
    }),
  }
}

fn take_single(elements: Vec<Element>) -> Result<Uuid, DecodeError> {
  let actual = elements.len();
  match elements.into_iter().next() {
    Some(first) => take_uuid(first),
    None => Err(DecodeError::InvalidTupleLength {
      expected: 1,
      actual,
    }),
  }
}

/// `(action, id)` -> [`ActionRecord`](crate::ActionRecord)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionKey {
  pub id: ActionId,
}

impl KeyCodec for ActionKey {
  const RELATION: Relation = Relation::Action;
  const ARITY: usize = 1;

  fn elements(&self) -> Vec<Element> {
    vec![Element::Uuid(self.id.as_uuid())]
  }

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError> {
    Ok(Self {
      id: take_single(elements)?.into(),
    })
  }
}

/// `(artifact, id)` -> [`ArtifactRecord`](crate::ArtifactRecord)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactKey {
  pub id: ArtifactId,
}

impl KeyCodec for ArtifactKey {
  const RELATION: Relation = Relation::Artifact;
  const ARITY: usize = 1;

  fn elements(&self) -> Vec<Element> {
    vec![Element::Uuid(self.id.as_uuid())]
  }

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError> {
    Ok(Self {
      id: take_single(elements)?.into(),
    })
  }
}

/// `(input, action, artifact)` -> [`EdgeRecord`](crate::EdgeRecord)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputKey {
  pub action: ActionId,
  pub artifact: ArtifactId,
}

impl KeyCodec for InputKey {
  const RELATION: Relation = Relation::Input;
  const ARITY: usize = 2;

  fn elements(&self) -> Vec<Element> {
    vec![
      Element::Uuid(self.action.as_uuid()),
      Element::Uuid(self.artifact.as_uuid()),
    ]
  }

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError> {
    let (action, artifact) = take_pair(elements)?;
    Ok(Self {
      action: action.into(),
      artifact: artifact.into(),
    })
  }
}

/// `(output, action, artifact)` -> [`EdgeRecord`](crate::EdgeRecord)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputKey {
  pub action: ActionId,
  pub artifact: ArtifactId,
}

impl KeyCodec for OutputKey {
  const RELATION: Relation = Relation::Output;
  const ARITY: usize = 2;

  fn elements(&self) -> Vec<Element> {
    vec![
      Element::Uuid(self.action.as_uuid()),
      Element::Uuid(self.artifact.as_uuid()),
    ]
  }

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError> {
    let (action, artifact) = take_pair(elements)?;
    Ok(Self {
      action: action.into(),
      artifact: artifact.into(),
    })
  }
}

/// `(producer, artifact)` -> [`ProducerRecord`](crate::ProducerRecord)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerKey {
  pub artifact: ArtifactId,
}

impl KeyCodec for ProducerKey {
  const RELATION: Relation = Relation::Producer;
  const ARITY: usize = 1;

  fn elements(&self) -> Vec<Element> {
    vec![Element::Uuid(self.artifact.as_uuid())]
  }

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError> {
    Ok(Self {
      artifact: take_single(elements)?.into(),
    })
  }
}

/// `(consumer, artifact, action)` -> [`ConsumerMarker`](crate::ConsumerMarker)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerKey {
  pub artifact: ArtifactId,
  pub action: ActionId,
}

impl KeyCodec for ConsumerKey {
  const RELATION: Relation = Relation::Consumer;
  const ARITY: usize = 2;

  fn elements(&self) -> Vec<Element> {
    vec![
      Element::Uuid(self.artifact.as_uuid()),
      Element::Uuid(self.action.as_uuid()),
    ]
  }

  fn from_elements(elements: Vec<Element>) -> Result<Self, DecodeError> {
    let (artifact, action) = take_pair(elements)?;
    Ok(Self {
      artifact: artifact.into(),
      action: action.into(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_round_trip<K: KeyCodec + PartialEq + std::fmt::Debug>(key: K) {
    for schema in [Schema::default(), Schema::new("nested\0root")] {
      let bytes = key.encode(&schema);
      assert!(bytes.starts_with(schema.subspace(K::RELATION).prefix()));
      assert_eq!(K::decode(&schema, &bytes).unwrap(), key);
    }
  }

  #[test]
  fn test_every_key_round_trips() {
    let action = ActionId::new();
    let artifact = ArtifactId::new();

    assert_round_trip(ActionKey { id: action });
    assert_round_trip(ArtifactKey { id: artifact });
    assert_round_trip(InputKey { action, artifact });
    assert_round_trip(OutputKey { action, artifact });
    assert_round_trip(ProducerKey { artifact });
    assert_round_trip(ConsumerKey { artifact, action });
  }

  #[test]
  fn test_nil_and_max_ids_round_trip() {
    assert_round_trip(ProducerKey {
      artifact: Uuid::nil().into(),
    });
    assert_round_trip(ConsumerKey {
      artifact: Uuid::max().into(),
      action: Uuid::nil().into(),
    });
  }

  #[test]
  fn test_wrong_arity_reports_shape() {
    let schema = Schema::default();
    let bytes = schema
      .subspace(Relation::Consumer)
      .pack(&[Element::Uuid(Uuid::now_v7())]);
    let err = ConsumerKey::decode(&schema, &bytes).unwrap_err();
    assert!(matches!(
      err,
      DecodeError::InvalidTupleLength {
        expected: 2,
        actual: 1
      }
    ));
  }

  #[test]
  fn test_wrong_element_type_reports_shape() {
    let schema = Schema::default();
    let bytes = schema
      .subspace(Relation::Action)
      .pack(&[Element::String("not-an-id".to_string())]);
    let err = ActionKey::decode(&schema, &bytes).unwrap_err();
    match err {
      DecodeError::InvalidElementType { expected, actual } => {
        assert_eq!(expected, "uuid");
        assert_eq!(actual, "string");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_key_from_other_relation_is_rejected() {
    let schema = Schema::default();
    let bytes = OutputKey {
      action: ActionId::new(),
      artifact: ArtifactId::new(),
    }
    .encode(&schema);
    assert!(matches!(
      InputKey::decode(&schema, &bytes),
      Err(DecodeError::InvalidPrefix)
    ));
  }

  #[test]
  fn test_edges_of_one_action_are_contiguous() {
    let schema = Schema::default();
    let action = ActionId::new();
    let other = ActionId::new();
    let range = schema
      .subspace(Relation::Input)
      .range_of(&[Element::Uuid(action.as_uuid())])
      .unwrap();

    let mine = InputKey {
      action,
      artifact: ArtifactId::new(),
    };
    let theirs = InputKey {
      action: other,
      artifact: ArtifactId::new(),
    };
    assert!(range.contains(&mine.encode(&schema)));
    assert!(!range.contains(&theirs.encode(&schema)));
  }
}
