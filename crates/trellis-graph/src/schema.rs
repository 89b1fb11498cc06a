use std::fmt;

use trellis_kv::{KeyRange, KvError};

use crate::error::DecodeError;
use crate::tuple::{self, Element};

/// One of the six relations the graph is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
  Action,
  Artifact,
  Input,
  Output,
  Producer,
  Consumer,
}

impl Relation {
  pub const ALL: [Relation; 6] = [
    Relation::Action,
    Relation::Artifact,
    Relation::Input,
    Relation::Output,
    Relation::Producer,
    Relation::Consumer,
  ];

  /// Namespace name the relation is stored under.
  pub fn name(&self) -> &'static str {
    match self {
      Relation::Action => "action",
      Relation::Artifact => "artifact",
      Relation::Input => "input",
      Relation::Output => "output",
      Relation::Producer => "producer",
      Relation::Consumer => "consumer",
    }
  }
}

impl fmt::Display for Relation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A key prefix made of a packed tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
  prefix: Vec<u8>,
}

impl Subspace {
  pub fn new(name: &str) -> Self {
    Self {
      prefix: tuple::pack(&[Element::String(name.to_string())]),
    }
  }

  /// Nested subspace named `name`.
  pub fn sub(&self, name: &str) -> Self {
    let mut prefix = self.prefix.clone();
    tuple::pack_into(&mut prefix, &[Element::String(name.to_string())]);
    Self { prefix }
  }

  pub fn prefix(&self) -> &[u8] {
    &self.prefix
  }

  pub fn pack(&self, elements: &[Element]) -> Vec<u8> {
    let mut key = self.prefix.clone();
    tuple::pack_into(&mut key, elements);
    key
  }

  /// Decode the tuple following this subspace's prefix.
  pub fn unpack(&self, key: &[u8]) -> Result<Vec<Element>, DecodeError> {
    let rest = key
      .strip_prefix(self.prefix.as_slice())
      .ok_or(DecodeError::InvalidPrefix)?;
    tuple::unpack(rest)
  }

  /// Every key under this subspace.
  pub fn range(&self) -> Result<KeyRange, KvError> {
    KeyRange::prefix(&self.prefix)
  }

  /// Every key that extends the partial tuple `elements`.
  pub fn range_of(&self, elements: &[Element]) -> Result<KeyRange, KvError> {
    KeyRange::prefix(&self.pack(elements))
  }
}

/// Keyspace layout: a root namespace with one subspace per relation.
///
/// Two schemas with different roots never see each other's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
  root: Subspace,
  action: Subspace,
  artifact: Subspace,
  input: Subspace,
  output: Subspace,
  producer: Subspace,
  consumer: Subspace,
}

impl Schema {
  pub fn new(root_namespace: &str) -> Self {
    let root = Subspace::new(root_namespace);
    Self {
      action: root.sub(Relation::Action.name()),
      artifact: root.sub(Relation::Artifact.name()),
      input: root.sub(Relation::Input.name()),
      output: root.sub(Relation::Output.name()),
      producer: root.sub(Relation::Producer.name()),
      consumer: root.sub(Relation::Consumer.name()),
      root,
    }
  }

  pub fn root(&self) -> &Subspace {
    &self.root
  }

  pub fn subspace(&self, relation: Relation) -> &Subspace {
    match relation {
      Relation::Action => &self.action,
      Relation::Artifact => &self.artifact,
      Relation::Input => &self.input,
      Relation::Output => &self.output,
      Relation::Producer => &self.producer,
      Relation::Consumer => &self.consumer,
    }
  }
}

impl Default for Schema {
  fn default() -> Self {
    Self::new("trellis")
  }
}
