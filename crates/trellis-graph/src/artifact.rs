use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use trellis_kv::Transaction;

use crate::action::Action;
use crate::entity::{self, Entity, StoredEntity};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::id::ArtifactId;
use crate::keys::ArtifactKey;
use crate::records::ArtifactRecord;
use crate::schema::Relation;

/// What an artifact holds on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
  File,
  Directory,
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactKind::File => f.write_str("file"),
      ArtifactKind::Directory => f.write_str("directory"),
    }
  }
}

/// Cursor over a stored artifact.
///
/// Holds the decoded record. [`producer`](Artifact::producer) and
/// [`consumers`](Artifact::consumers) each run their own read transaction.
#[derive(Clone)]
pub struct Artifact {
  graph: Graph,
  id: ArtifactId,
  record: ArtifactRecord,
}

impl Artifact {
  pub(crate) fn create(
    graph: &Graph,
    tx: &Transaction,
    label: &str,
    kind: ArtifactKind,
  ) -> Result<Self, GraphError> {
    let record = ArtifactRecord {
      label: label.to_string(),
      kind,
    };
    entity::insert(graph, tx, ArtifactId::new(), record)
  }

  pub fn id(&self) -> ArtifactId {
    self.id
  }

  pub fn label(&self) -> &str {
    &self.record.label
  }

  pub fn kind(&self) -> ArtifactKind {
    self.record.kind
  }

  pub fn record(&self) -> &ArtifactRecord {
    &self.record
  }

  /// The action that declared this artifact as an output.
  pub async fn producer(&self, cancel: &CancellationToken) -> Result<Action, GraphError> {
    self.graph.producer(self.id, cancel).await
  }

  /// Actions that take this artifact as an input, oldest first.
  pub async fn consumers(&self, cancel: &CancellationToken) -> Result<Vec<Action>, GraphError> {
    self.graph.consumers(self.id, cancel).await
  }
}

impl fmt::Debug for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Artifact")
      .field("id", &self.id)
      .field("label", &self.record.label)
      .field("kind", &self.record.kind)
      .finish()
  }
}

impl PartialEq for Artifact {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id && self.record == other.record
  }
}

impl Entity for Artifact {
  type Id = ArtifactId;

  const RELATION: Relation = Relation::Artifact;

  fn id(&self) -> ArtifactId {
    self.id
  }

  fn label(&self) -> &str {
    &self.record.label
  }
}

impl StoredEntity for Artifact {
  type Key = ArtifactKey;
  type Record = ArtifactRecord;

  fn key(id: ArtifactId) -> ArtifactKey {
    ArtifactKey { id }
  }

  fn key_id(key: &ArtifactKey) -> ArtifactId {
    key.id
  }

  fn from_record(graph: Graph, id: ArtifactId, record: ArtifactRecord) -> Self {
    Self { graph, id, record }
  }

  fn not_found(id: ArtifactId) -> GraphError {
    GraphError::ArtifactNotFound(id)
  }
}
