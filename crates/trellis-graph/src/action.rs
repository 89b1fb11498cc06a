use std::collections::BTreeMap;
use std::fmt;

use tokio_util::sync::CancellationToken;
use trellis_kv::Transaction;

use crate::artifact::{Artifact, ArtifactKind};
use crate::entity::{self, Entity, StoredEntity};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::id::ActionId;
use crate::keys::ActionKey;
use crate::records::ActionRecord;
use crate::schema::Relation;

/// Cursor over a stored action.
///
/// Carries the decoded record; edge lookups are resolved on demand, each in
/// its own read transaction.
#[derive(Clone)]
pub struct Action {
  graph: Graph,
  id: ActionId,
  record: ActionRecord,
}

impl Action {
  pub(crate) fn create(
    graph: &Graph,
    tx: &Transaction,
    label: &str,
    command: &str,
  ) -> Result<Self, GraphError> {
    let record = ActionRecord {
      label: label.to_string(),
      command: command.to_string(),
    };
    entity::insert(graph, tx, ActionId::new(), record)
  }

  pub fn id(&self) -> ActionId {
    self.id
  }

  pub fn label(&self) -> &str {
    &self.record.label
  }

  pub fn command(&self) -> &str {
    &self.record.command
  }

  pub fn record(&self) -> &ActionRecord {
    &self.record
  }

  pub async fn inputs(
    &self,
    cancel: &CancellationToken,
  ) -> Result<BTreeMap<String, Artifact>, GraphError> {
    self.graph.inputs(self.id, cancel).await
  }

  pub async fn outputs(
    &self,
    cancel: &CancellationToken,
  ) -> Result<BTreeMap<String, Artifact>, GraphError> {
    self.graph.outputs(self.id, cancel).await
  }

  /// Bind `artifact` as this action's input `name`.
  pub async fn add_input(
    &self,
    name: &str,
    artifact: &Artifact,
    cancel: &CancellationToken,
  ) -> Result<(), GraphError> {
    self
      .graph
      .add_input(self.id, name, artifact.id(), cancel)
      .await
  }

  /// Create a new artifact produced by this action as output `name`.
  pub async fn add_output(
    &self,
    name: &str,
    label: &str,
    kind: ArtifactKind,
    cancel: &CancellationToken,
  ) -> Result<Artifact, GraphError> {
    self
      .graph
      .add_output(self.id, name, label, kind, cancel)
      .await
  }
}

impl fmt::Debug for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Action")
      .field("id", &self.id)
      .field("label", &self.record.label)
      .field("command", &self.record.command)
      .finish()
  }
}

impl PartialEq for Action {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id && self.record == other.record
  }
}

impl Entity for Action {
  type Id = ActionId;

  const RELATION: Relation = Relation::Action;

  fn id(&self) -> ActionId {
    self.id
  }

  fn label(&self) -> &str {
    &self.record.label
  }
}

impl StoredEntity for Action {
  type Key = ActionKey;
  type Record = ActionRecord;

  fn key(id: ActionId) -> ActionKey {
    ActionKey { id }
  }

  fn key_id(key: &ActionKey) -> ActionId {
    key.id
  }

  fn from_record(graph: Graph, id: ActionId, record: ActionRecord) -> Self {
    Self { graph, id, record }
  }

  fn not_found(id: ActionId) -> GraphError {
    GraphError::ActionNotFound(id)
  }
}
