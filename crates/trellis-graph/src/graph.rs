use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use trellis_config::GraphConfig;
use trellis_kv::{Database, KvStore};

use crate::action::Action;
use crate::artifact::{Artifact, ArtifactKind};
use crate::edge;
use crate::entity;
use crate::error::GraphError;
use crate::id::{ActionId, ArtifactId};
use crate::schema::Schema;

const DEFAULT_PAGE_SIZE: usize = 256;

/// An action together with all of its edges, committed as one transaction by
/// [`Graph::declare_action`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDeclaration {
  pub label: String,
  pub command: String,
  /// Input name to existing artifact.
  pub inputs: BTreeMap<String, ArtifactId>,
  /// Output name to the kind of the artifact to create.
  pub outputs: BTreeMap<String, ArtifactKind>,
}

/// Result of [`Graph::declare_action`].
#[derive(Debug, Clone)]
pub struct DeclaredAction {
  pub action: Action,
  pub outputs: BTreeMap<String, Artifact>,
}

/// Transactional action/artifact graph.
///
/// Cheap to clone. Every write is a single transaction; every read-side call
/// is a single read transaction, except enumerations, which read one page per
/// transaction.
#[derive(Clone)]
pub struct Graph {
  db: Database,
  schema: Arc<Schema>,
  page_size: usize,
}

impl Graph {
  pub fn new(db: Database, schema: Schema) -> Self {
    Self {
      db,
      schema: Arc::new(schema),
      page_size: DEFAULT_PAGE_SIZE,
    }
  }

  /// Build a graph over `store` with the schema, retry policy, deadline and
  /// page size from `config`.
  pub fn from_config(store: Arc<dyn KvStore>, config: &GraphConfig) -> Self {
    let db = Database::new(store)
      .with_retry(config.retry.clone())
      .with_timeout(config.transaction_timeout_ms.map(Duration::from_millis));

    Self::new(db, Schema::new(&config.root_namespace)).with_page_size(config.scan_page_size)
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  pub fn schema(&self) -> &Schema {
    &self.schema
  }

  pub fn database(&self) -> &Database {
    &self.db
  }

  pub(crate) fn page_size(&self) -> usize {
    self.page_size
  }

  #[instrument(name = "graph_create_action", skip(self, command, cancel), fields(label = %label))]
  pub async fn create_action(
    &self,
    label: &str,
    command: &str,
    cancel: &CancellationToken,
  ) -> Result<Action, GraphError> {
    let action = self
      .db
      .transact(cancel, |tx| async move {
        Action::create(self, &tx, label, command)
      })
      .await
      .map_err(|e| e.in_operation("create_action"))?;

    debug!(action_id = %action.id(), "action_created");
    Ok(action)
  }

  pub async fn action(
    &self,
    id: ActionId,
    cancel: &CancellationToken,
  ) -> Result<Action, GraphError> {
    self
      .db
      .read_transact(cancel, |tx| async move {
        entity::fetch::<Action>(self, &tx, id).await
      })
      .await
      .map_err(|e| e.in_operation("get_action"))
  }

  /// Every action in ascending id (creation) order.
  ///
  /// The stream is lazy and reads one page per transaction.
  pub fn list_actions(
    &self,
    cancel: &CancellationToken,
  ) -> BoxStream<'static, Result<Action, GraphError>> {
    entity::list::<Action>(self, cancel, "list_actions")
  }

  #[instrument(name = "graph_create_artifact", skip(self, cancel), fields(label = %label, kind = %kind))]
  pub async fn create_artifact(
    &self,
    label: &str,
    kind: ArtifactKind,
    cancel: &CancellationToken,
  ) -> Result<Artifact, GraphError> {
    let artifact = self
      .db
      .transact(cancel, |tx| async move {
        Artifact::create(self, &tx, label, kind)
      })
      .await
      .map_err(|e| e.in_operation("create_artifact"))?;

    debug!(artifact_id = %artifact.id(), "artifact_created");
    Ok(artifact)
  }

  pub async fn artifact(
    &self,
    id: ArtifactId,
    cancel: &CancellationToken,
  ) -> Result<Artifact, GraphError> {
    self
      .db
      .read_transact(cancel, |tx| async move {
        entity::fetch::<Artifact>(self, &tx, id).await
      })
      .await
      .map_err(|e| e.in_operation("get_artifact"))
  }

  /// Every artifact in ascending id (creation) order.
  pub fn list_artifacts(
    &self,
    cancel: &CancellationToken,
  ) -> BoxStream<'static, Result<Artifact, GraphError>> {
    entity::list::<Artifact>(self, cancel, "list_artifacts")
  }

  /// Record `artifact` as input `name` of `action`, and `action` as a
  /// consumer of `artifact`. Re-adding the same pair only rewrites the name.
  #[instrument(
    name = "graph_add_input",
    skip(self, cancel),
    fields(action_id = %action, artifact_id = %artifact, name = %name)
  )]
  pub async fn add_input(
    &self,
    action: ActionId,
    name: &str,
    artifact: ArtifactId,
    cancel: &CancellationToken,
  ) -> Result<(), GraphError> {
    self
      .db
      .transact(cancel, |tx| async move {
        edge::add_input(self, &tx, action, name, artifact).await
      })
      .await
      .map_err(|e| e.in_operation("add_input"))?;

    debug!("input_added");
    Ok(())
  }

  /// Create an artifact produced by `action` as its output `name`.
  ///
  /// The artifact record, the output edge and the producer entry commit
  /// together.
  #[instrument(
    name = "graph_add_output",
    skip(self, label, cancel),
    fields(action_id = %action, name = %name, kind = %kind)
  )]
  pub async fn add_output(
    &self,
    action: ActionId,
    name: &str,
    label: &str,
    kind: ArtifactKind,
    cancel: &CancellationToken,
  ) -> Result<Artifact, GraphError> {
    let artifact = self
      .db
      .transact(cancel, |tx| async move {
        edge::add_output(self, &tx, action, name, label, kind).await
      })
      .await
      .map_err(|e| e.in_operation("add_output"))?;

    debug!(artifact_id = %artifact.id(), "output_added");
    Ok(artifact)
  }

  pub async fn producer(
    &self,
    artifact: ArtifactId,
    cancel: &CancellationToken,
  ) -> Result<Action, GraphError> {
    self
      .db
      .read_transact(cancel, |tx| async move {
        edge::producer(self, &tx, artifact).await
      })
      .await
      .map_err(|e| e.in_operation("resolve_producer"))
  }

  pub async fn consumers(
    &self,
    artifact: ArtifactId,
    cancel: &CancellationToken,
  ) -> Result<Vec<Action>, GraphError> {
    self
      .db
      .read_transact(cancel, |tx| async move {
        edge::consumers(self, &tx, artifact).await
      })
      .await
      .map_err(|e| e.in_operation("resolve_consumers"))
  }

  pub async fn inputs(
    &self,
    action: ActionId,
    cancel: &CancellationToken,
  ) -> Result<BTreeMap<String, Artifact>, GraphError> {
    self
      .db
      .read_transact(cancel, |tx| async move {
        edge::inputs(self, &tx, action).await
      })
      .await
      .map_err(|e| e.in_operation("resolve_inputs"))
  }

  pub async fn outputs(
    &self,
    action: ActionId,
    cancel: &CancellationToken,
  ) -> Result<BTreeMap<String, Artifact>, GraphError> {
    self
      .db
      .read_transact(cancel, |tx| async move {
        edge::outputs(self, &tx, action).await
      })
      .await
      .map_err(|e| e.in_operation("resolve_outputs"))
  }

  /// Create an action with all of its inputs and outputs in one transaction.
  ///
  /// Inputs are wired before outputs, each in ascending name order. Output
  /// artifacts take the action's label. Nothing is written if any input
  /// artifact is missing.
  #[instrument(
    name = "graph_declare_action",
    skip(self, declaration, cancel),
    fields(label = %declaration.label)
  )]
  pub async fn declare_action(
    &self,
    declaration: &ActionDeclaration,
    cancel: &CancellationToken,
  ) -> Result<DeclaredAction, GraphError> {
    let declared = self
      .db
      .transact(cancel, |tx| async move {
        let action = Action::create(self, &tx, &declaration.label, &declaration.command)?;

        for (name, artifact) in &declaration.inputs {
          edge::add_input(self, &tx, action.id(), name, *artifact).await?;
        }

        let mut outputs = BTreeMap::new();
        for (name, kind) in &declaration.outputs {
          let artifact =
            edge::add_output(self, &tx, action.id(), name, &declaration.label, *kind).await?;
          outputs.insert(name.clone(), artifact);
        }

        Ok::<_, GraphError>(DeclaredAction { action, outputs })
      })
      .await
      .map_err(|e| e.in_operation("declare_action"))?;

    debug!(action_id = %declared.action.id(), "action_declared");
    Ok(declared)
  }

  /// Clear every key under the schema's root namespace.
  #[instrument(name = "graph_wipe", skip(self, cancel))]
  pub async fn wipe(&self, cancel: &CancellationToken) -> Result<(), GraphError> {
    let range = self.schema.root().range()?;
    self
      .db
      .clear_range(cancel, &range)
      .await
      .map_err(|e| GraphError::from(e).in_operation("wipe"))?;

    info!("graph_wiped");
    Ok(())
  }
}
