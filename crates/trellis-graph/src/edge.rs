//! Edge index maintenance and resolution.
//!
//! These functions run inside a caller's transaction. `add_input` is the only
//! writer of the consumer index and `add_output` the only writer of the
//! producer index, and both check the entity records they reference in the
//! same transaction.

use std::collections::BTreeMap;

use trellis_kv::{ReadTransaction, Transaction};

use crate::action::Action;
use crate::artifact::{Artifact, ArtifactKind};
use crate::entity::{self, StoredEntity};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::id::{ActionId, ArtifactId};
use crate::keys::{ConsumerKey, InputKey, KeyCodec, OutputKey, ProducerKey};
use crate::records::{self, ConsumerMarker, EdgeRecord, ProducerRecord};
use crate::schema::Relation;
use crate::tuple::Element;

/// A named edge from an action to an artifact.
trait NamedEdgeKey: KeyCodec {
  fn artifact(&self) -> ArtifactId;
}

impl NamedEdgeKey for InputKey {
  fn artifact(&self) -> ArtifactId {
    self.artifact
  }
}

impl NamedEdgeKey for OutputKey {
  fn artifact(&self) -> ArtifactId {
    self.artifact
  }
}

pub(crate) async fn add_input(
  graph: &Graph,
  tx: &Transaction,
  action: ActionId,
  name: &str,
  artifact: ArtifactId,
) -> Result<(), GraphError> {
  let read = tx.read();
  entity::fetch::<Action>(graph, &read, action).await?;
  entity::fetch::<Artifact>(graph, &read, artifact).await?;

  let schema = graph.schema();
  let edge = records::encode(&EdgeRecord {
    name: name.to_string(),
  })?;
  tx.set(&InputKey { action, artifact }.encode(schema), &edge)?;
  tx.set(
    &ConsumerKey { artifact, action }.encode(schema),
    &ConsumerMarker.encode(),
  )?;
  Ok(())
}

pub(crate) async fn add_output(
  graph: &Graph,
  tx: &Transaction,
  action: ActionId,
  name: &str,
  label: &str,
  kind: ArtifactKind,
) -> Result<Artifact, GraphError> {
  entity::fetch::<Action>(graph, &tx.read(), action).await?;

  let artifact = Artifact::create(graph, tx, label, kind)?;

  let schema = graph.schema();
  let edge = records::encode(&EdgeRecord {
    name: name.to_string(),
  })?;
  let producer = records::encode(&ProducerRecord { action })?;
  tx.set(
    &OutputKey {
      action,
      artifact: artifact.id(),
    }
    .encode(schema),
    &edge,
  )?;
  tx.set(
    &ProducerKey {
      artifact: artifact.id(),
    }
    .encode(schema),
    &producer,
  )?;
  Ok(artifact)
}

pub(crate) async fn producer(
  graph: &Graph,
  tx: &ReadTransaction,
  artifact: ArtifactId,
) -> Result<Action, GraphError> {
  entity::fetch::<Artifact>(graph, tx, artifact).await?;

  let key = ProducerKey { artifact }.encode(graph.schema());
  let bytes = tx
    .get(&key)
    .await?
    .ok_or(GraphError::NoProducer(artifact))?;
  let record: ProducerRecord = records::decode(&bytes)?;

  resolve::<Action>(graph, tx, Relation::Producer, record.action).await
}

pub(crate) async fn consumers(
  graph: &Graph,
  tx: &ReadTransaction,
  artifact: ArtifactId,
) -> Result<Vec<Action>, GraphError> {
  entity::fetch::<Artifact>(graph, tx, artifact).await?;

  let schema = graph.schema();
  let range = schema
    .subspace(Relation::Consumer)
    .range_of(&[Element::Uuid(artifact.as_uuid())])?;

  let rows = tx.get_range(&range, None).await?;
  let mut actions = Vec::with_capacity(rows.len());
  for row in rows {
    let key = ConsumerKey::decode(schema, &row.key)?;
    ConsumerMarker::decode(&row.value)?;
    actions.push(resolve::<Action>(graph, tx, Relation::Consumer, key.action).await?);
  }
  Ok(actions)
}

pub(crate) async fn inputs(
  graph: &Graph,
  tx: &ReadTransaction,
  action: ActionId,
) -> Result<BTreeMap<String, Artifact>, GraphError> {
  named_edges::<InputKey>(graph, tx, action).await
}

pub(crate) async fn outputs(
  graph: &Graph,
  tx: &ReadTransaction,
  action: ActionId,
) -> Result<BTreeMap<String, Artifact>, GraphError> {
  named_edges::<OutputKey>(graph, tx, action).await
}

/// Resolve an action's named edges. Edges are visited in artifact creation
/// order, so when two edges share a name the newer artifact wins.
async fn named_edges<K: NamedEdgeKey>(
  graph: &Graph,
  tx: &ReadTransaction,
  action: ActionId,
) -> Result<BTreeMap<String, Artifact>, GraphError> {
  entity::fetch::<Action>(graph, tx, action).await?;

  let schema = graph.schema();
  let range = schema
    .subspace(K::RELATION)
    .range_of(&[Element::Uuid(action.as_uuid())])?;

  let rows = tx.get_range(&range, None).await?;
  let mut edges = BTreeMap::new();
  for row in rows {
    let key = K::decode(schema, &row.key)?;
    let record: EdgeRecord = records::decode(&row.value)?;
    let artifact = resolve::<Artifact>(graph, tx, K::RELATION, key.artifact()).await?;
    edges.insert(record.name, artifact);
  }
  Ok(edges)
}

async fn resolve<E: StoredEntity>(
  graph: &Graph,
  tx: &ReadTransaction,
  relation: Relation,
  id: E::Id,
) -> Result<E, GraphError> {
  entity::load::<E>(graph, tx, id)
    .await?
    .ok_or_else(|| GraphError::DanglingEdge {
      relation,
      id: id.into(),
    })
}
