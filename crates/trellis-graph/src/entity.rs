use std::fmt;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use trellis_kv::{KeyValue, ReadTransaction, Transaction};
use uuid::Uuid;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::keys::KeyCodec;
use crate::records;
use crate::schema::Relation;

/// Common surface of actions and artifacts.
pub trait Entity {
  type Id: Copy + fmt::Display + Into<Uuid>;

  /// Relation the entity's records are stored in.
  const RELATION: Relation;

  fn id(&self) -> Self::Id;

  fn label(&self) -> &str;
}

/// Storage hooks shared by point lookups, inserts and scans.
pub(crate) trait StoredEntity: Entity + Sized + Send + 'static {
  type Key: KeyCodec;
  type Record: Serialize + DeserializeOwned;

  fn key(id: Self::Id) -> Self::Key;

  fn key_id(key: &Self::Key) -> Self::Id;

  fn from_record(graph: Graph, id: Self::Id, record: Self::Record) -> Self;

  fn not_found(id: Self::Id) -> GraphError;
}

/// Read an entity's record, if it exists.
pub(crate) async fn load<E: StoredEntity>(
  graph: &Graph,
  tx: &ReadTransaction,
  id: E::Id,
) -> Result<Option<E>, GraphError> {
  let key = E::key(id).encode(graph.schema());
  match tx.get(&key).await? {
    Some(bytes) => {
      let record = records::decode(&bytes)?;
      Ok(Some(E::from_record(graph.clone(), id, record)))
    }
    None => Ok(None),
  }
}

/// Read an entity's record, failing with the entity's NotFound error.
pub(crate) async fn fetch<E: StoredEntity>(
  graph: &Graph,
  tx: &ReadTransaction,
  id: E::Id,
) -> Result<E, GraphError> {
  load::<E>(graph, tx, id)
    .await?
    .ok_or_else(|| E::not_found(id))
}

/// Write a new entity record and return its cursor.
pub(crate) fn insert<E: StoredEntity>(
  graph: &Graph,
  tx: &Transaction,
  id: E::Id,
  record: E::Record,
) -> Result<E, GraphError> {
  let key = E::key(id).encode(graph.schema());
  tx.set(&key, &records::encode(&record)?)?;
  Ok(E::from_record(graph.clone(), id, record))
}

fn decode_row<E: StoredEntity>(graph: &Graph, row: &KeyValue) -> Result<E, GraphError> {
  let key = <E::Key as KeyCodec>::decode(graph.schema(), &row.key)?;
  let record = records::decode(&row.value)?;
  Ok(E::from_record(graph.clone(), E::key_id(&key), record))
}

/// Lazily enumerate every entity of kind `E` in ascending id order.
pub(crate) fn list<E: StoredEntity>(
  graph: &Graph,
  cancel: &CancellationToken,
  operation: &'static str,
) -> BoxStream<'static, Result<E, GraphError>> {
  let range = match graph.schema().subspace(E::RELATION).range() {
    Ok(range) => range,
    Err(e) => {
      let err = GraphError::from(e).in_operation(operation);
      return stream::once(async move { Err(err) }).boxed();
    }
  };

  let rows = graph
    .database()
    .scan(range, graph.page_size(), cancel.clone());
  let graph = graph.clone();

  rows
    .map(move |row| {
      let row = row.map_err(|e| GraphError::from(e).in_operation(operation))?;
      decode_row::<E>(&graph, &row)
    })
    .boxed()
}
