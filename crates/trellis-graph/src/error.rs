use thiserror::Error;
use trellis_kv::{KvError, TransactionError};
use uuid::Uuid;

use crate::id::{ActionId, ArtifactId};
use crate::schema::Relation;

/// A stored key or record did not have the expected shape.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("key is not under the expected namespace prefix")]
  InvalidPrefix,

  #[error("invalid tuple length: expected {expected}, got {actual}")]
  InvalidTupleLength { expected: usize, actual: usize },

  #[error("invalid element type: expected {expected}, got {actual}")]
  InvalidElementType {
    expected: &'static str,
    actual: String,
  },

  #[error("invalid element length: expected {expected} bytes, got {actual}")]
  InvalidLength { expected: usize, actual: usize },

  /// An element ran past the end of the key without its terminator.
  #[error("truncated tuple element")]
  Truncated,

  #[error("malformed record: {0}")]
  Record(#[from] bincode::Error),

  /// A marker value that must be empty carried bytes.
  #[error("unexpected payload of {0} bytes")]
  UnexpectedPayload(usize),
}

/// Errors raised by graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("action not found: {0}")]
  ActionNotFound(ActionId),

  #[error("artifact not found: {0}")]
  ArtifactNotFound(ArtifactId),

  /// The artifact exists but was never declared as an action's output.
  #[error("artifact {0} has no producer")]
  NoProducer(ArtifactId),

  /// An edge record points at an entity whose record is missing.
  #[error("{relation} edge references missing entity {id}")]
  DanglingEdge { relation: Relation, id: Uuid },

  #[error("decode error: {0}")]
  Decode(#[from] DecodeError),

  #[error("encode error: {0}")]
  Encode(#[source] bincode::Error),

  #[error("operation cancelled")]
  Cancelled,

  #[error("store error during {operation}: {source}")]
  Store {
    operation: &'static str,
    #[source]
    source: KvError,
  },
}

impl GraphError {
  /// Whether the error means a looked-up entity or edge does not exist.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      GraphError::ActionNotFound(_) | GraphError::ArtifactNotFound(_) | GraphError::NoProducer(_)
    )
  }

  /// Attach the graph operation a store error happened in.
  pub(crate) fn in_operation(self, operation: &'static str) -> Self {
    match self {
      GraphError::Store { source, .. } => GraphError::Store { operation, source },
      other => other,
    }
  }
}

impl From<KvError> for GraphError {
  fn from(err: KvError) -> Self {
    match err {
      KvError::Cancelled => GraphError::Cancelled,
      source => GraphError::Store {
        operation: "transaction",
        source,
      },
    }
  }
}

impl TransactionError for GraphError {
  fn is_retryable(&self) -> bool {
    match self {
      GraphError::Store { source, .. } => source.is_retryable(),
      _ => false,
    }
  }

  fn exhausted(self, attempts: u32) -> Self {
    match self {
      GraphError::Store { operation, source } => GraphError::Store {
        operation,
        source: TransactionError::exhausted(source, attempts),
      },
      other => other,
    }
  }
}
