//! Trellis Graph
//!
//! This crate persists the action/artifact dependency graph in a
//! [`trellis_kv`] store. It is organised in layers:
//!
//! - a key codec: order-preserving tuple keys under per-relation subspaces
//!   of a [`Schema`], and fixed-int bincode records
//! - an entity store for [`Action`] and [`Artifact`] records
//! - an edge index store maintaining inputs, outputs, the producer index and
//!   the consumer index, always in the same transaction as the entity reads
//!   that justify them
//! - navigation cursors that resolve edges lazily, one read transaction per
//!   call
//!
//! [`Graph`] is the entry point. Every operation takes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

mod action;
mod artifact;
mod edge;
mod entity;
mod error;
mod graph;
mod id;
mod keys;
mod records;
mod schema;
mod tuple;

pub use action::Action;
pub use artifact::{Artifact, ArtifactKind};
pub use entity::Entity;
pub use error::{DecodeError, GraphError};
pub use graph::{ActionDeclaration, DeclaredAction, Graph};
pub use id::{ActionId, ArtifactId};
pub use keys::{ActionKey, ArtifactKey, ConsumerKey, InputKey, KeyCodec, OutputKey, ProducerKey};
pub use records::{ActionRecord, ArtifactRecord, ConsumerMarker, EdgeRecord, ProducerRecord};
pub use schema::{Relation, Schema, Subspace};
pub use tuple::Element;
