//! Trellis KV
//!
//! This crate provides the transactional, ordered key-value store the graph
//! is persisted in. The store is consumed as an injected capability:
//!
//! - [`KvStore`] opens transactions against a backend
//! - [`Transaction`] buffers writes and serves reads with read-your-writes
//! - [`Database`] runs closures inside transactions, retrying on conflict and
//!   aborting on cancellation or deadline
//!
//! Two backends are provided: [`InMemoryKvStore`] (optimistic concurrency over
//! a `BTreeMap`) and [`SqliteKvStore`] (durable, on `sqlx`).

mod database;
mod error;
mod memory;
mod mutation;
mod range;
mod sqlite;
mod store;
mod transaction;

pub use database::Database;
pub use error::{KvError, TransactionError};
pub use memory::InMemoryKvStore;
pub use mutation::{Mutation, WriteBuffer};
pub use range::{KeyRange, KeyValue, key_after, strinc};
pub use sqlite::SqliteKvStore;
pub use store::{KvStore, TransactionBackend};
pub use transaction::{ReadTransaction, Transaction};
