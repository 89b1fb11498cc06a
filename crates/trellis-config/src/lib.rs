//! Trellis Config
//!
//! This crate contains the serializable configuration types for Trellis.
//! These types describe how the graph store is laid out in the keyspace, how
//! transactions are retried, and how workflow scripts are turned into
//! transactions.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=trellis.json`)
//! - Defaults, when no file is given
//!
//! Every field has a default, so a partial file only overrides what it names.

mod enums;
mod graph;
mod retry;

pub use enums::{ConstructionMode, RetryBackoff};
pub use graph::{ConfigError, GraphConfig};
pub use retry::RetryConfig;
