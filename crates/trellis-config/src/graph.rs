use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::enums::ConstructionMode;
use crate::retry::RetryConfig;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse config file: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Top-level configuration for the graph store and the script compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
  /// Root namespace every relation's keys live under.
  pub root_namespace: String,
  pub construction: ConstructionMode,
  /// Clear the root namespace before building a graph from a script.
  pub wipe_before_build: bool,
  /// Maximum entries read per page-transaction during enumeration.
  pub scan_page_size: usize,
  /// Per-transaction deadline. `None` means no deadline.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub transaction_timeout_ms: Option<u64>,
  pub retry: RetryConfig,
}

impl Default for GraphConfig {
  fn default() -> Self {
    Self {
      root_namespace: "trellis".to_string(),
      construction: ConstructionMode::default(),
      wipe_before_build: false,
      scan_page_size: 256,
      transaction_timeout_ms: None,
      retry: RetryConfig::default(),
    }
  }
}

impl GraphConfig {
  /// Parse and validate a JSON config document.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: GraphConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a JSON config file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_json(&content)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.root_namespace.is_empty() {
      return Err(ConfigError::Invalid(
        "root_namespace must not be empty".to_string(),
      ));
    }
    if self.scan_page_size == 0 {
      return Err(ConfigError::Invalid(
        "scan_page_size must be at least 1".to_string(),
      ));
    }
    if self.retry.max_attempts == 0 {
      return Err(ConfigError::Invalid(
        "retry.max_attempts must be at least 1".to_string(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::RetryBackoff;

  #[test]
  fn test_empty_document_uses_defaults() {
    let config = GraphConfig::from_json("{}").unwrap();
    assert_eq!(config, GraphConfig::default());
    assert_eq!(config.construction, ConstructionMode::PerStatement);
    assert!(!config.wipe_before_build);
  }

  #[test]
  fn test_partial_document_overrides() {
    let config = GraphConfig::from_json(
      r#"{
        "root_namespace": "ci",
        "construction": "atomic",
        "retry": { "backoff": "linear" }
      }"#,
    )
    .unwrap();

    assert_eq!(config.root_namespace, "ci");
    assert_eq!(config.construction, ConstructionMode::Atomic);
    assert_eq!(config.retry.backoff, RetryBackoff::Linear);
    assert_eq!(config.retry.max_attempts, 10);
    assert_eq!(config.scan_page_size, 256);
  }

  #[test]
  fn test_rejects_zero_page_size() {
    let err = GraphConfig::from_json(r#"{ "scan_page_size": 0 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }

  #[test]
  fn test_rejects_unknown_construction_mode() {
    let err = GraphConfig::from_json(r#"{ "construction": "batched" }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
  }
}
