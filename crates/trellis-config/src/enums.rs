use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  Linear,
  #[default]
  Exponential,
}

/// Transaction granularity used when a script declares an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionMode {
  /// The action, each input and each output commit as separate transactions.
  /// A statement that fails midway leaves a partially wired action behind.
  #[default]
  PerStatement,
  /// The action and all of its edges commit in one transaction.
  Atomic,
}
