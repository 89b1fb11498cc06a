use thiserror::Error;
use trellis_graph::GraphError;

#[derive(Debug, Error)]
pub enum ScriptError {
  /// A binding was called with arguments of the wrong shape.
  #[error("invalid arguments: {0}")]
  Validation(String),

  /// Statement `statement` (1-based) failed; earlier statements stay
  /// committed.
  #[error("script aborted at statement {statement} (`{label}`): {source}")]
  Aborted {
    statement: usize,
    label: String,
    #[source]
    source: Box<ScriptError>,
  },

  #[error("lua error: {0}")]
  Lua(#[from] mlua::Error),

  #[error("graph error: {0}")]
  Graph(#[from] GraphError),

  #[error("failed to read script: {0}")]
  Io(#[from] std::io::Error),

  #[error("script evaluation cancelled")]
  Cancelled,
}

impl ScriptError {
  pub(crate) fn validation(message: impl Into<String>) -> Self {
    ScriptError::Validation(message.into())
  }

  /// Lift the error into Lua so it unwinds the script.
  pub(crate) fn into_lua(self) -> mlua::Error {
    mlua::Error::external(self)
  }
}
