use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mlua::Lua;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use trellis_config::{ConstructionMode, GraphConfig};
use trellis_graph::{ActionDeclaration, ActionId, ArtifactId, Graph};

use crate::bindings;
use crate::error::ScriptError;

/// One action declared by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSummary {
  /// 1-based statement number of the `action` call.
  pub statement: usize,
  pub id: ActionId,
  pub label: String,
  pub inputs: BTreeMap<String, ArtifactId>,
  pub outputs: BTreeMap<String, ArtifactId>,
}

/// Actions declared by a successful compilation, in statement order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
  pub actions: Vec<ActionSummary>,
}

/// Evaluates workflow scripts against a [`Graph`].
#[derive(Clone)]
pub struct Compiler {
  graph: Graph,
  mode: ConstructionMode,
}

impl Compiler {
  pub fn new(graph: Graph) -> Self {
    Self {
      graph,
      mode: ConstructionMode::default(),
    }
  }

  pub fn from_config(graph: Graph, config: &GraphConfig) -> Self {
    Self::new(graph).with_mode(config.construction)
  }

  pub fn with_mode(mut self, mode: ConstructionMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn mode(&self) -> ConstructionMode {
    self.mode
  }

  /// Read and compile the script at `path`.
  pub async fn compile_file(
    &self,
    path: impl AsRef<Path>,
    cancel: &CancellationToken,
  ) -> Result<CompileReport, ScriptError> {
    let path = path.as_ref();
    let source = tokio::fs::read_to_string(path).await?;
    self
      .compile(&source, &path.display().to_string(), cancel)
      .await
  }

  /// Evaluate `source`, committing each declared action to the graph.
  ///
  /// On failure, actions committed by earlier statements remain in the graph.
  #[instrument(
    name = "script_compile",
    skip(self, source, cancel),
    fields(chunk = %chunk_name, mode = ?self.mode)
  )]
  pub async fn compile(
    &self,
    source: &str,
    chunk_name: &str,
    cancel: &CancellationToken,
  ) -> Result<CompileReport, ScriptError> {
    let session = Arc::new(Session::new(self.graph.clone(), self.mode, cancel.clone()));
    let lua = Lua::new();
    bindings::install(&lua, session.clone())?;

    let result = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(ScriptError::Cancelled),
      result = lua.load(source).set_name(chunk_name).exec_async() => result.map_err(classify),
    };

    // A statement failure wins over whatever error it unwound the script
    // with, and over a script that swallowed it with pcall.
    if let Some(abort) = session.take_abort() {
      warn!(error = %abort, "script_aborted");
      return Err(abort);
    }
    result?;

    let report = CompileReport {
      actions: session.take_declared(),
    };
    info!(actions = report.actions.len(), "script_compiled");
    Ok(report)
  }
}

/// Recover a validation error raised by a binding from the Lua error that
/// carried it out of the script.
fn classify(err: mlua::Error) -> ScriptError {
  fn validation(err: &mlua::Error) -> Option<String> {
    match err {
      mlua::Error::CallbackError { cause, .. } => validation(cause),
      mlua::Error::WithContext { cause, .. } => validation(cause),
      mlua::Error::ExternalError(inner) => match inner.downcast_ref::<ScriptError>() {
        Some(ScriptError::Validation(message)) => Some(message.clone()),
        _ => None,
      },
      _ => None,
    }
  }

  match validation(&err) {
    Some(message) => ScriptError::Validation(message),
    None => ScriptError::Lua(err),
  }
}

/// State shared between one compilation and the bindings it installed.
pub(crate) struct Session {
  graph: Graph,
  mode: ConstructionMode,
  cancel: CancellationToken,
  statements: AtomicUsize,
  declared: Mutex<Vec<ActionSummary>>,
  abort: Mutex<Option<ScriptError>>,
}

impl Session {
  fn new(graph: Graph, mode: ConstructionMode, cancel: CancellationToken) -> Self {
    Self {
      graph,
      mode,
      cancel,
      statements: AtomicUsize::new(0),
      declared: Mutex::new(Vec::new()),
      abort: Mutex::new(None),
    }
  }

  fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn take_abort(&self) -> Option<ScriptError> {
    Self::lock(&self.abort).take()
  }

  fn take_declared(&self) -> Vec<ActionSummary> {
    std::mem::take(&mut *Self::lock(&self.declared))
  }

  /// Run one `action` statement. `parse` validates the call's arguments.
  pub(crate) async fn declare<P>(&self, parse: P) -> Result<ActionSummary, mlua::Error>
  where
    P: FnOnce() -> Result<ActionDeclaration, ScriptError>,
  {
    if Self::lock(&self.abort).is_some() {
      return Err(mlua::Error::RuntimeError(
        "script evaluation already aborted".to_string(),
      ));
    }

    let statement = self.statements.fetch_add(1, Ordering::SeqCst) + 1;

    let declaration = match parse() {
      Ok(declaration) => declaration,
      Err(e) => return Err(self.abort(statement, "<unnamed>", e)),
    };

    match self.build(statement, &declaration).await {
      Ok(summary) => {
        info!(
          statement,
          action_id = %summary.id,
          label = %summary.label,
          inputs = summary.inputs.len(),
          outputs = summary.outputs.len(),
          "action_declared"
        );
        Self::lock(&self.declared).push(summary.clone());
        Ok(summary)
      }
      Err(e) => Err(self.abort(statement, &declaration.label, e)),
    }
  }

  async fn build(
    &self,
    statement: usize,
    declaration: &ActionDeclaration,
  ) -> Result<ActionSummary, ScriptError> {
    let cancel = &self.cancel;

    match self.mode {
      ConstructionMode::Atomic => {
        let declared = self.graph.declare_action(declaration, cancel).await?;
        Ok(ActionSummary {
          statement,
          id: declared.action.id(),
          label: declaration.label.clone(),
          inputs: declaration.inputs.clone(),
          outputs: declared
            .outputs
            .iter()
            .map(|(name, artifact)| (name.clone(), artifact.id()))
            .collect(),
        })
      }
      ConstructionMode::PerStatement => {
        let action = self
          .graph
          .create_action(&declaration.label, &declaration.command, cancel)
          .await?;

        for (name, id) in &declaration.inputs {
          let artifact = self.graph.artifact(*id, cancel).await?;
          action.add_input(name, &artifact, cancel).await?;
        }

        let mut outputs = BTreeMap::new();
        for (name, kind) in &declaration.outputs {
          let artifact = action
            .add_output(name, &declaration.label, *kind, cancel)
            .await?;
          outputs.insert(name.clone(), artifact.id());
        }

        Ok(ActionSummary {
          statement,
          id: action.id(),
          label: declaration.label.clone(),
          inputs: declaration.inputs.clone(),
          outputs,
        })
      }
    }
  }

  /// Record the statement failure and return the Lua error that unwinds the
  /// script.
  fn abort(&self, statement: usize, label: &str, source: ScriptError) -> mlua::Error {
    let abort = ScriptError::Aborted {
      statement,
      label: label.to_string(),
      source: Box::new(source),
    };
    let message = abort.to_string();
    *Self::lock(&self.abort) = Some(abort);
    mlua::Error::RuntimeError(message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_recovers_validation_from_callback() {
    let err = mlua::Error::CallbackError {
      traceback: "stack traceback:".to_string(),
      cause: Arc::new(ScriptError::validation("file() does not accept arguments").into_lua()),
    };

    match classify(err) {
      ScriptError::Validation(message) => {
        assert_eq!(message, "file() does not accept arguments")
      }
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn test_classify_keeps_plain_lua_errors() {
    let err = mlua::Error::RuntimeError("boom".to_string());
    assert!(matches!(classify(err), ScriptError::Lua(_)));
  }
}
