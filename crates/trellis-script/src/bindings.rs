//! Globals exposed to workflow scripts.

use std::collections::BTreeMap;
use std::sync::Arc;

use mlua::{Function, Lua, MetaMethod, MultiValue, Table, UserData, UserDataMethods, Value};
use tracing::info;
use trellis_graph::{ActionDeclaration, ArtifactId, ArtifactKind};

use crate::compiler::{ActionSummary, Session};
use crate::error::ScriptError;

/// Opaque value returned by `file()` and `dir()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindToken(pub ArtifactKind);

impl UserData for KindToken {
  fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
    methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
      Ok(format!("{}()", kind_constructor(this.0)))
    });
  }
}

fn kind_constructor(kind: ArtifactKind) -> &'static str {
  match kind {
    ArtifactKind::File => "file",
    ArtifactKind::Directory => "dir",
  }
}

fn kind_of(value: &Value) -> Option<ArtifactKind> {
  match value {
    Value::UserData(ud) => ud.borrow::<KindToken>().ok().map(|token| token.0),
    _ => None,
  }
}

pub(crate) fn install(lua: &Lua, session: Arc<Session>) -> mlua::Result<()> {
  let globals = lua.globals();

  globals.set("file", kind_function(lua, ArtifactKind::File)?)?;
  globals.set("dir", kind_function(lua, ArtifactKind::Directory)?)?;

  let action = lua.create_async_function(move |lua, args: MultiValue| {
    let session = session.clone();
    async move {
      let summary = session.declare(|| parse_declaration(args)).await?;
      summary_table(&lua, &summary)
    }
  })?;
  globals.set("action", action)?;

  let print = lua.create_function(|lua, args: MultiValue| {
    let tostring: Function = lua.globals().get("tostring")?;
    let mut parts = Vec::with_capacity(args.len());
    for value in args {
      parts.push(tostring.call::<String>(value)?);
    }
    info!(target: "trellis_script::print", "{}", parts.join("\t"));
    Ok(())
  })?;
  globals.set("print", print)?;

  Ok(())
}

fn kind_function(lua: &Lua, kind: ArtifactKind) -> mlua::Result<Function> {
  lua.create_function(move |lua, args: MultiValue| {
    if !args.is_empty() {
      return Err(
        ScriptError::validation(format!("{}() does not accept arguments", kind_constructor(kind)))
          .into_lua(),
      );
    }
    lua.create_userdata(KindToken(kind))
  })
}

/// Parse the single table argument of `action`.
fn parse_declaration(args: MultiValue) -> Result<ActionDeclaration, ScriptError> {
  if args.len() != 1 {
    return Err(ScriptError::validation(
      "action takes a single table: action { name = ..., cmd = ... }",
    ));
  }
  let table = match args.into_iter().next() {
    Some(Value::Table(table)) => table,
    Some(other) => {
      return Err(ScriptError::validation(format!(
        "action takes a table, got {}",
        other.type_name()
      )));
    }
    None => return Err(ScriptError::validation("action takes a table")),
  };

  let mut label = None;
  let mut command = None;
  let mut inputs = BTreeMap::new();
  let mut outputs = BTreeMap::new();

  for pair in table.pairs::<Value, Value>() {
    let (key, value) = pair?;
    let field = match key {
      Value::String(s) => s.to_str()?.to_string(),
      _ => {
        return Err(ScriptError::validation(
          "action does not accept positional arguments",
        ));
      }
    };

    match field.as_str() {
      "name" => label = Some(expect_string(value, "name")?),
      "cmd" => command = Some(expect_string(value, "cmd")?),
      "inputs" => inputs = parse_inputs(value)?,
      "outputs" => outputs = parse_outputs(value)?,
      other => {
        return Err(ScriptError::validation(format!(
          "unknown action field `{other}`"
        )));
      }
    }
  }

  Ok(ActionDeclaration {
    label: label.ok_or_else(|| ScriptError::validation("action requires `name`"))?,
    command: command.ok_or_else(|| ScriptError::validation("action requires `cmd`"))?,
    inputs,
    outputs,
  })
}

fn expect_string(value: Value, what: &str) -> Result<String, ScriptError> {
  match value {
    Value::String(s) => Ok(s.to_str()?.to_string()),
    other => Err(ScriptError::validation(format!(
      "{what} must be a string, got {}",
      other.type_name()
    ))),
  }
}

fn expect_table(value: Value, what: &str) -> Result<Option<Table>, ScriptError> {
  match value {
    Value::Nil => Ok(None),
    Value::Table(table) => Ok(Some(table)),
    other => Err(ScriptError::validation(format!(
      "{what} must be a table, got {}",
      other.type_name()
    ))),
  }
}

fn parse_inputs(value: Value) -> Result<BTreeMap<String, ArtifactId>, ScriptError> {
  let mut inputs = BTreeMap::new();
  let Some(table) = expect_table(value, "inputs")? else {
    return Ok(inputs);
  };

  for pair in table.pairs::<Value, Value>() {
    let (key, value) = pair?;
    let name = expect_string(key, "input names")?;
    let id = expect_string(value, &format!("input `{name}`"))?;
    let id: ArtifactId = id.parse().map_err(|e| {
      ScriptError::validation(format!("input `{name}` is not a valid artifact id: {e}"))
    })?;
    inputs.insert(name, id);
  }
  Ok(inputs)
}

fn parse_outputs(value: Value) -> Result<BTreeMap<String, ArtifactKind>, ScriptError> {
  let mut outputs = BTreeMap::new();
  let Some(table) = expect_table(value, "outputs")? else {
    return Ok(outputs);
  };

  for pair in table.pairs::<Value, Value>() {
    let (key, value) = pair?;
    let name = expect_string(key, "output names")?;
    let kind = kind_of(&value).ok_or_else(|| {
      ScriptError::validation(format!(
        "output `{name}` must be file() or dir(), got {}",
        value.type_name()
      ))
    })?;
    outputs.insert(name, kind);
  }
  Ok(outputs)
}

fn summary_table(lua: &Lua, summary: &ActionSummary) -> mlua::Result<Table> {
  let outputs = lua.create_table()?;
  for (name, id) in &summary.outputs {
    outputs.set(name.as_str(), id.to_string())?;
  }

  let table = lua.create_table()?;
  table.set("id", summary.id.to_string())?;
  table.set("name", summary.label.as_str())?;
  table.set("outputs", outputs)?;
  Ok(table)
}
