//! Trellis Script
//!
//! Compiles Lua workflow scripts into the action/artifact graph. A script
//! sees these globals:
//!
//! - `file()` and `dir()` return an artifact kind token
//! - `action { name = ..., cmd = ..., inputs = {...}, outputs = {...} }`
//!   declares an action, wires its inputs and creates its outputs, and
//!   returns `{ id = ..., name = ..., outputs = { NAME = id, ... } }`
//! - `print(...)` logs through `tracing`
//!
//! Each `action` call is one statement. The first failing statement aborts
//! evaluation; statements before it stay committed.

mod bindings;
mod compiler;
mod error;

pub use bindings::KindToken;
pub use compiler::{ActionSummary, CompileReport, Compiler};
pub use error::ScriptError;
