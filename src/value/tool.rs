//! Callable values (spec.md §3 `Tool`, GLOSSARY `Tool`).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::ast::Block;
use crate::env::Environment;
use crate::error::RuntimeError;

use super::Value;

/// A `tool NAME(params) { body }` declaration or `ToolLiteral` — closes over
/// the environment active at its declaration site (spec.md §4.1 "closures").
#[derive(Clone)]
pub struct ScriptTool {
    pub name: String,
    pub params: Vec<String>,
    pub body: Arc<Block>,
    pub closure: Arc<Environment>,
}

impl fmt::Debug for ScriptTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTool")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl PartialEq for ScriptTool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body) && Arc::ptr_eq(&self.closure, &other.closure)
    }
}

pub type NativeToolFuture =
    Pin<Box<dyn Future<Output = Result<Value, RuntimeError>> + Send + 'static>>;

/// A host-implemented tool surfaced to scripts (spec.md §4.6): `exec`,
/// `grep`, `view_file`, `edit_file` are registered this way under the
/// `gsh.tools` namespace.
#[derive(Clone)]
pub struct NativeTool {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
    pub invoke: Arc<dyn Fn(JsonValue) -> NativeToolFuture + Send + Sync>,
}

impl fmt::Debug for NativeTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl PartialEq for NativeTool {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.invoke, &other.invoke)
    }
}

/// Result of `obj.method` member access when `method` resolves to a builtin
/// bound to `obj` (e.g. `conversation.push`). Transient: never stored in an
/// environment, only ever immediately called (spec.md §3 `MethodBound`).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBound {
    pub receiver: Box<Value>,
    pub method: String,
}
