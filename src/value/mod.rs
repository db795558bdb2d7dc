//! Dynamic value model (spec.md §3 "Value Model").

pub mod agent;
pub mod collections;
pub mod conversation;
pub mod object;
pub mod tool;

use std::sync::{Arc, RwLock};

pub use agent::{AgentValue, ModelValue, SdkModelRef, Tier};
pub use collections::{ValueMap, ValueSet};
pub use conversation::{ChatMessage, Conversation, Role, ToolCallRequest};
pub use object::OrderedObject;
pub use tool::{MethodBound, NativeTool, ScriptTool};

/// Every runtime value a script expression can evaluate to (spec.md §3).
///
/// Mutable containers (`Array`, `Object`, `Map`, `Set`) and the config maps
/// on `Model`/`Agent` are `Arc<RwLock<_>>` rather than `Rc<RefCell<_>>`:
/// event handlers may run on a different thread than the script evaluation
/// that reached them (spec.md §5), so shared mutable state must be
/// `Send + Sync`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Arc<RwLock<Vec<Value>>>),
    Object(Arc<RwLock<OrderedObject>>),
    Map(Arc<RwLock<ValueMap>>),
    Set(Arc<RwLock<ValueSet>>),
    Model(Arc<ModelValue>),
    Agent(Arc<AgentValue>),
    SdkModelRef(SdkModelRef),
    Conversation(Arc<RwLock<Conversation>>),
    Tool(Arc<ScriptTool>),
    NativeTool(Arc<NativeTool>),
    /// Transient receiver-bound method reference; never stored in an
    /// environment (spec.md §3 `MethodBound`).
    MethodBound(Box<MethodBound>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn object(object: OrderedObject) -> Value {
        Value::Object(Arc::new(RwLock::new(object)))
    }

    pub fn map(map: ValueMap) -> Value {
        Value::Map(Arc::new(RwLock::new(map)))
    }

    pub fn set(set: ValueSet) -> Value {
        Value::Set(Arc::new(RwLock::new(set)))
    }

    pub fn conversation(conversation: Conversation) -> Value {
        Value::Conversation(Arc::new(RwLock::new(conversation)))
    }

    /// `Type()` (spec.md §3 capability set): the name used in
    /// `TypeMismatch` errors and by any script-level `typeof`-style builtin.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Model(_) => "model",
            Value::Agent(_) => "agent",
            Value::SdkModelRef(_) => "sdk_model_ref",
            Value::Conversation(_) => "conversation",
            Value::Tool(_) => "tool",
            Value::NativeTool(_) => "tool",
            Value::MethodBound(_) => "tool",
        }
    }

    /// `String()`: the textual representation used by string concatenation,
    /// `ValueSet` keying, and diagnostic output. Containers render their
    /// elements; callables render by name.
    pub fn string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let items = items.read().expect("array lock poisoned");
                format!(
                    "[{}]",
                    items
                        .iter()
                        .map(Value::string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Object(object) => {
                let object = object.read().expect("object lock poisoned");
                format!(
                    "{{{}}}",
                    object
                        .entries()
                        .into_iter()
                        .map(|(k, v)| format!("{k}: {}", v.string()))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Map(map) => format!("Map({})", map.read().expect("map lock poisoned").size()),
            Value::Set(set) => format!("Set({})", set.read().expect("set lock poisoned").size()),
            Value::Model(model) => format!("Model({})", model.name),
            Value::Agent(agent) => format!("Agent({})", agent.name),
            Value::SdkModelRef(reference) => format!("SDKModelRef({})", reference.tier.as_str()),
            Value::Conversation(conversation) => format!(
                "Conversation({} messages)",
                conversation
                    .read()
                    .expect("conversation lock poisoned")
                    .messages
                    .len()
            ),
            Value::Tool(tool) => format!("Tool({})", tool.name),
            Value::NativeTool(tool) => format!("Tool({})", tool.name),
            Value::MethodBound(bound) => format!("Tool({})", bound.method),
        }
    }

    /// `IsTruthy()`: `null`, `false`, `0`, and `""` are falsy; every other
    /// value — including empty containers — is truthy (spec.md §3, §4.2).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// `Equals(other)`: structural equality for primitives, identity (same
    /// underlying `Arc`) for containers and callables (spec.md §3).
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
            (Value::Model(a), Value::Model(b)) => Arc::ptr_eq(a, b),
            (Value::Agent(a), Value::Agent(b)) => Arc::ptr_eq(a, b),
            (Value::SdkModelRef(a), Value::SdkModelRef(b)) => a == b,
            (Value::Conversation(a), Value::Conversation(b)) => Arc::ptr_eq(a, b),
            (Value::Tool(a), Value::Tool(b)) => Arc::ptr_eq(a, b),
            (Value::NativeTool(a), Value::NativeTool(b)) => Arc::ptr_eq(a, b),
            (Value::MethodBound(a), Value::MethodBound(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

/// Integral numbers render without a trailing `.0`, matching how a shell
/// script author expects `x = 2 + 3 * 4` to print (spec.md §8).
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_values_match_spec_table() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
    }

    #[test]
    fn truthy_values_include_empty_containers() {
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::object(OrderedObject::new()).is_truthy());
    }

    #[test]
    fn integral_numbers_print_without_trailing_zero() {
        assert_eq!(Value::Number(14.0).string(), "14");
        assert_eq!(Value::Number(2.5).string(), "2.5");
    }

    #[test]
    fn containers_compare_by_identity_not_contents() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);
        assert!(!a.equals(&b));
        assert!(a.equals(&a.clone()));
    }

    #[test]
    fn primitives_compare_structurally() {
        assert!(Value::String("x".to_string()).equals(&Value::String("x".to_string())));
        assert!(!Value::Number(1.0).equals(&Value::Number(2.0)));
    }
}
