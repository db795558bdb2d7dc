//! Lexically-scoped environment (spec.md §3 "Environment", §4.1).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::error::EnvError;
use crate::value::Value;

/// A nested lexical scope. Environments are shared via `Arc` because script
/// tool closures and event-handler bodies outlive the statement that
/// created them, and because concurrent event emission (spec.md §5) may be
/// walking a scope chain rooted at the same global environment as the main
/// evaluation thread.
pub struct Environment {
    bindings: RwLock<std::collections::HashMap<String, Value>>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    pub fn root() -> Arc<Environment> {
        Arc::new(Environment {
            bindings: RwLock::new(std::collections::HashMap::new()),
            parent: None,
        })
    }

    /// A fresh child scope. Used for function/tool call frames, block
    /// scopes, and — rooted at the global environment rather than the
    /// caller's scope — per-emission event handler scopes (spec.md §4.5).
    pub fn child(parent: &Arc<Environment>) -> Arc<Environment> {
        Arc::new(Environment {
            bindings: RwLock::new(std::collections::HashMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Environment>> {
        self.parent.as_ref()
    }

    /// `Get(k)`: lookup in current scope then each outer scope in turn.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self
            .bindings
            .read()
            .expect("environment lock poisoned")
            .get(key)
        {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(key))
    }

    /// `Set(k,v)`: writes into current scope, creating or overwriting.
    /// Does not walk outward.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.bindings
            .write()
            .expect("environment lock poisoned")
            .insert(key.into(), value);
    }

    /// `Define(k,v)`: creates in current scope iff absent here.
    pub fn define(&self, key: impl Into<String>, value: Value) -> Result<(), EnvError> {
        let key = key.into();
        let mut bindings = self.bindings.write().expect("environment lock poisoned");
        if bindings.contains_key(&key) {
            return Err(EnvError::AlreadyDefined(key));
        }
        bindings.insert(key, value);
        Ok(())
    }

    /// `Update(k,v)`: finds the defining scope by walking outward and
    /// replaces the binding there. Fails if no scope defines `k`.
    pub fn update(&self, key: &str, value: Value) -> Result<(), EnvError> {
        {
            let mut bindings = self.bindings.write().expect("environment lock poisoned");
            if bindings.contains_key(key) {
                bindings.insert(key.to_string(), value);
                return Ok(());
            }
        }
        match &self.parent {
            Some(parent) => parent.update(key, value),
            None => Err(EnvError::NotFound(key.to_string())),
        }
    }

    /// `Delete(k)`: removes from current scope only.
    pub fn delete(&self, key: &str) -> bool {
        self.bindings
            .write()
            .expect("environment lock poisoned")
            .remove(key)
            .is_some()
    }

    /// `Has(k)`: true iff `Get(k)` would find a binding.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// `Keys()`: keys defined in this scope only.
    pub fn keys(&self) -> Vec<String> {
        self.bindings
            .read()
            .expect("environment lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// `AllKeys()`: union over the scope chain, deduplicated.
    pub fn all_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut scope = Some(self);
        let mut ordered = Vec::new();
        while let Some(env) = scope {
            for key in env.bindings.read().expect("environment lock poisoned").keys() {
                if seen.insert(key.clone()) {
                    ordered.push(key.clone());
                }
            }
            scope = env.parent.as_deref();
        }
        ordered
    }

    /// `Clone()`: shallow copy of this scope's bindings; same parent pointer.
    pub fn shallow_clone(&self) -> Arc<Environment> {
        let bindings = self
            .bindings
            .read()
            .expect("environment lock poisoned")
            .clone();
        Arc::new(Environment {
            bindings: RwLock::new(bindings),
            parent: self.parent.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_the_value() {
        let env = Environment::root();
        env.set("x", Value::Number(1.0));
        assert_eq!(env.get("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn get_walks_outward_to_nearest_binding() {
        let root = Environment::root();
        root.set("x", Value::Number(1.0));
        let child = Environment::child(&root);
        child.set("x", Value::Number(2.0));
        let grandchild = Environment::child(&child);

        assert_eq!(grandchild.get("x"), Some(Value::Number(2.0)));
    }

    #[test]
    fn update_writes_to_defining_scope_not_current_scope() {
        let root = Environment::root();
        root.set("x", Value::Number(1.0));
        let child = Environment::child(&root);

        child.update("x", Value::Number(9.0)).expect("update ok");

        assert_eq!(child.keys(), Vec::<String>::new());
        assert_eq!(root.get("x"), Some(Value::Number(9.0)));
    }

    #[test]
    fn update_fails_when_no_scope_defines_the_key() {
        let env = Environment::root();
        assert_eq!(
            env.update("missing", Value::Null),
            Err(EnvError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn define_fails_when_key_already_exists_in_current_scope() {
        let env = Environment::root();
        env.define("x", Value::Number(1.0)).expect("first define ok");
        assert_eq!(
            env.define("x", Value::Number(2.0)),
            Err(EnvError::AlreadyDefined("x".to_string()))
        );
    }

    #[test]
    fn delete_only_removes_from_current_scope() {
        let root = Environment::root();
        root.set("x", Value::Number(1.0));
        let child = Environment::child(&root);

        assert!(!child.delete("x"));
        assert!(root.get("x").is_some());
        assert!(root.delete("x"));
        assert!(root.get("x").is_none());
    }

    #[test]
    fn all_keys_is_the_deduplicated_union_of_the_scope_chain() {
        let root = Environment::root();
        root.set("a", Value::Null);
        root.set("b", Value::Null);
        let child = Environment::child(&root);
        child.set("b", Value::Null);
        child.set("c", Value::Null);

        let mut keys = child.all_keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn shallow_clone_copies_bindings_but_keeps_parent_pointer() {
        let root = Environment::root();
        root.set("a", Value::Null);
        let child = Environment::child(&root);
        child.set("b", Value::Number(1.0));

        let cloned = child.shallow_clone();
        cloned.set("c", Value::Number(2.0));

        assert!(child.get("c").is_none());
        assert_eq!(cloned.get("a"), Some(Value::Null));
        assert_eq!(cloned.get("b"), Some(Value::Number(1.0)));
    }
}
