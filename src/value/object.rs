use std::collections::HashMap;

use super::Value;

/// Wraps a [`Value`] as the payload of an object property (spec.md §3).
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub value: Value,
}

impl PropertyDescriptor {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// Insertion-ordered string-keyed map backing the `Object` value variant.
///
/// No runtime ordered-map primitive is assumed (spec.md §9): order is kept
/// explicitly as a key list alongside the hash-keyed descriptor table.
#[derive(Debug, Clone, Default)]
pub struct OrderedObject {
    order: Vec<String>,
    entries: HashMap<String, PropertyDescriptor>,
}

impl OrderedObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// `GetPropertyValue(k)`: returns null for absent keys, never an error.
    pub fn get_property_value(&self, key: &str) -> Value {
        self.entries
            .get(key)
            .map(|descriptor| descriptor.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sets a property, preserving first-insertion order for existing keys.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, PropertyDescriptor::new(value));
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|existing| existing != key);
            true
        } else {
            false
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn values(&self) -> Vec<Value> {
        self.order
            .iter()
            .map(|key| self.entries[key].value.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.order
            .iter()
            .map(|key| (key.clone(), self.entries[key].value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<(String, Value)> for OrderedObject {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut object = OrderedObject::new();
        for (key, value) in iter {
            object.set(key, value);
        }
        object
    }
}
