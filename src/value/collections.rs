use std::collections::HashMap;

use super::Value;

/// Unordered string-keyed map (spec.md §3 `Map`): `get/set/has/delete/keys/
/// values/entries/size`.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: HashMap<String, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Value {
        self.entries.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

/// Set of values keyed by their string representation (spec.md §3 `Set`):
/// `add/has/delete/size`.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    entries: HashMap<String, Value>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Value) {
        self.entries.insert(value.string(), value);
    }

    pub fn has(&self, value: &Value) -> bool {
        self.entries.contains_key(&value.string())
    }

    pub fn delete(&mut self, value: &Value) -> bool {
        self.entries.remove(&value.string()).is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_roundtrips_through_set_get() {
        let mut map = ValueMap::new();
        map.set("a", Value::Number(1.0));
        assert_eq!(map.get("a"), Value::Number(1.0));
        assert!(map.has("a"));
        assert!(map.delete("a"));
        assert!(!map.has("a"));
    }

    #[test]
    fn set_dedupes_by_string_representation() {
        let mut set = ValueSet::new();
        set.add(Value::Number(1.0));
        set.add(Value::Number(1.0));
        set.add(Value::String("1".to_string()));

        assert_eq!(set.size(), 2);
        assert!(set.has(&Value::Number(1.0)));
    }
}
