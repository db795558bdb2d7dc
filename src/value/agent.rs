use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::llm::ChatCompletion;

use super::Value;

/// Provider-bound configuration (spec.md §3 `Model`, GLOSSARY `Model`).
pub struct ModelValue {
    pub name: String,
    pub provider: Arc<dyn ChatCompletion>,
    /// `model` field sent on the wire request (e.g. `claude-sonnet-4-5`).
    pub model_id: String,
    pub config: RwLock<HashMap<String, Value>>,
}

impl ModelValue {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn ChatCompletion>,
        model_id: impl Into<String>,
        config: HashMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model_id: model_id.into(),
            config: RwLock::new(config),
        }
    }

    pub fn get_config(&self, key: &str) -> Value {
        self.config
            .read()
            .expect("model config lock poisoned")
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl std::fmt::Debug for ModelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelValue")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("model_id", &self.model_id)
            .finish()
    }
}

/// One of the three named slots in the process-wide SDK models registry
/// (spec.md §3 `SDKModelRef`, §5, GLOSSARY `Tier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Lite,
    Workhorse,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Lite => "lite",
            Tier::Workhorse => "workhorse",
            Tier::Premium => "premium",
        }
    }

    pub fn parse(name: &str) -> Option<Tier> {
        match name {
            "lite" => Some(Tier::Lite),
            "workhorse" => Some(Tier::Workhorse),
            "premium" => Some(Tier::Premium),
            _ => None,
        }
    }
}

/// `{Tier}` — late-bound model reference (spec.md §3 `SDKModelRef`). Each
/// call to resolve it re-reads the process-wide SDK models registry, so a
/// tier rebind takes effect on the very next resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkModelRef {
    pub tier: Tier,
}

/// A named configuration binding a model resolver, a system prompt, optional
/// tools, and free-form metadata (spec.md §3 `Agent`, GLOSSARY `Agent`).
///
/// `config` always carries a `model` entry (validated at declaration time to
/// be `Value::Model` or `Value::SdkModelRef`); everything else — including
/// unrecognized keys, which are retained rather than rejected — lives
/// alongside it so property access can walk `Config` entries uniformly.
#[derive(Debug)]
pub struct AgentValue {
    pub name: String,
    pub config: RwLock<HashMap<String, Value>>,
}

impl AgentValue {
    pub fn new(name: impl Into<String>, config: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            config: RwLock::new(config),
        }
    }

    pub fn model(&self) -> Value {
        self.config
            .read()
            .expect("agent config lock poisoned")
            .get("model")
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn get_config(&self, key: &str) -> Value {
        self.config
            .read()
            .expect("agent config lock poisoned")
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn system_prompt(&self) -> Option<String> {
        match self.get_config("systemPrompt") {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}
