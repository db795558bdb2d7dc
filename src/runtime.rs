//! Runtime handle tying the evaluator to shared process-wide state
//! (spec.md §5, §6).
//!
//! Shaped after the teacher's `DependencyMap` (`src/tools/mod.rs`): one
//! cloneable handle carrying everything a script evaluation or an event
//! handler needs, threaded through every call instead of living in statics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex as AsyncMutex;

use crate::callstack::CallStackStore;
use crate::env::Environment;
use crate::events::EventManager;
use crate::module::{ModuleLoader, ScriptParser};
use crate::value::tool::NativeTool;
use crate::value::{ModelValue, Tier};

/// Runtime-wide cancellation signal (spec.md §5 "Cancellation"):
/// `SetContext`/`Context` swap the whole handle; a reset handle is never
/// cancelled.
#[derive(Clone, Default)]
pub struct CancellationContext(Arc<AtomicBool>);

impl CancellationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The pre-existing bash-runner a real deployment mirrors `cd`/env mutations
/// into (spec.md §6 "Shell-runner capability"). An external collaborator;
/// the runtime only needs this narrow surface.
pub trait ShellRunner: Send + Sync {
    fn set_env(&self, key: &str, value: Option<&str>);
    fn working_directory(&self) -> PathBuf;
}

/// The `{Lite, Workhorse, Premium}` process-wide slots scripts rebind via
/// `gsh.models.TIER = model` (spec.md §3 `SDKModelRef`, §5). A single lock
/// around three slots is sufficient: reads dereference once per tool-loop
/// iteration, so contention is negligible (spec.md §5 "atomic pointer swap
/// is sufficient").
#[derive(Default)]
pub struct SdkModelsRegistry {
    slots: RwLock<HashMap<Tier, Arc<ModelValue>>>,
}

impl SdkModelsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tier: Tier) -> Option<Arc<ModelValue>> {
        self.slots
            .read()
            .expect("sdk models registry lock poisoned")
            .get(&tier)
            .cloned()
    }

    pub fn set(&self, tier: Tier, model: Arc<ModelValue>) {
        log::info!("rebinding sdk model tier {}", tier.as_str());
        self.slots
            .write()
            .expect("sdk models registry lock poisoned")
            .insert(tier, model);
    }
}

/// Tunables carried alongside the runtime (spec.md's concrete defaults:
/// 20-iteration tool-loop cap, ~50 KiB tool output cap, 60s exec timeout,
/// 100 KiB view_file truncation budget). No file-backed config loader — that
/// surface is out of scope (spec.md §1).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_tool_loop_iterations: u32,
    pub tool_output_cap_bytes: usize,
    pub exec_default_timeout_secs: u64,
    pub view_file_truncation_budget_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tool_loop_iterations: 20,
            tool_output_cap_bytes: 50 * 1024,
            exec_default_timeout_secs: 60,
            view_file_truncation_budget_bytes: 100 * 1024,
        }
    }
}

/// Everything a script evaluation or event handler needs, threaded through
/// instead of living behind statics.
pub struct Runtime {
    pub global_env: Arc<Environment>,
    pub events: EventManager,
    pub sdk_models: SdkModelsRegistry,
    pub native_tools: HashMap<String, Arc<NativeTool>>,
    pub call_stack: CallStackStore,
    pub module_loader: ModuleLoader,
    pub config: RuntimeConfig,
    context: RwLock<CancellationContext>,
    /// Guards writes to the shared OS environment and, through it, the
    /// mirrored bash-runner (spec.md §5 "process environment variables...
    /// must be serialized").
    env_write_lock: AsyncMutex<()>,
    shell_runner: Option<Arc<dyn ShellRunner>>,
}

impl Runtime {
    pub fn new(parser: Arc<dyn ScriptParser>, native_tools: Vec<Arc<NativeTool>>) -> Self {
        Self {
            global_env: Environment::root(),
            events: EventManager::new(),
            sdk_models: SdkModelsRegistry::new(),
            native_tools: native_tools
                .into_iter()
                .map(|tool| (tool.name.clone(), tool))
                .collect(),
            call_stack: CallStackStore::new(),
            module_loader: ModuleLoader::new(parser),
            config: RuntimeConfig::default(),
            context: RwLock::new(CancellationContext::new()),
            env_write_lock: AsyncMutex::new(()),
            shell_runner: None,
        }
    }

    pub fn with_shell_runner(mut self, runner: Arc<dyn ShellRunner>) -> Self {
        self.shell_runner = Some(runner);
        self
    }

    pub fn set_context(&self, ctx: Option<CancellationContext>) {
        *self.context.write().expect("cancellation context lock poisoned") =
            ctx.unwrap_or_default();
    }

    pub fn context(&self) -> CancellationContext {
        self.context.read().expect("cancellation context lock poisoned").clone()
    }

    /// `env.NAME = value` (spec.md §4.2 "env.X dual-write"): updates the
    /// process environment and mirrors the write to the shell-runner handle
    /// under the same serialized critical section. `None` unsets.
    pub async fn set_env_var(&self, key: &str, value: Option<&str>) {
        let _guard = self.env_write_lock.lock().await;
        match value {
            Some(v) => {
                // SAFETY: serialized by `env_write_lock`; the only other
                // environment mutator in this crate is native tool
                // subprocess spawning, which reads rather than writes.
                unsafe { std::env::set_var(key, v) };
            }
            None => unsafe { std::env::remove_var(key) },
        }
        if let Some(runner) = &self.shell_runner {
            runner.set_env(key, value);
        }
    }

    pub fn get_env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}
