//! Per-execution-identity call stack substrate (spec.md §4.7).

use std::collections::HashMap;
use std::sync::RwLock;

/// One nested call: a script tool invocation, an event handler dispatch, or
/// an import-triggered module evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function_name: String,
    pub location: String,
}

impl Frame {
    pub fn new(function_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            location: location.into(),
        }
    }
}

/// Opaque execution identity: a thread id in this parallel-threaded runtime
/// (spec.md §4.7 "the concurrent unit").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// Derives an identity from the current OS thread. Stable for the
    /// lifetime of the thread, distinct across concurrently running threads.
    pub fn current() -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        ExecutionId(hasher.finish())
    }
}

/// Thread-safe store of call stacks, one per [`ExecutionId`]. Only the map
/// itself needs a lock (spec.md §5): each key's slice is single-owner, since
/// only the thread that owns that execution identity ever pushes/pops it.
#[derive(Default)]
pub struct CallStackStore {
    stacks: RwLock<HashMap<ExecutionId, Vec<Frame>>>,
}

impl CallStackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: ExecutionId, frame: Frame) {
        self.stacks
            .write()
            .expect("call stack store lock poisoned")
            .entry(id)
            .or_default()
            .push(frame);
    }

    /// Pops the most recent frame for `id`. Prunes the entry entirely once
    /// its stack is empty, to bound memory (spec.md §4.7).
    pub fn pop(&self, id: ExecutionId) -> Option<Frame> {
        let mut stacks = self.stacks.write().expect("call stack store lock poisoned");
        let Some(stack) = stacks.get_mut(&id) else {
            return None;
        };
        let frame = stack.pop();
        if stack.is_empty() {
            stacks.remove(&id);
        }
        frame
    }

    /// Returns a copy of the current stack for `id`, for error reporting.
    pub fn snapshot(&self, id: ExecutionId) -> Vec<Frame> {
        self.stacks
            .read()
            .expect("call stack store lock poisoned")
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// RAII guard: pushes on construction, pops on drop, so a call site
    /// cannot forget to unwind the frame on an early return or `?`.
    pub fn enter(&self, id: ExecutionId, frame: Frame) -> CallStackGuard<'_> {
        self.push(id, frame);
        CallStackGuard { store: self, id }
    }
}

pub struct CallStackGuard<'a> {
    store: &'a CallStackStore,
    id: ExecutionId,
}

impl Drop for CallStackGuard<'_> {
    fn drop(&mut self) {
        self.store.pop(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_and_prune_empty_stacks() {
        let store = CallStackStore::new();
        let id = ExecutionId::current();

        store.push(id, Frame::new("main", "script.gsh:1"));
        assert_eq!(store.snapshot(id).len(), 1);

        store.pop(id);
        assert!(store.snapshot(id).is_empty());
    }

    #[test]
    fn guard_pops_on_drop() {
        let store = CallStackStore::new();
        let id = ExecutionId::current();
        {
            let _guard = store.enter(id, Frame::new("tool", "script.gsh:5"));
            assert_eq!(store.snapshot(id).len(), 1);
        }
        assert!(store.snapshot(id).is_empty());
    }

    #[test]
    fn distinct_threads_get_isolated_stacks() {
        let store = std::sync::Arc::new(CallStackStore::new());
        let main_id = ExecutionId::current();
        store.push(main_id, Frame::new("main", "script.gsh:1"));

        let worker_store = store.clone();
        let handle = std::thread::spawn(move || {
            let worker_id = ExecutionId::current();
            worker_store.push(worker_id, Frame::new("handler", "script.gsh:9"));
            worker_store.snapshot(worker_id).len()
        });

        let worker_len = handle.join().unwrap();
        assert_eq!(worker_len, 1);
        assert_eq!(store.snapshot(main_id).len(), 1);
    }
}
