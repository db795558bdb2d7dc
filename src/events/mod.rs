//! Event middleware chain (spec.md §4.5).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use log::trace;

use crate::error::RuntimeError;
use crate::value::Value;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The continuation a handler calls to delegate to the rest of the chain.
/// The terminal `next` (past the last handler) returns `ctx` unchanged.
pub type Next = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

/// A middleware handler: `(ctx, next) -> ctx'`. Script-defined handlers and
/// native handlers share this shape; `crate::engine` wraps a `ScriptTool`
/// call in one of these closures before registering it.
pub type Handler =
    Arc<dyn Fn(Value, Next) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

/// Ordered handler lists per event name, guarded by a single `RwLock` so
/// `EmitEvent` can snapshot the list for one name without blocking
/// registration of another (spec.md §5 "event-handler list per name").
#[derive(Default)]
pub struct EventManager {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Use(name, handler)`: appends under a write lock.
    pub fn use_handler(&self, name: impl Into<String>, handler: Handler) {
        self.handlers
            .write()
            .expect("event handler list lock poisoned")
            .entry(name.into())
            .or_default()
            .push(handler);
    }

    /// `EmitEvent(name, ctx)`: runs the handler chain for `name` in
    /// registration order and returns the value produced by the head of the
    /// chain (or `ctx` unchanged if no handlers are registered).
    pub async fn emit(&self, name: &str, ctx: Value) -> Result<Value, RuntimeError> {
        let snapshot: Vec<Handler> = self
            .handlers
            .read()
            .expect("event handler list lock poisoned")
            .get(name)
            .cloned()
            .unwrap_or_default();

        trace!("emit {name}: {} handler(s)", snapshot.len());

        let chain = build_chain(snapshot, 0);
        chain(ctx).await
    }
}

fn build_chain(handlers: Vec<Handler>, index: usize) -> Next {
    if index >= handlers.len() {
        return Arc::new(|ctx| Box::pin(async move { Ok(ctx) }));
    }
    let handler = handlers[index].clone();
    let rest = build_chain(handlers, index + 1);
    Arc::new(move |ctx| {
        let handler = handler.clone();
        let next = rest.clone();
        Box::pin(async move { handler(ctx, next).await })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OrderedObject;

    fn obj_get(v: &Value, key: &str) -> Value {
        match v {
            Value::Object(o) => o.read().unwrap().get_property_value(key),
            _ => Value::Null,
        }
    }

    #[tokio::test]
    async fn no_handlers_returns_ctx_unchanged() {
        let manager = EventManager::new();
        let ctx = Value::object(OrderedObject::new());
        let result = manager.emit("agent.start", ctx.clone()).await.unwrap();
        assert!(result.equals(&ctx));
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let manager = EventManager::new();
        manager.use_handler(
            "test",
            Arc::new(|ctx, next| {
                Box::pin(async move {
                    let mut object = OrderedObject::new();
                    object.set("order", Value::String("first".to_string()));
                    next(Value::object(object)).await
                })
            }),
        );
        manager.use_handler(
            "test",
            Arc::new(|ctx, next| {
                Box::pin(async move {
                    let order = obj_get(&ctx, "order").string();
                    let mut object = OrderedObject::new();
                    object.set("order", Value::String(format!("{order},second")));
                    next(Value::object(object)).await
                })
            }),
        );

        let result = manager.emit("test", Value::Null).await.unwrap();
        assert_eq!(obj_get(&result, "order").string(), "first,second");
    }

    #[tokio::test]
    async fn a_handler_can_short_circuit_by_not_calling_next() {
        let manager = EventManager::new();
        manager.use_handler(
            "test",
            Arc::new(|_ctx, _next| {
                Box::pin(async move { Ok(Value::String("short-circuited".to_string())) })
            }),
        );
        manager.use_handler(
            "test",
            Arc::new(|_ctx, _next| Box::pin(async move { Ok(Value::String("unreachable".to_string())) })),
        );

        let result = manager.emit("test", Value::Null).await.unwrap();
        assert_eq!(result.string(), "short-circuited");
    }
}
