//! Tree-walking evaluator (spec.md §4.2).

mod operators;
pub mod pipe;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use log::{debug, trace};
use serde_json::Value as JsonValue;

use crate::ast::{Block, Expr, Program, Stmt};
use crate::callstack::Frame;
use crate::env::Environment;
use crate::error::{EvalError, ModuleError, RuntimeError};
use crate::module::Origin;
use crate::runtime::Runtime;
use crate::value::tool::{MethodBound, NativeTool, ScriptTool};
use crate::value::{AgentValue, ModelValue, OrderedObject, SdkModelRef, Tier, Value, ValueMap, ValueSet};

/// State threaded through recursive evaluation that changes per module
/// import rather than living on `Runtime` (spec.md §4.3 steps 5/8: "switch
/// the runtime's current origin... restore on the way out"). Restoration is
/// automatic here: a nested import evaluates with a new `EvalContext` value,
/// and the caller's own `ctx` binding is untouched by the nested call.
#[derive(Clone, Default)]
pub struct EvalContext {
    pub origin: Option<Origin>,
    /// Names marked by `export` in the module currently being evaluated, if
    /// any (spec.md §4.3 step 6).
    pub exported: Option<Arc<Mutex<Vec<String>>>>,
}

/// Result of executing a statement: either a plain value, or one of the
/// non-local control-flow signals a block must propagate to its caller.
pub enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

pub async fn eval_program(
    rt: &Arc<Runtime>,
    ctx: &EvalContext,
    program: &Program,
    env: &Arc<Environment>,
) -> Result<Value, RuntimeError> {
    let mut result = Value::Null;
    for stmt in &program.statements {
        match eval_stmt(rt, ctx, env, stmt).await? {
            Flow::Normal(value) => result = value,
            Flow::Return(value) => return Ok(value),
            Flow::Break => return Err(EvalError::BreakOutsideLoop.into()),
            Flow::Continue => return Err(EvalError::ContinueOutsideLoop.into()),
        }
    }
    Ok(result)
}

fn eval_block<'a>(
    rt: &'a Arc<Runtime>,
    ctx: &'a EvalContext,
    env: &'a Arc<Environment>,
    block: &'a Block,
) -> BoxFuture<'a, Result<Flow, RuntimeError>> {
    Box::pin(async move {
        let mut result = Value::Null;
        for stmt in &block.statements {
            match eval_stmt(rt, ctx, env, stmt).await? {
                Flow::Normal(value) => result = value,
                signal @ (Flow::Return(_) | Flow::Break | Flow::Continue) => return Ok(signal),
            }
        }
        Ok(Flow::Normal(result))
    })
}

fn eval_stmt<'a>(
    rt: &'a Arc<Runtime>,
    ctx: &'a EvalContext,
    env: &'a Arc<Environment>,
    stmt: &'a Stmt,
) -> BoxFuture<'a, Result<Flow, RuntimeError>> {
    Box::pin(async move {
        match stmt {
            Stmt::Expr(expr) => Ok(Flow::Normal(eval_expr(rt, ctx, env, expr).await?)),
            Stmt::Assign { target, value } => {
                let value = eval_expr(rt, ctx, env, value).await?;
                assign(rt, ctx, env, target, value.clone()).await?;
                Ok(Flow::Normal(value))
            }
            Stmt::Block(block) => eval_block(rt, ctx, env, block).await,
            Stmt::If { condition, then_branch, else_branch } => {
                if eval_expr(rt, ctx, env, condition).await?.is_truthy() {
                    let scope = Environment::child(env);
                    eval_block(rt, ctx, &scope, then_branch).await
                } else if let Some(else_branch) = else_branch {
                    let scope = Environment::child(env);
                    eval_block(rt, ctx, &scope, else_branch).await
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            Stmt::While { condition, body } => {
                while eval_expr(rt, ctx, env, condition).await?.is_truthy() {
                    let scope = Environment::child(env);
                    match eval_block(rt, ctx, &scope, body).await? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal(_) => {}
                        signal @ Flow::Return(_) => return Ok(signal),
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::For { init, condition, step, body } => {
                let scope = Environment::child(env);
                if let Some(init) = init {
                    eval_stmt(rt, ctx, &scope, init).await?;
                }
                loop {
                    if let Some(condition) = condition {
                        if !eval_expr(rt, ctx, &scope, condition).await?.is_truthy() {
                            break;
                        }
                    }
                    let body_scope = Environment::child(&scope);
                    match eval_block(rt, ctx, &body_scope, body).await? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal(_) => {}
                        signal @ Flow::Return(_) => return Ok(signal),
                    }
                    if let Some(step) = step {
                        eval_stmt(rt, ctx, &scope, step).await?;
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => eval_expr(rt, ctx, env, expr).await?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::ToolDecl { name, params, body } => {
                let tool = Value::Tool(Arc::new(ScriptTool {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    closure: env.clone(),
                }));
                env.define(name.clone(), tool)?;
                mark_exported(ctx, name);
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::ModelDecl { name, fields } => {
                let config = eval_fields(rt, ctx, env, fields).await?;
                let model = declare_model(name, config)?;
                env.define(name.clone(), Value::Model(Arc::new(model)))?;
                mark_exported(ctx, name);
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::AgentDecl { name, fields } => {
                let config = eval_fields(rt, ctx, env, fields).await?;
                validate_agent_config(&config)?;
                let agent = AgentValue::new(name.clone(), config);
                env.define(name.clone(), Value::Agent(Arc::new(agent)))?;
                mark_exported(ctx, name);
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::Import { symbols, path } => {
                eval_import(rt, ctx, env, symbols, path).await?;
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::Export(inner) => {
                let exported_name = declared_name(inner);
                let flow = eval_stmt(rt, ctx, env, inner).await?;
                if let Some(name) = exported_name {
                    mark_exported(ctx, &name);
                }
                Ok(flow)
            }
        }
    })
}

fn declared_name(stmt: &Stmt) -> Option<String> {
    match stmt {
        Stmt::ToolDecl { name, .. } | Stmt::ModelDecl { name, .. } | Stmt::AgentDecl { name, .. } => {
            Some(name.clone())
        }
        Stmt::Assign { target: Expr::Identifier(name), .. } => Some(name.clone()),
        _ => None,
    }
}

fn mark_exported(ctx: &EvalContext, name: &str) {
    if let Some(exported) = &ctx.exported {
        exported.lock().expect("exported-names lock poisoned").push(name.to_string());
    }
}

async fn eval_fields(
    rt: &Arc<Runtime>,
    ctx: &EvalContext,
    env: &Arc<Environment>,
    fields: &[(String, Expr)],
) -> Result<HashMap<String, Value>, RuntimeError> {
    let mut config = HashMap::new();
    for (key, expr) in fields {
        config.insert(key.clone(), eval_expr(rt, ctx, env, expr).await?);
    }
    Ok(config)
}

fn type_mismatch(field: &str, expected: &str, actual: &Value) -> RuntimeError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        actual: format!("{field} = {}", actual.type_name()),
    }
    .into()
}

/// `model NAME { ... }` declaration-time validation and construction
/// (spec.md §4.4 step 3 consumer, §7 "declaration time" validation rules).
fn declare_model(name: &str, config: HashMap<String, Value>) -> Result<ModelValue, RuntimeError> {
    let provider_name = match config.get("provider") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(type_mismatch("provider", "string", other)),
        None => {
            return Err(EvalError::TypeMismatch {
                expected: "provider field".to_string(),
                actual: "missing".to_string(),
            }
            .into());
        }
    };
    let model_id = match config.get("model") {
        Some(Value::String(s)) => s.clone(),
        _ => name.to_string(),
    };
    let provider = instantiate_provider(&provider_name, &config)?;
    Ok(ModelValue::new(name, provider, model_id, config))
}

fn instantiate_provider(
    provider_name: &str,
    config: &HashMap<String, Value>,
) -> Result<Arc<dyn crate::llm::ChatCompletion>, RuntimeError> {
    let api_key = match config.get("apiKey") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    match provider_name {
        "anthropic" => {
            let cfg = match api_key {
                Some(key) => crate::llm::AnthropicProviderConfig::new(key),
                None => {
                    return crate::llm::AnthropicProvider::from_env()
                        .map(|p| Arc::new(p) as Arc<dyn crate::llm::ChatCompletion>)
                        .map_err(Into::into);
                }
            };
            crate::llm::AnthropicProvider::new(cfg)
                .map(|p| Arc::new(p) as Arc<dyn crate::llm::ChatCompletion>)
                .map_err(Into::into)
        }
        "openai" | "openai-compat" => {
            let cfg = match api_key {
                Some(key) => crate::llm::OpenAiCompatProviderConfig::new(key),
                None => {
                    return crate::llm::OpenAiCompatProvider::from_env()
                        .map(|p| Arc::new(p) as Arc<dyn crate::llm::ChatCompletion>)
                        .map_err(Into::into);
                }
            };
            crate::llm::OpenAiCompatProvider::new(cfg)
                .map(|p| Arc::new(p) as Arc<dyn crate::llm::ChatCompletion>)
                .map_err(Into::into)
        }
        other => Err(EvalError::TypeMismatch {
            expected: "provider in {anthropic, openai}".to_string(),
            actual: other.to_string(),
        }
        .into()),
    }
}

/// `agent NAME { ... }` declaration-time validation (spec.md §7).
fn validate_agent_config(config: &HashMap<String, Value>) -> Result<(), RuntimeError> {
    match config.get("model") {
        Some(Value::Model(_)) | Some(Value::SdkModelRef(_)) => {}
        Some(other) => return Err(type_mismatch("model", "Model or SDKModelRef", other)),
        None => {
            return Err(EvalError::TypeMismatch {
                expected: "model field".to_string(),
                actual: "missing".to_string(),
            }
            .into());
        }
    }
    if let Some(value) = config.get("systemPrompt") {
        if !matches!(value, Value::String(_)) {
            return Err(type_mismatch("systemPrompt", "string", value));
        }
    }
    if let Some(value) = config.get("tools") {
        if !matches!(value, Value::Array(_)) {
            return Err(type_mismatch("tools", "array", value));
        }
    }
    if let Some(value) = config.get("metadata") {
        if !matches!(value, Value::Object(_)) {
            return Err(type_mismatch("metadata", "object", value));
        }
    }
    Ok(())
}

async fn eval_import(
    rt: &Arc<Runtime>,
    ctx: &EvalContext,
    env: &Arc<Environment>,
    symbols: &[String],
    path: &str,
) -> Result<(), RuntimeError> {
    debug!("import {path}");
    let global_env = rt.global_env.clone();
    let rt_for_body = rt.clone();
    let bindings = rt.module_loader.import(
        ctx.origin.as_ref(),
        path,
        symbols,
        &mut |program, module_origin| {
            let module_env = Environment::child(&global_env);
            let exported = Arc::new(Mutex::new(Vec::new()));
            let module_ctx = EvalContext {
                origin: Some(module_origin),
                exported: Some(exported.clone()),
            };
            // Module evaluation is itself async (tool declarations are not,
            // but model/agent declarations evaluate expressions that may be
            // async); block on it here since the module loader's callback
            // contract is synchronous (spec.md §4.3 keeps resolution/caching
            // separate from the evaluator that does async work).
            let result = futures_executor::block_on(eval_program(
                &rt_for_body,
                &module_ctx,
                program,
                &module_env,
            ));
            result.map_err(|err| ModuleError::Eval(EvalError::Other(err.to_string())))?;
            let mut exports = HashMap::new();
            for name in exported.lock().expect("exported-names lock poisoned").iter() {
                if let Some(value) = module_env.get(name) {
                    exports.insert(name.clone(), value);
                }
            }
            Ok(exports)
        },
    )?;

    for (name, value) in bindings {
        env.set(name, value);
    }
    Ok(())
}

async fn assign(
    rt: &Arc<Runtime>,
    ctx: &EvalContext,
    env: &Arc<Environment>,
    target: &Expr,
    value: Value,
) -> Result<(), RuntimeError> {
    match target {
        Expr::Identifier(name) => {
            assign_identifier(env, name, value);
            Ok(())
        }
        Expr::Member { object, property } => {
            if let Expr::Identifier(root) = object.as_ref() {
                if root == "env" {
                    let string_value = match &value {
                        Value::Null => None,
                        other => Some(other.string()),
                    };
                    rt.set_env_var(property, string_value.as_deref()).await;
                    env.set(format!("env.{property}"), value);
                    return Ok(());
                }
            }
            if let Some(tier) = as_gsh_models_tier(target) {
                return bind_sdk_model_tier(rt, tier, value);
            }
            let container = resolve_or_create_container(rt, ctx, env, object).await?;
            match container {
                Value::Object(object) => {
                    object.write().expect("object lock poisoned").set(property.clone(), value);
                    Ok(())
                }
                other => Err(EvalError::TypeMismatch {
                    expected: "object".to_string(),
                    actual: other.type_name().to_string(),
                }
                .into()),
            }
        }
        Expr::Index { object, index } => {
            let container = eval_expr(rt, ctx, env, object).await?;
            let index = eval_expr(rt, ctx, env, index).await?;
            match (&container, &index) {
                (Value::Array(items), Value::Number(i)) => {
                    let i = *i as usize;
                    let mut items = items.write().expect("array lock poisoned");
                    if i < items.len() {
                        items[i] = value;
                        Ok(())
                    } else {
                        Err(EvalError::Other(format!("index {i} out of bounds")).into())
                    }
                }
                (Value::Object(object), Value::String(key)) => {
                    object.write().expect("object lock poisoned").set(key.clone(), value);
                    Ok(())
                }
                (Value::Map(map), Value::String(key)) => {
                    map.write().expect("map lock poisoned").set(key.clone(), value);
                    Ok(())
                }
                _ => Err(EvalError::TypeMismatch {
                    expected: "array[number] or object/map[string]".to_string(),
                    actual: format!("{}[{}]", container.type_name(), index.type_name()),
                }
                .into()),
            }
        }
        _ => Err(EvalError::Other("invalid assignment target".to_string()).into()),
    }
}

/// Plain `x = v`: updates the defining scope if `x` is already bound
/// anywhere on the chain, otherwise declares it in the current scope. This
/// is how `x = 2 + 3 * 4` both creates and (on re-assignment) updates `x`
/// without the script author declaring it first.
fn assign_identifier(env: &Arc<Environment>, name: &str, value: Value) {
    if env.update(name, value.clone()).is_err() {
        env.set(name, value);
    }
}

/// Walks a member-access chain, materializing missing intermediate Object
/// descriptors as it goes (spec.md §4.2 "Assignment").
fn resolve_or_create_container<'a>(
    rt: &'a Arc<Runtime>,
    ctx: &'a EvalContext,
    env: &'a Arc<Environment>,
    expr: &'a Expr,
) -> BoxFuture<'a, Result<Value, RuntimeError>> {
    Box::pin(async move {
        match expr {
            Expr::Identifier(name) => {
                let current = env.get(name);
                match current {
                    Some(value @ Value::Object(_)) => Ok(value),
                    None | Some(Value::Null) => {
                        let created = Value::object(OrderedObject::new());
                        assign_identifier(env, name, created.clone());
                        Ok(created)
                    }
                    Some(other) => Ok(other),
                }
            }
            Expr::Member { object, property } => {
                let parent = resolve_or_create_container(rt, ctx, env, object).await?;
                match parent {
                    Value::Object(parent_obj) => {
                        let existing = parent_obj.read().expect("object lock poisoned").get_property_value(property);
                        match existing {
                            Value::Object(_) => Ok(existing),
                            Value::Null => {
                                let created = Value::object(OrderedObject::new());
                                parent_obj
                                    .write()
                                    .expect("object lock poisoned")
                                    .set(property.clone(), created.clone());
                                Ok(created)
                            }
                            other => Ok(other),
                        }
                    }
                    other => Ok(other),
                }
            }
            other => eval_expr(rt, ctx, env, other).await,
        }
    })
}

fn bind_sdk_model_tier(rt: &Arc<Runtime>, tier: Tier, value: Value) -> Result<(), RuntimeError> {
    match value {
        Value::Model(model) => {
            rt.sdk_models.set(tier, model);
            Ok(())
        }
        other => Err(EvalError::TypeMismatch {
            expected: "Model".to_string(),
            actual: other.type_name().to_string(),
        }
        .into()),
    }
}

/// Matches `gsh.models.TIER` as a two-level member-access chain.
fn as_gsh_models_tier(expr: &Expr) -> Option<Tier> {
    let Expr::Member { object, property } = expr else {
        return None;
    };
    let Expr::Member { object: inner_object, property: inner_property } = object.as_ref() else {
        return None;
    };
    let Expr::Identifier(root) = inner_object.as_ref() else {
        return None;
    };
    if root != "gsh" || inner_property != "models" {
        return None;
    }
    Tier::parse(property)
}

fn as_gsh_tools_name(expr: &Expr) -> Option<&str> {
    let Expr::Member { object, property } = expr else {
        return None;
    };
    let Expr::Member { object: inner_object, property: inner_property } = object.as_ref() else {
        return None;
    };
    let Expr::Identifier(root) = inner_object.as_ref() else {
        return None;
    };
    if root != "gsh" || inner_property != "tools" {
        return None;
    }
    Some(property)
}

fn eval_expr<'a>(
    rt: &'a Arc<Runtime>,
    ctx: &'a EvalContext,
    env: &'a Arc<Environment>,
    expr: &'a Expr,
) -> BoxFuture<'a, Result<Value, RuntimeError>> {
    Box::pin(async move {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Identifier(name) => {
                if name == "gsh" || name == "env" {
                    return Err(EvalError::Other(format!(
                        "'{name}' must be used as {name}.PROPERTY"
                    ))
                    .into());
                }
                env.get(name)
                    .ok_or_else(|| EvalError::UnknownIdentifier(name.clone()).into())
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(eval_expr(rt, ctx, env, item).await?);
                }
                Ok(Value::array(values))
            }
            Expr::Object(fields) => {
                let mut object = OrderedObject::new();
                for (key, value_expr) in fields {
                    object.set(key.clone(), eval_expr(rt, ctx, env, value_expr).await?);
                }
                Ok(Value::object(object))
            }
            Expr::Map(fields) => {
                let mut map = ValueMap::new();
                for (key, value_expr) in fields {
                    map.set(key.clone(), eval_expr(rt, ctx, env, value_expr).await?);
                }
                Ok(Value::map(map))
            }
            Expr::Set(items) => {
                let mut set = ValueSet::new();
                for item in items {
                    set.add(eval_expr(rt, ctx, env, item).await?);
                }
                Ok(Value::set(set))
            }
            Expr::Member { object, property } => {
                if let Expr::Identifier(root) = object.as_ref() {
                    if root == "env" {
                        return Ok(match rt.get_env_var(property) {
                            Some(v) => Value::String(v),
                            None => Value::Null,
                        });
                    }
                }
                if let Some(tier) = as_gsh_models_tier(expr) {
                    return Ok(Value::SdkModelRef(SdkModelRef { tier }));
                }
                if let Some(tool_name) = as_gsh_tools_name(expr) {
                    return rt
                        .native_tools
                        .get(tool_name)
                        .map(|tool| Value::NativeTool(tool.clone()))
                        .ok_or_else(|| EvalError::UnknownIdentifier(format!("gsh.tools.{tool_name}")).into());
                }
                let receiver = eval_expr(rt, ctx, env, object).await?;
                Ok(member_access(&receiver, property))
            }
            Expr::Index { object, index } => {
                let receiver = eval_expr(rt, ctx, env, object).await?;
                let index = eval_expr(rt, ctx, env, index).await?;
                Ok(index_access(&receiver, &index))
            }
            Expr::Call { callee, args } => {
                if is_gsh_use_call(callee) {
                    return eval_gsh_use(rt, ctx, env, args).await;
                }
                if let Some(method) = as_object_static_method(callee) {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(eval_expr(rt, ctx, env, arg).await?);
                    }
                    return eval_object_static_call(method, values);
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval_expr(rt, ctx, env, arg).await?);
                }
                let callee_value = eval_expr(rt, ctx, env, callee).await?;
                call_value(rt, callee_value, values).await
            }
            Expr::Binary { op, left, right } => {
                let left = eval_expr(rt, ctx, env, left).await?;
                let right = eval_expr(rt, ctx, env, right).await?;
                operators::eval_binary(*op, left, right)
            }
            Expr::Logical { op, left, right } => {
                let left_value = eval_expr(rt, ctx, env, left).await?;
                if let Some(short_circuited) = operators::eval_logical_short_circuit(*op, &left_value) {
                    return Ok(short_circuited);
                }
                eval_expr(rt, ctx, env, right).await
            }
            Expr::Unary { op, operand } => {
                let operand = eval_expr(rt, ctx, env, operand).await?;
                operators::eval_unary(*op, operand)
            }
            Expr::Pipe { left, right } => {
                let left = eval_expr(rt, ctx, env, left).await?;
                let right = eval_expr(rt, ctx, env, right).await?;
                pipe::eval_pipe(rt, left, right).await
            }
            Expr::ToolLiteral { params, body } => Ok(Value::Tool(Arc::new(ScriptTool {
                name: "<anonymous>".to_string(),
                params: params.clone(),
                body: body.clone(),
                closure: env.clone(),
            }))),
        }
    })
}

/// `Object.keys/values/entries(o)` (spec.md §8 scenario 2): a static-method
/// call rather than a bound instance method, since the language has no
/// `Object` value to bind against — only the literal `o = {...}` values it
/// produces.
fn as_object_static_method(callee: &Expr) -> Option<&str> {
    let Expr::Member { object, property } = callee else {
        return None;
    };
    let Expr::Identifier(root) = object.as_ref() else {
        return None;
    };
    if root != "Object" {
        return None;
    }
    matches!(property.as_str(), "keys" | "values" | "entries").then_some(property.as_str())
}

fn eval_object_static_call(method: &str, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(EvalError::Other(format!("Object.{method} takes exactly 1 argument")).into());
    }
    let receiver = args.pop().expect("checked len == 1 above");
    let Value::Object(object) = receiver else {
        return Err(EvalError::TypeMismatch {
            expected: "object".to_string(),
            actual: receiver.type_name().to_string(),
        }
        .into());
    };
    let object = object.read().expect("object lock poisoned");
    Ok(match method {
        "keys" => Value::array(object.keys().into_iter().map(Value::String).collect()),
        "values" => Value::array(object.values()),
        "entries" => Value::array(
            object
                .entries()
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                .collect(),
        ),
        _ => unreachable!(),
    })
}

fn is_gsh_use_call(callee: &Expr) -> bool {
    matches!(
        callee,
        Expr::Member { object, property }
            if matches!(object.as_ref(), Expr::Identifier(root) if root == "gsh") && property == "use"
    )
}

async fn eval_gsh_use(
    rt: &Arc<Runtime>,
    ctx: &EvalContext,
    env: &Arc<Environment>,
    args: &[Expr],
) -> Result<Value, RuntimeError> {
    let [name_expr, handler_expr] = args else {
        return Err(EvalError::Other("gsh.use(name, handler) takes exactly 2 arguments".to_string()).into());
    };
    let Value::String(name) = eval_expr(rt, ctx, env, name_expr).await? else {
        return Err(EvalError::TypeMismatch {
            expected: "string".to_string(),
            actual: "non-string event name".to_string(),
        }
        .into());
    };
    let handler_value = eval_expr(rt, ctx, env, handler_expr).await?;
    let Value::Tool(tool) = handler_value else {
        return Err(EvalError::TypeMismatch {
            expected: "tool".to_string(),
            actual: "non-tool event handler".to_string(),
        }
        .into());
    };

    let rt_for_handler = rt.clone();
    rt.events.use_handler(
        name,
        Arc::new(move |ctx_value, next| {
            let rt_for_handler = rt_for_handler.clone();
            let tool = tool.clone();
            Box::pin(async move {
                let global_env = rt_for_handler.global_env.clone();
                let next_tool = Value::NativeTool(Arc::new(NativeTool {
                    name: "next".to_string(),
                    description: "continue the event middleware chain".to_string(),
                    parameters: serde_json::json!({"type": "object"}),
                    invoke: Arc::new(move |_args| {
                        let next = next.clone();
                        Box::pin(async move {
                            let ctx = next(Value::Null).await?;
                            Ok(ctx)
                        })
                    }),
                }));
                call_script_tool_in_env(&rt_for_handler, &global_env, tool, vec![ctx_value, next_tool]).await
            })
        }),
    );
    Ok(Value::Null)
}

/// Property access (spec.md §4.2): never errors; absent properties or
/// chains through `null` propagate `Value::Null`.
fn member_access(receiver: &Value, property: &str) -> Value {
    match receiver {
        Value::Null => Value::Null,
        Value::Object(object) => object.read().expect("object lock poisoned").get_property_value(property),
        Value::Array(items) => match property {
            "length" => Value::Number(items.read().expect("array lock poisoned").len() as f64),
            "push" | "pop" => bound_method(receiver, property),
            _ => Value::Null,
        },
        Value::Map(_) => match property {
            "get" | "set" | "has" | "delete" | "keys" | "values" | "entries" | "size" => {
                bound_method(receiver, property)
            }
            _ => Value::Null,
        },
        Value::Set(_) => match property {
            "add" | "has" | "delete" | "size" | "values" => bound_method(receiver, property),
            _ => Value::Null,
        },
        Value::Conversation(conversation) => match property {
            "push" => bound_method(receiver, property),
            "messages" => Value::array(
                conversation
                    .read()
                    .expect("conversation lock poisoned")
                    .messages
                    .iter()
                    .map(chat_message_to_value)
                    .collect(),
            ),
            _ => Value::Null,
        },
        Value::Model(model) => match property {
            "name" => Value::String(model.name.clone()),
            other => model.get_config(other),
        },
        Value::Agent(agent) => match property {
            "name" => Value::String(agent.name.clone()),
            other => agent.get_config(other),
        },
        _ => Value::Null,
    }
}

fn bound_method(receiver: &Value, method: &str) -> Value {
    Value::MethodBound(Box::new(MethodBound {
        receiver: Box::new(receiver.clone()),
        method: method.to_string(),
    }))
}

fn chat_message_to_value(message: &crate::value::ChatMessage) -> Value {
    let mut object = OrderedObject::new();
    object.set("role", Value::String(format!("{:?}", message.role).to_lowercase()));
    object.set("content", Value::String(message.content.clone()));
    Value::object(object)
}

fn index_access(receiver: &Value, index: &Value) -> Value {
    match (receiver, index) {
        (Value::Array(items), Value::Number(i)) => {
            let items = items.read().expect("array lock poisoned");
            let i = *i as usize;
            items.get(i).cloned().unwrap_or(Value::Null)
        }
        (Value::Object(object), Value::String(key)) => {
            object.read().expect("object lock poisoned").get_property_value(key)
        }
        (Value::Map(map), Value::String(key)) => map.read().expect("map lock poisoned").get(key),
        _ => Value::Null,
    }
}

pub async fn call_value(rt: &Arc<Runtime>, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match callee {
        Value::Tool(tool) => {
            let env = tool.closure.clone();
            call_script_tool_in_env(rt, &env, tool, args).await
        }
        Value::NativeTool(tool) => {
            trace!("invoking native tool {}", tool.name);
            let args_json = values_to_json_args(&tool, &args);
            (tool.invoke)(args_json).await
        }
        Value::MethodBound(bound) => call_method_bound(*bound, args).await,
        other => Err(EvalError::TypeMismatch {
            expected: "callable".to_string(),
            actual: other.type_name().to_string(),
        }
        .into()),
    }
}

fn values_to_json_args(tool: &NativeTool, args: &[Value]) -> JsonValue {
    if let [Value::Object(object)] = args {
        let entries = object.read().expect("object lock poisoned").entries();
        return JsonValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, value_to_json(&v)))
                .collect(),
        );
    }
    let _ = &tool.parameters;
    JsonValue::Array(args.iter().map(value_to_json).collect())
}

pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => serde_json::json!(n),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Array(items) => JsonValue::Array(
            items.read().expect("array lock poisoned").iter().map(value_to_json).collect(),
        ),
        Value::Object(object) => JsonValue::Object(
            object
                .read()
                .expect("object lock poisoned")
                .entries()
                .into_iter()
                .map(|(k, v)| (k, value_to_json(&v)))
                .collect(),
        ),
        other => JsonValue::String(other.string()),
    }
}

async fn call_method_bound(bound: MethodBound, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match (*bound.receiver, bound.method.as_str()) {
        (Value::Array(items), "push") => {
            let mut items = items.write().expect("array lock poisoned");
            for arg in args {
                items.push(arg);
            }
            Ok(Value::Number(items.len() as f64))
        }
        (Value::Array(items), "pop") => Ok(items.write().expect("array lock poisoned").pop().unwrap_or(Value::Null)),
        (Value::Map(map), "get") => Ok(args.first().map(|k| map.read().unwrap().get(&k.string())).unwrap_or(Value::Null)),
        (Value::Map(map), "set") => {
            if let [key, value] = &args[..] {
                map.write().unwrap().set(key.string(), value.clone());
            }
            Ok(Value::Null)
        }
        (Value::Map(map), "has") => Ok(Value::Bool(args.first().map(|k| map.read().unwrap().has(&k.string())).unwrap_or(false))),
        (Value::Map(map), "delete") => Ok(Value::Bool(args.first().map(|k| map.write().unwrap().delete(&k.string())).unwrap_or(false))),
        (Value::Map(map), "keys") => Ok(Value::array(map.read().unwrap().keys().into_iter().map(Value::String).collect())),
        (Value::Map(map), "values") => Ok(Value::array(map.read().unwrap().values())),
        (Value::Map(map), "entries") => Ok(Value::array(
            map.read()
                .unwrap()
                .entries()
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                .collect(),
        )),
        (Value::Map(map), "size") => Ok(Value::Number(map.read().unwrap().size() as f64)),
        (Value::Set(set), "add") => {
            if let Some(value) = args.into_iter().next() {
                set.write().unwrap().add(value);
            }
            Ok(Value::Null)
        }
        (Value::Set(set), "has") => Ok(Value::Bool(args.first().map(|v| set.read().unwrap().has(v)).unwrap_or(false))),
        (Value::Set(set), "delete") => Ok(Value::Bool(args.first().map(|v| set.write().unwrap().delete(v)).unwrap_or(false))),
        (Value::Set(set), "size") => Ok(Value::Number(set.read().unwrap().size() as f64)),
        (Value::Set(set), "values") => Ok(Value::array(set.read().unwrap().values())),
        (Value::Conversation(conversation), "push") => {
            if let Some(Value::String(text)) = args.into_iter().next() {
                conversation
                    .write()
                    .expect("conversation lock poisoned")
                    .push(crate::value::ChatMessage::user(text));
            }
            Ok(Value::Null)
        }
        (receiver, method) => Err(EvalError::Other(format!(
            "no method '{method}' on {}",
            receiver.type_name()
        ))
        .into()),
    }
}

/// Invokes a script `Tool` in a fresh child scope of `closure_env`
/// (spec.md §4.1 closures), binding positional args to params by name and
/// pushing/popping a call-stack frame (spec.md §4.7).
pub async fn call_script_tool_in_env(
    rt: &Arc<Runtime>,
    closure_env: &Arc<Environment>,
    tool: Arc<ScriptTool>,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let call_env = Environment::child(closure_env);
    for (i, param) in tool.params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(Value::Null);
        call_env.set(param.clone(), value);
    }

    let id = crate::callstack::ExecutionId::current();
    let _frame = rt.call_stack.enter(id, Frame::new(tool.name.clone(), format!("tool:{}", tool.name)));

    let ctx = EvalContext::default();
    match eval_block(rt, &ctx, &call_env, &tool.body).await? {
        Flow::Normal(value) | Flow::Return(value) => Ok(value),
        Flow::Break => Err(EvalError::BreakOutsideLoop.into()),
        Flow::Continue => Err(EvalError::ContinueOutsideLoop.into()),
    }
}

/// Converts a tool-call's JSON arguments into positional values matching
/// the script tool's declared parameter order, for the agent tool loop
/// (spec.md §4.4 step 6).
pub fn json_args_to_positional(params: &[String], arguments: &JsonValue) -> Vec<Value> {
    params
        .iter()
        .map(|param| arguments.get(param).map(json_to_value).unwrap_or(Value::Null))
        .collect()
}

pub fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        JsonValue::Object(map) => {
            let mut object = OrderedObject::new();
            for (k, v) in map {
                object.set(k.clone(), json_to_value(v));
            }
            Value::object(object)
        }
    }
}
