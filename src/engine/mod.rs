//! Agent execution engine (spec.md §4.4 "ExecuteAgent").
//!
//! Grounded on the teacher's `Agent::query_stream` loop shape
//! (`src/agent/mod.rs`): an iteration cap, append-assistant-message-then-
//! check-tool-calls-then-loop-or-return. Adapted for script-level
//! conversations/agents instead of `ModelMessage`/`ToolSpec`, with
//! `agent.start`/`agent.end` event emission and per-iteration model
//! re-resolution wrapped around it.

use std::sync::Arc;

use log::{debug, trace};

use crate::error::{AgentError, RuntimeError};
use crate::eval::{call_script_tool_in_env, json_args_to_positional, value_to_json};
use crate::llm::{ChatRequest, ToolChoice, ToolDefinition};
use crate::runtime::Runtime;
use crate::value::{AgentValue, ChatMessage, Conversation, ModelValue, OrderedObject, Value};

/// Runs the tool-calling loop for `agent` starting from `conversation`
/// (spec.md §4.4 steps 1-7) and returns the resulting conversation wrapped
/// as a [`Value`], ready for a further pipe stage.
pub async fn execute_agent(
    rt: &Arc<Runtime>,
    conversation: Conversation,
    agent: Arc<AgentValue>,
) -> Result<Value, RuntimeError> {
    let start_ctx = build_event_ctx(&agent, &conversation);
    let start_ctx = rt.events.emit("agent.start", start_ctx).await?;
    let mut conversation = ctx_conversation(&start_ctx).unwrap_or(conversation);

    if let Some(prompt) = agent.system_prompt() {
        if !conversation.has_system_message() {
            conversation.messages.insert(0, ChatMessage::system(prompt));
        }
    }

    let tools = agent_tools(&agent);
    let tool_definitions = tool_definitions(&tools);
    let tool_choice = if tool_definitions.is_empty() { ToolChoice::None } else { ToolChoice::Auto };

    for iteration in 0..rt.config.max_tool_loop_iterations {
        if rt.context().is_cancelled() {
            return Err(crate::error::Cancelled.into());
        }

        let model = resolve_model(rt, &agent)?;
        trace!("agent loop iteration {iteration} model={}", model.name);

        let request = ChatRequest {
            model: model.model_id.clone(),
            messages: conversation.messages.clone(),
            tools: tool_definitions.clone(),
            tool_choice,
            temperature: None,
        };
        let response = model.provider.chat_completion(request).await?;

        conversation.push(ChatMessage::assistant(response.content.clone(), response.tool_calls.clone()));

        if response.tool_calls.is_empty() {
            break;
        }

        for call in &response.tool_calls {
            debug!("dispatching tool call {}", call.name);
            let content = match dispatch_tool_call(rt, &tools, &call.name, &call.arguments).await {
                Ok(value) => match value {
                    Value::String(s) => s,
                    other => serde_json::to_string(&value_to_json(&other)).unwrap_or_else(|_| other.string()),
                },
                Err(RuntimeError::Cancelled(_)) => return Err(crate::error::Cancelled.into()),
                Err(err) => {
                    debug!("tool invocation failed: {err}");
                    serde_json::json!({ "error": err.to_string() }).to_string()
                }
            };
            conversation.push(ChatMessage::tool_result(call.id.clone(), content));
        }
    }

    if conversation
        .messages
        .last()
        .map(|m| m.role == crate::value::Role::Tool)
        .unwrap_or(false)
    {
        conversation.push(ChatMessage::assistant(
            format!(
                "Tool loop exceeded {} iterations; stopping.",
                rt.config.max_tool_loop_iterations
            ),
            vec![],
        ));
    }

    let end_ctx = build_event_ctx(&agent, &conversation);
    let end_ctx = rt.events.emit("agent.end", end_ctx).await?;
    let conversation = ctx_conversation(&end_ctx).unwrap_or(conversation);

    Ok(Value::conversation(conversation))
}

fn build_event_ctx(agent: &Arc<AgentValue>, conversation: &Conversation) -> Value {
    let mut ctx = OrderedObject::new();
    ctx.set("agent", Value::Agent(agent.clone()));
    ctx.set("conversation", Value::conversation(conversation.clone()));
    Value::object(ctx)
}

fn ctx_conversation(ctx: &Value) -> Option<Conversation> {
    let Value::Object(object) = ctx else {
        return None;
    };
    match object.read().expect("object lock poisoned").get_property_value("conversation") {
        Value::Conversation(c) => Some(c.read().expect("conversation lock poisoned").clone()),
        _ => None,
    }
}

/// `model`/`SDKModelRef` resolution (spec.md §4.4 step 2): re-read every
/// iteration so a tier rebind mid-loop takes effect on the next call.
fn resolve_model(rt: &Arc<Runtime>, agent: &Arc<AgentValue>) -> Result<Arc<ModelValue>, RuntimeError> {
    match agent.model() {
        Value::Model(model) => Ok(model),
        Value::SdkModelRef(reference) => rt.sdk_models.get(reference.tier).ok_or_else(|| {
            AgentError::Config(format!("no model bound to tier '{}'", reference.tier.as_str())).into()
        }),
        other => Err(AgentError::Config(format!("agent model must be a Model or SDKModelRef, got {}", other.type_name())).into()),
    }
}

enum AgentTool {
    Script(Arc<crate::value::tool::ScriptTool>),
    Native(Arc<crate::value::tool::NativeTool>),
}

fn agent_tools(agent: &Arc<AgentValue>) -> Vec<AgentTool> {
    let Value::Array(items) = agent.get_config("tools") else {
        return Vec::new();
    };
    items
        .read()
        .expect("array lock poisoned")
        .iter()
        .filter_map(|value| match value {
            Value::Tool(tool) => Some(AgentTool::Script(tool.clone())),
            Value::NativeTool(tool) => Some(AgentTool::Native(tool.clone())),
            _ => None,
        })
        .collect()
}

fn tool_definitions(tools: &[AgentTool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| match tool {
            AgentTool::Script(tool) => ToolDefinition {
                name: tool.name.clone(),
                description: String::new(),
                parameters: script_tool_schema(&tool.params),
            },
            AgentTool::Native(tool) => ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

fn script_tool_schema(params: &[String]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|p| (p.clone(), serde_json::json!({ "type": "string" })))
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": params,
    })
}

async fn dispatch_tool_call(
    rt: &Arc<Runtime>,
    tools: &[AgentTool],
    name: &str,
    arguments: &serde_json::Value,
) -> Result<Value, RuntimeError> {
    let tool = tools.iter().find(|tool| match tool {
        AgentTool::Script(tool) => tool.name == name,
        AgentTool::Native(tool) => tool.name == name,
    });

    match tool {
        Some(AgentTool::Script(tool)) => {
            let args = json_args_to_positional(&tool.params, arguments);
            let env = tool.closure.clone();
            call_script_tool_in_env(rt, &env, tool.clone(), args).await
        }
        Some(AgentTool::Native(tool)) => (tool.invoke)(arguments.clone()).await,
        None => Err(crate::error::ToolError::NotFound(name.to_string()).into()),
    }
}
