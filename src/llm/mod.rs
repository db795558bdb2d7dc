//! LLM provider capability (spec.md §6 "External Interfaces").
//!
//! Concrete providers are external collaborators per spec.md §1 — this
//! module defines the `ChatCompletion`/`StreamingChatCompletion` capability
//! the agent execution engine consumes, plus two thin adapters
//! (`anthropic`, `openai_compat`) kept in the teacher's provider-adapter
//! style to exercise the capability end to end.

mod anthropic;
mod openai_compat;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

pub use anthropic::{AnthropicProvider, AnthropicProviderConfig};
pub use openai_compat::{OpenAiCompatProvider, OpenAiCompatProviderConfig};

use crate::error::ProviderError;
use crate::value::conversation::{ChatMessage, ToolCallRequest};

/// A tool definition transformed into the provider's function-calling
/// schema (spec.md §4.4 step 3).
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Forwards token deltas during a streaming completion (spec.md §4.4 step 4).
pub trait StreamCallbacks: Send + Sync {
    fn on_token(&self, delta: &str);
    fn on_tool_call_delta(&self, _tool_name: &str, _delta: &str) {}
}

/// The LLM provider capability consumed by the agent execution engine
/// (spec.md §6): `Name()`, `ChatCompletion(ctx, ChatRequest)`.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    fn name(&self) -> &str;

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Optional streaming variant of [`ChatCompletion`] (spec.md §6
/// `StreamingChatCompletion`). A provider that only implements the
/// non-streaming form is still usable; the agent engine falls back to
/// `chat_completion` when a provider does not also implement this trait.
#[async_trait]
pub trait StreamingChatCompletion: ChatCompletion {
    async fn streaming_chat_completion(
        &self,
        request: ChatRequest,
        callbacks: &(dyn StreamCallbacks),
    ) -> Result<ChatResponse, ProviderError>;
}
