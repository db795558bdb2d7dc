//! Adapter for the Anthropic Messages API.
//!
//! Adapted from the teacher's `AnthropicModel` (`src/llm/anthropic.rs`):
//! same client construction and message-shape translation, retargeted at
//! this crate's [`ChatCompletion`] capability and [`ChatMessage`] type.

use anthropic_ai_sdk::client::AnthropicClient;
use anthropic_ai_sdk::types::message::{
    ContentBlock, CreateMessageParams, CreateMessageResponse, Message, MessageClient,
    MessageError, RequiredMessageParams, Role as SdkRole, Tool, ToolChoice as SdkToolChoice,
};
use async_trait::async_trait;

use crate::error::ProviderError;
use crate::value::conversation::{ChatMessage, Role, ToolCallRequest};

use super::{ChatCompletion, ChatRequest, ChatResponse, ToolChoice};

/// Runtime configuration for [`AnthropicProvider`].
#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub api_key: String,
    pub api_version: String,
    pub api_base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl AnthropicProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_version: AnthropicClient::DEFAULT_API_VERSION.to_string(),
            api_base_url: None,
            max_tokens: 4096,
            temperature: None,
            top_p: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: AnthropicClient,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self, ProviderError> {
        let mut builder =
            AnthropicClient::builder(config.api_key.clone(), config.api_version.clone());
        if let Some(url) = &config.api_base_url {
            builder = builder.with_api_base_url(url.clone());
        }

        let client = builder
            .build::<MessageError>()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::Request("ANTHROPIC_API_KEY is not set".to_string()))?;
        Self::new(AnthropicProviderConfig::new(api_key))
    }
}

#[async_trait]
impl ChatCompletion for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let (history, system) = to_anthropic_messages(&request.messages);

        let required = RequiredMessageParams {
            model: request.model.clone(),
            messages: history,
            max_tokens: self.config.max_tokens,
        };

        let mut params = CreateMessageParams::new(required).with_stream(false);

        if let Some(system_prompt) = system {
            params = params.with_system(system_prompt);
        }
        if let Some(temperature) = request.temperature.or(self.config.temperature) {
            params = params.with_temperature(temperature);
        }
        if let Some(top_p) = self.config.top_p {
            params = params.with_top_p(top_p);
        }

        if !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(|tool| Tool {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    input_schema: tool.parameters.clone(),
                })
                .collect::<Vec<_>>();

            params = params.with_tools(tools);
            params = params.with_tool_choice(match request.tool_choice {
                ToolChoice::Auto => SdkToolChoice::Auto,
                ToolChoice::None => SdkToolChoice::None,
            });
        }

        let response = self
            .client
            .create_message(Some(&params))
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(normalize_response(&response))
    }
}

fn to_anthropic_messages(messages: &[ChatMessage]) -> (Vec<Message>, Option<String>) {
    let mut system_lines = Vec::new();
    let mut anthropic_messages = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system_lines.push(message.content.clone()),
            Role::User => {
                anthropic_messages.push(Message::new_text(SdkRole::User, message.content.clone()));
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: message.content.clone(),
                    });
                }
                for call in &message.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                if !blocks.is_empty() {
                    anthropic_messages.push(Message::new_blocks(SdkRole::Assistant, blocks));
                }
            }
            Role::Tool => {
                anthropic_messages.push(Message::new_blocks(
                    SdkRole::User,
                    vec![ContentBlock::ToolResult {
                        tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                        content: message.content.clone(),
                    }],
                ));
            }
        }
    }

    let system = if system_lines.is_empty() {
        None
    } else {
        Some(system_lines.join("\n\n"))
    };

    (anthropic_messages, system)
}

fn normalize_response(response: &CreateMessageResponse) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCallRequest {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            }),
            _ => {}
        }
    }

    ChatResponse {
        content: text_parts.join("\n"),
        finish_reason: response
            .stop_reason
            .as_ref()
            .map(|reason| format!("{reason:?}"))
            .unwrap_or_default(),
        tool_calls,
    }
}
