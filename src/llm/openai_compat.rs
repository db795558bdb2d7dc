//! Adapter for OpenAI-compatible chat-completions endpoints.
//!
//! Scripts declaring `model { provider: "openai", ... }` resolve to this
//! adapter. Adapted from the teacher's `GrokModel` (`src/llm/grok.rs`),
//! which talks to the same wire shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::error::ProviderError;
use crate::value::conversation::{ChatMessage, Role, ToolCallRequest};

use super::{ChatCompletion, ChatRequest, ChatResponse, ToolChoice};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiCompatProviderConfig {
    pub api_key: String,
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAiCompatProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: None,
            temperature: None,
            max_tokens: Some(4096),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: Client,
    config: OpenAiCompatProviderConfig,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Request("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(OpenAiCompatProviderConfig::new(api_key))
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let payload = build_request(&request, &self.config);

        let response = self
            .client
            .post(self.endpoint())
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Request(body));
        }

        let body = response
            .json::<OpenAiChatCompletionResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(body)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAiRequestMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAiToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct OpenAiToolDefinition {
    #[serde(rename = "type")]
    type_: String,
    function: OpenAiToolFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct OpenAiToolFunctionDefinition {
    name: String,
    description: String,
    parameters: JsonValue,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    function: OpenAiToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatCompletionResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiAssistantMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiAssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

fn build_request(request: &ChatRequest, config: &OpenAiCompatProviderConfig) -> OpenAiRequest {
    let messages = to_openai_messages(&request.messages);

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| OpenAiToolDefinition {
                    type_: "function".to_string(),
                    function: OpenAiToolFunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    };

    let tool_choice = if request.tools.is_empty() {
        None
    } else {
        Some(
            match request.tool_choice {
                ToolChoice::Auto => "auto",
                ToolChoice::None => "none",
            }
            .to_string(),
        )
    };

    OpenAiRequest {
        model: request.model.clone(),
        messages,
        tools,
        tool_choice,
        temperature: request.temperature.or(config.temperature),
        max_tokens: config.max_tokens,
    }
}

fn to_openai_messages(messages: &[ChatMessage]) -> Vec<OpenAiRequestMessage> {
    messages
        .iter()
        .map(|message| match message.role {
            Role::System => OpenAiRequestMessage::System {
                content: message.content.clone(),
            },
            Role::User => OpenAiRequestMessage::User {
                content: message.content.clone(),
            },
            Role::Assistant => OpenAiRequestMessage::Assistant {
                content: if message.content.is_empty() {
                    None
                } else {
                    Some(message.content.clone())
                },
                tool_calls: if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| OpenAiToolCall {
                                id: call.id.clone(),
                                type_: "function".to_string(),
                                function: OpenAiToolCallFunction {
                                    name: call.name.clone(),
                                    arguments: call.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
            },
            Role::Tool => OpenAiRequestMessage::Tool {
                tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.content.clone(),
            },
        })
        .collect()
}

fn normalize_response(
    response: OpenAiChatCompletionResponse,
) -> Result<ChatResponse, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("no choices in response".to_string()))?;

    let message = choice
        .message
        .ok_or_else(|| ProviderError::Response("choice missing message".to_string()))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments: JsonValue =
                serde_json::from_str(&call.function.arguments).unwrap_or(json!({}));
            ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ChatResponse {
        content: message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason.unwrap_or_default(),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    #[test]
    fn builds_tool_choice_auto_only_when_tools_present() {
        let config = OpenAiCompatProviderConfig::new("key");
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::user("hi")],
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            temperature: None,
        };
        let payload = build_request(&request, &config);
        assert!(payload.tool_choice.is_none());

        let request_with_tools = ChatRequest {
            tools: vec![ToolDefinition {
                name: "add".to_string(),
                description: "add".to_string(),
                parameters: json!({"type": "object"}),
            }],
            ..request
        };
        let payload = build_request(&request_with_tools, &config);
        assert_eq!(payload.tool_choice.as_deref(), Some("auto"));
    }

    #[test]
    fn normalizes_tool_call_arguments_from_json_string() {
        let response = OpenAiChatCompletionResponse {
            choices: vec![OpenAiChoice {
                finish_reason: Some("tool_calls".to_string()),
                message: Some(OpenAiAssistantMessage {
                    content: None,
                    tool_calls: vec![OpenAiToolCall {
                        id: "call_1".to_string(),
                        type_: "function".to_string(),
                        function: OpenAiToolCallFunction {
                            name: "add".to_string(),
                            arguments: "{\"a\":1,\"b\":2}".to_string(),
                        },
                    }],
                }),
            }],
        };

        let normalized = normalize_response(response).expect("normalizes");
        assert_eq!(normalized.tool_calls.len(), 1);
        assert_eq!(normalized.tool_calls[0].arguments["a"], 1);
    }
}
