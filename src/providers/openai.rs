// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible chat completions provider.
//!
//! Works against OpenAI itself, a local Ollama server, or any endpoint that
//! speaks the Chat Completions wire format (Together, Groq, DeepSeek, ...).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "telemetry")]
use std::time::Instant;

#[cfg(feature = "telemetry")]
use tracing::debug;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{
    ContentBlockType, Message, MessageContent, Provider, ProviderConfig, ProviderResponse, Role,
    StopReason, TokenUsage, ToolCall, ToolDefinition,
};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama API base URL.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

const DEFAULT_MAX_TOKENS: u32 = 4096;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Provider for any OpenAI-compatible endpoint.
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    provider_name: String,
}

impl OpenAIProvider {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        config: ProviderConfig,
    ) -> Self {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let provider_name = Self::detect_provider_name(&base_url);

        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            base_url,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            provider_name,
        }
    }

    /// Provider for api.openai.com.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(Some(api_key.into()), model, OPENAI_BASE_URL, ProviderConfig::default())
    }

    /// Provider for a local Ollama server (no API key).
    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new(None, model, OLLAMA_BASE_URL, ProviderConfig::default())
    }

    fn detect_provider_name(base_url: &str) -> String {
        if base_url.contains("openai.com") {
            "OpenAI".to_string()
        } else if base_url.contains("localhost:11434") || base_url.contains("ollama") {
            "Ollama".to_string()
        } else if base_url.contains("together") {
            "Together".to_string()
        } else if base_url.contains("groq") {
            "Groq".to_string()
        } else if base_url.contains("deepseek") {
            "DeepSeek".to_string()
        } else {
            "OpenAI-Compatible".to_string()
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> ChatRequest {
        let mut api_messages: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system_prompt {
            api_messages.push(ChatMessage::text("system", system));
        }
        for msg in messages {
            api_messages.extend(ChatMessage::from_message(msg));
        }

        let tools_json: Option<Vec<ChatTool>> = tools
            .filter(|t| !t.is_empty())
            .map(|t| t.iter().map(ChatTool::from).collect());

        ChatRequest {
            model: self.model.clone(),
            messages: api_messages,
            tools: tools_json,
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            stream: Some(false),
        }
    }

    fn handle_error_response(&self, status_code: u16, body: &str) -> ProviderError {
        if let Ok(error) = serde_json::from_str::<ApiError>(body) {
            let message = error.error.message;
            match error.error.error_type.as_deref() {
                Some("authentication_error") | Some("invalid_api_key") => ProviderError::AuthError(message),
                Some("rate_limit_error") | Some("rate_limit_exceeded") => ProviderError::RateLimited(message),
                Some("model_not_found") => ProviderError::ModelNotFound(message),
                _ => ProviderError::api(message, status_code),
            }
        } else {
            match status_code {
                401 | 403 => ProviderError::AuthError(body.to_string()),
                429 => ProviderError::RateLimited(body.to_string()),
                _ => ProviderError::api(body.to_string(), status_code),
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, tools, system_prompt);
        #[cfg(feature = "telemetry")]
        let start = Instant::now();
        #[cfg(feature = "telemetry")]
        let operation_name = format!("{}.chat", self.provider_name.to_lowercase().replace(' ', "_"));

        #[cfg(feature = "telemetry")]
        debug!(model = %self.model, messages = messages.len(), "Sending chat request");

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.header("authorization", format!("Bearer {}", api_key));
        }

        let response = req.json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(DEFAULT_TIMEOUT_SECS * 1000)
            } else {
                ProviderError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.record_operation(&operation_name, start.elapsed());
            return Err(self.handle_error_response(status.as_u16(), &error_text));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let provider_response: ProviderResponse = api_response.into();

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation(&operation_name, start.elapsed());
            if let Some(ref usage) = provider_response.usage {
                GLOBAL_METRICS.record_tokens(usage.input_tokens as u64, usage.output_tokens as u64);
            }
        }

        Ok(provider_response)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<ChatFunction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatToolFunction,
}

#[derive(Debug, Serialize)]
struct ChatToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// ============================================================================
// Type Conversions
// ============================================================================

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// One of our messages as wire messages. Every tool result becomes its
    /// own `tool` message, so a block message may expand to several.
    fn from_message(msg: &Message) -> Vec<Self> {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };

        let blocks = match &msg.content {
            MessageContent::Text(s) => return vec![Self::text(role, s.clone())],
            MessageContent::Blocks(blocks) => blocks,
        };

        let mut out = Vec::new();
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block.block_type {
                ContentBlockType::Text => {
                    if let Some(ref text) = block.text {
                        texts.push(text.clone());
                    }
                }
                ContentBlockType::ToolUse => tool_calls.push(ChatToolCall {
                    id: block.id.clone(),
                    call_type: Some("function".to_string()),
                    function: Some(ChatFunction {
                        name: block.name.clone(),
                        arguments: block.input.as_ref().map(|v| v.to_string()),
                    }),
                }),
                ContentBlockType::ToolResult => out.push(Self {
                    role: "tool".to_string(),
                    content: Some(block.content.clone().unwrap_or_default()),
                    tool_calls: None,
                    tool_call_id: block.tool_use_id.clone(),
                }),
            }
        }

        if !texts.is_empty() || !tool_calls.is_empty() {
            out.insert(
                0,
                Self {
                    role: role.to_string(),
                    content: if texts.is_empty() { None } else { Some(texts.join("\n")) },
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                },
            );
        }
        out
    }
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ChatToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.to_value(),
            },
        }
    }
}

impl From<ChatResponse> for ProviderResponse {
    fn from(response: ChatResponse) -> Self {
        let (content, tool_calls, stop_reason) = match response.choices.into_iter().next() {
            Some(choice) => {
                let content = choice.message.content.unwrap_or_default();

                let tool_calls = choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|tc| {
                        let id = tc.id?;
                        let func = tc.function?;
                        let name = func.name?;
                        let input: serde_json::Value = func
                            .arguments
                            .and_then(|s| serde_json::from_str(&s).ok())
                            .unwrap_or_else(|| serde_json::json!({}));
                        Some(ToolCall { id, name, input })
                    })
                    .collect();

                let stop_reason = match choice.finish_reason.as_deref() {
                    Some("tool_calls") => StopReason::ToolUse,
                    Some("length") => StopReason::MaxTokens,
                    _ => StopReason::EndTurn,
                };

                (content, tool_calls, stop_reason)
            }
            None => (String::new(), Vec::new(), StopReason::EndTurn),
        };

        Self {
            content,
            tool_calls,
            stop_reason,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                ..Default::default()
            }),
        }
    }
}
