// ABOUTME: Uniform chat protocol over heterogeneous LLM providers.
// ABOUTME: Absorbs cross-provider wire-format differences so the reasoning loop sees one shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ModelErrorKind;
use crate::model::message::{Message, Role, ToolCallRef};

/// A tool schema as presented to the model, derived from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Per-call generation options. Unknown/unsupported options are ignored by adapters.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: None,
            stop: None,
        }
    }
}

/// Normalized stop reason. Values outside this closed set collapse to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Stop,
    Other,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The model's reply to one `chat` call.
///
/// If `tool_calls` is non-empty the model is requesting tool execution;
/// otherwise `text` is the final assistant reply for this turn (§4.2).
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRef>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Provider-specific chat client, reachable through one uniform entry point.
///
/// Tagged variants rather than a trait object: the set of providers is small
/// and closed, and keeping format translation local to each arm avoids a
/// leaky lowest-common-denominator abstraction (§9).
pub enum ModelAdapter {
    Anthropic(AnthropicAdapter),
    OpenAI(OpenAIAdapter),
    Local(LocalAdapter),
}

impl ModelAdapter {
    pub async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        system_prompt: &str,
        options: &ModelOptions,
    ) -> Result<ModelResponse, ModelErrorKind> {
        match self {
            Self::Anthropic(a) => a.chat(messages, tools, system_prompt, options).await,
            Self::OpenAI(a) => a.chat(messages, tools, system_prompt, options).await,
            Self::Local(a) => a.chat(messages, tools, system_prompt, options).await,
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            Self::Anthropic(a) => &a.model,
            Self::OpenAI(a) => &a.model,
            Self::Local(a) => &a.model,
        }
    }
}

fn tools_empty_is_none(tools: Option<&[ToolSchema]>) -> Option<&[ToolSchema]> {
    tools.filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Anthropic: structured content blocks; tool results as role=user blocks.
// ---------------------------------------------------------------------------

pub struct AnthropicAdapter {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        system_prompt: &str,
        options: &ModelOptions,
    ) -> Result<ModelResponse, ModelErrorKind> {
        let wire_messages: Vec<Value> = messages.iter().map(anthropic_message).collect();

        let mut body = json!({
            "model": self.model,
            "system": system_prompt,
            "messages": wire_messages,
            "max_tokens": options.max_tokens,
        });

        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(stop) = &options.stop {
            body["stop_sequences"] = json!(stop);
        }
        if let Some(tools) = tools_empty_is_none(tools) {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|t| json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    }))
                    .collect::<Vec<_>>()
            );
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ModelErrorKind::from_http_status(status.as_u16(), &text));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| ModelErrorKind::Malformed(e.to_string()))?;

        parse_anthropic_response(&parsed)
    }
}

fn anthropic_message(msg: &Message) -> Value {
    match msg.role {
        Role::User => json!({ "role": "user", "content": msg.content }),
        Role::Assistant => {
            if let Some(calls) = &msg.tool_calls {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": msg.content }));
                }
                for call in calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                json!({ "role": "assistant", "content": blocks })
            } else {
                json!({ "role": "assistant", "content": msg.content })
            }
        }
        Role::Tool => {
            let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": msg.content,
                }],
            })
        }
        Role::System => json!({ "role": "user", "content": msg.content }),
    }
}

fn parse_anthropic_response(value: &Value) -> Result<ModelResponse, ModelErrorKind> {
    let content = value
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelErrorKind::Malformed("missing content array".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                text.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ModelErrorKind::Malformed("tool_use missing id".to_string()))?
                    .to_string();
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ModelErrorKind::Malformed("tool_use missing name".to_string()))?
                    .to_string();
                let arguments = block.get("input").cloned().unwrap_or(Value::Null);
                tool_calls.push(ToolCallRef { id, name, arguments });
            }
            _ => {}
        }
    }

    let stop_reason = match value.get("stop_reason").and_then(Value::as_str) {
        Some("end_turn") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        Some("stop_sequence") => StopReason::Stop,
        _ => StopReason::Other,
    };

    let usage = value
        .get("usage")
        .map(|u| Usage {
            input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
        .unwrap_or_default();

    Ok(ModelResponse {
        text: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        stop_reason,
        usage,
    })
}

// ---------------------------------------------------------------------------
// OpenAI: tool calls in a `tool_calls` array; results as role=tool messages.
// ---------------------------------------------------------------------------

pub struct OpenAIAdapter {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    client: reqwest::Client,
}

impl OpenAIAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        system_prompt: &str,
        options: &ModelOptions,
    ) -> Result<ModelResponse, ModelErrorKind> {
        let mut wire_messages = vec![json!({ "role": "system", "content": system_prompt })];
        wire_messages.extend(messages.iter().map(openai_message));

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
            "max_tokens": options.max_tokens,
        });

        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(stop) = &options.stop {
            body["stop"] = json!(stop);
        }
        if let Some(tools) = tools_empty_is_none(tools) {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    }))
                    .collect::<Vec<_>>()
            );
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ModelErrorKind::from_http_status(status.as_u16(), &text));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| ModelErrorKind::Malformed(e.to_string()))?;

        parse_openai_response(&parsed)
    }
}

fn openai_message(msg: &Message) -> Value {
    match msg.role {
        Role::User => json!({ "role": "user", "content": msg.content }),
        Role::System => json!({ "role": "system", "content": msg.content }),
        Role::Assistant => {
            if let Some(calls) = &msg.tool_calls {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": if msg.content.is_empty() { Value::Null } else { json!(msg.content) },
                    "tool_calls": tool_calls,
                })
            } else {
                json!({ "role": "assistant", "content": msg.content })
            }
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
    }
}

fn parse_openai_response(value: &Value) -> Result<ModelResponse, ModelErrorKind> {
    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| ModelErrorKind::Malformed("missing choices[0]".to_string()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| ModelErrorKind::Malformed("missing message".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| ModelErrorKind::Malformed("tool_call missing id".to_string()))?
                .to_string();
            let function = call
                .get("function")
                .ok_or_else(|| ModelErrorKind::Malformed("tool_call missing function".to_string()))?;
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ModelErrorKind::Malformed("function missing name".to_string()))?
                .to_string();
            let arguments_str = function.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            let arguments: Value = serde_json::from_str(arguments_str).unwrap_or(Value::Null);
            tool_calls.push(ToolCallRef { id, name, arguments });
        }
    }

    let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        _ => StopReason::Other,
    };

    let usage = value
        .get("usage")
        .map(|u| Usage {
            input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            output_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
        .unwrap_or_default();

    Ok(ModelResponse {
        text,
        tool_calls,
        stop_reason,
        usage,
    })
}

// ---------------------------------------------------------------------------
// Local: an OpenAI-wire-compatible endpoint (e.g. an Ollama `/v1` shim)
// reachable without an API key.
// ---------------------------------------------------------------------------

pub struct LocalAdapter {
    pub model: String,
    pub base_url: String,
    inner: OpenAIAdapter,
}

impl LocalAdapter {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let model = model.into();
        let base_url = base_url.into();
        Self {
            model: model.clone(),
            base_url: base_url.clone(),
            inner: OpenAIAdapter::new(model, "").with_base_url(base_url),
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        system_prompt: &str,
        options: &ModelOptions,
    ) -> Result<ModelResponse, ModelErrorKind> {
        self.inner.chat(messages, tools, system_prompt, options).await
    }
}
