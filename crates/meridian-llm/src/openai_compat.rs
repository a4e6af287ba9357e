//! An OpenAI-compatible [`LlmProvider`] (LM Studio, vLLM, Ollama, OpenAI
//! itself, or any endpoint speaking the same wire format).

use crate::error::{LlmError, LlmResult};
use crate::provider::{
    ChatMessage, CompletionEvent, CompletionRequest, CompletionStream, FinalOutcome, LlmProvider, ToolCallRequest,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Speaks the `/v1/chat/completions` wire format used by OpenAI and most
/// self-hosted compatible servers.
pub struct OpenAiCompatProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Build a provider against `base_url`, authenticating with `api_key` if
    /// given. Local endpoints (localhost/127.0.0.1) are allowed without one.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn requires_key(&self) -> bool {
        self.api_key.is_none() && !is_local_url(&self.base_url)
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(convert_message).collect();
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": request.stream,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    let mut parameters = t.input_schema.clone();
                    if let Some(obj) = parameters.as_object_mut() {
                        obj.entry("properties").or_insert_with(|| serde_json::json!({}));
                    }
                    serde_json::json!({
                        "type": "function",
                        "function": { "name": t.name, "parameters": parameters },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost") || lower.contains("127.0.0.1") || lower.contains("[::1]")
}

fn convert_message(msg: &ChatMessage) -> Value {
    if let (Some(call_id), Some(_)) = (&msg.tool_call_id, &msg.tool_name) {
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": msg.content,
        });
    }
    serde_json::json!({ "role": msg.role, "content": msg.content })
}

fn status_to_error(status: reqwest::StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthInvalid(body),
        429 | 500..=599 => LlmError::Transient(body),
        _ => LlmError::ProviderUnavailable(format!("HTTP {status}: {body}")),
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionStream> {
        if self.requires_key() {
            return Err(LlmError::ProviderUnavailable("no API key configured for a remote endpoint".into()));
        }

        let body = self.build_body(&request);
        debug!(model = %request.model, base_url = %self.base_url, "starting openai-compatible completion");

        let mut req = self.client.post(&self.base_url).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.json(&body).send().await.map_err(|e| LlmError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(status, body));
        }

        let stream = try_stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut text_so_far = String::new();
            let mut pending: HashMap<usize, PendingToolCall> = HashMap::new();
            let mut order: Vec<usize> = Vec::new();

            while let Some(chunk) = bytes_stream.next().await {
                let chunk = chunk.map_err(|e| LlmError::Transient(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find("\n\n") {
                    let event_text = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    for line in event_text.lines() {
                        let Some(data) = line.strip_prefix("data: ") else { continue };
                        if data.trim() == "[DONE]" {
                            continue;
                        }
                        let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
                            warn!(raw = %data, "unparseable stream chunk from provider");
                            continue;
                        };
                        let Some(choice) = event.choices.first() else { continue };

                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                text_so_far.push_str(content);
                                yield CompletionEvent::Delta(content.clone());
                            }
                        }

                        if let Some(tool_calls) = &choice.delta.tool_calls {
                            for tc in tool_calls {
                                let entry = pending.entry(tc.index).or_insert_with(|| {
                                    order.push(tc.index);
                                    PendingToolCall::default()
                                });
                                if let Some(id) = &tc.id {
                                    entry.id = id.clone();
                                }
                                if let Some(function) = &tc.function {
                                    if let Some(name) = &function.name {
                                        entry.name.push_str(name);
                                    }
                                    if let Some(args) = &function.arguments {
                                        entry.arguments.push_str(args);
                                    }
                                }
                            }
                        }

                        if choice.finish_reason.is_some() {
                            if pending.is_empty() {
                                yield CompletionEvent::Final(FinalOutcome::Text(text_so_far.clone()));
                            } else {
                                let calls = order
                                    .iter()
                                    .filter_map(|i| pending.get(i))
                                    .map(|p| ToolCallRequest {
                                        id: p.id.clone(),
                                        name: p.name.clone(),
                                        arguments: serde_json::from_str(&p.arguments).unwrap_or(Value::Null),
                                    })
                                    .collect();
                                yield CompletionEvent::Final(FinalOutcome::ToolCalls(calls));
                            }
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &str {
        "openai-compat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_key_for_remote_endpoints_only() {
        let local = OpenAiCompatProvider::new("http://localhost:1234/v1/chat/completions", None);
        assert!(!local.requires_key());

        let remote = OpenAiCompatProvider::new("https://api.openai.com/v1/chat/completions", None);
        assert!(remote.requires_key());
    }

    #[test]
    fn status_codes_map_to_the_right_error_kind() {
        assert!(matches!(
            status_to_error(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            LlmError::AuthInvalid(_)
        ));
        assert!(matches!(
            status_to_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::Transient(_)
        ));
        assert!(matches!(
            status_to_error(reqwest::StatusCode::BAD_REQUEST, String::new()),
            LlmError::ProviderUnavailable(_)
        ));
    }
}
