//! The LLM Port (spec §4.Y): a uniform, streaming, cancellable interface to
//! any completion provider.

use crate::error::LlmResult;
use async_trait::async_trait;
use futures::stream::Stream;
use meridian_core::ToolDescriptor;
use serde_json::Value;
use std::pin::Pin;

/// A single message in the conversation sent to the provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// `"user" | "assistant" | "system" | "tool"`, provider wire role.
    pub role: String,
    /// Text or structured content.
    pub content: Value,
    /// Present for tool-result messages.
    pub tool_call_id: Option<String>,
    /// Present for tool-call/tool-result messages.
    pub tool_name: Option<String>,
}

/// One requested tool invocation, as surfaced by the provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back in the matching tool result.
    pub id: String,
    /// The tool name requested.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Value,
}

/// A streamed unit of a completion in progress.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    /// An incremental text fragment of the assistant's reply.
    Delta(String),
    /// Terminal event: the completion has finished.
    Final(FinalOutcome),
}

/// How a completion concluded.
#[derive(Debug, Clone)]
pub enum FinalOutcome {
    /// A plain final assistant message.
    Text(String),
    /// One or more tool calls the runtime must dispatch before continuing.
    ToolCalls(Vec<ToolCallRequest>),
}

/// Parameters for a single completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call, already filtered by the Tool Policy Engine.
    pub tools: Vec<ToolDescriptor>,
    /// Model identifier.
    pub model: String,
    /// Whether the caller wants incremental `Delta` events.
    pub stream: bool,
}

/// A boxed, cancellable stream of completion events.
pub type CompletionStream = Pin<Box<dyn Stream<Item = LlmResult<CompletionEvent>> + Send>>;

/// Uniform interface to an LLM completion backend (spec §4.Y).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Begin a completion. Dropping the returned stream cancels the request.
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionStream>;

    /// The provider name this instance speaks for (`"openai"`, `"echo"`, ...).
    fn provider_name(&self) -> &str;
}
