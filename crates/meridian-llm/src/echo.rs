//! An in-memory, deterministic [`LlmProvider`] for tests and offline runs.

use crate::error::LlmResult;
use crate::provider::{ChatMessage, CompletionEvent, CompletionRequest, CompletionStream, FinalOutcome, LlmProvider};
use async_trait::async_trait;
use futures::stream;

/// Echoes the last user message back as the final assistant text, streamed
/// one word at a time. Never requests a tool call.
#[derive(Debug, Default)]
pub struct EchoProvider;

fn last_user_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .and_then(|m| m.content.as_str())
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionStream> {
        let text = last_user_text(&request.messages);
        let mut events: Vec<LlmResult<CompletionEvent>> = Vec::new();
        if request.stream {
            for word in text.split_whitespace() {
                events.push(Ok(CompletionEvent::Delta(format!("{word} "))));
            }
        }
        events.push(Ok(CompletionEvent::Final(FinalOutcome::Text(text))));
        Ok(Box::pin(stream::iter(events)))
    }

    fn provider_name(&self) -> &str {
        "echo"
    }
}
