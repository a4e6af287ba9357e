//! Session compaction (spec §4.M4): shrinking the oldest portion of a
//! session's history into LLM-produced summaries once the running token
//! count crosses a soft limit, without ever splitting a `tool_call` from
//! its `tool_result` or touching the preserved tail.

use meridian_core::{Message, MessageRole};
use meridian_llm::{ChatMessage, CompletionEvent, CompletionRequest, FinalOutcome, LlmProvider, LlmResult};

/// The largest number of messages summarized by a single LLM call. Kept
/// small so one slow/oversized chunk doesn't dominate a compaction pass.
const DEFAULT_CHUNK_SIZE: usize = 20;

/// The fraction of the compactable head folded into summaries on a single
/// pass. Starts at 40% for short histories and decays toward a 15% floor
/// as the session accumulates more messages, so compaction takes
/// progressively smaller bites rather than re-summarizing a growing head
/// in one shot.
#[must_use]
pub fn adaptive_head_ratio(total_messages: usize) -> f64 {
    const MAX_RATIO: f64 = 0.40;
    const MIN_RATIO: f64 = 0.15;
    const DECAY_SCALE: f64 = 200.0;

    let decay = (-(total_messages as f64) / DECAY_SCALE).exp();
    MIN_RATIO + (MAX_RATIO - MIN_RATIO) * decay
}

fn is_tool_pair_boundary(messages: &[Message], split_at: usize) -> bool {
    match messages.get(split_at.saturating_sub(1)) {
        Some(msg) if msg.role == MessageRole::ToolCall => false,
        _ => true,
    }
}

/// Shrink `split_at` leftward until it doesn't separate a `tool_call` from
/// its `tool_result`.
fn align_to_pair_boundary(messages: &[Message], mut split_at: usize) -> usize {
    while split_at > 0 && !is_tool_pair_boundary(messages, split_at) {
        split_at -= 1;
    }
    split_at
}

/// One contiguous run of messages to be summarized together.
pub type Chunk = Vec<Message>;

/// Plan a compaction pass over `messages` (already filtered to the active,
/// not-yet-superseded set). Returns `None` if there is nothing eligible —
/// either the history is too short to leave `tail_keep` messages verbatim
/// after compacting anything, or the pair-boundary alignment collapses the
/// head to nothing.
#[must_use]
pub fn plan_compaction(messages: &[Message], tail_keep: usize) -> Option<Vec<Chunk>> {
    if messages.len() <= tail_keep {
        return None;
    }
    let compactable_len = messages.len() - tail_keep;
    let ratio = adaptive_head_ratio(messages.len());
    let head_len = ((compactable_len as f64) * ratio).ceil() as usize;
    let head_len = align_to_pair_boundary(messages, head_len.min(compactable_len));
    if head_len == 0 {
        return None;
    }

    let head = &messages[..head_len];
    let chunks: Vec<Chunk> = head.chunks(DEFAULT_CHUNK_SIZE).map(<[Message]>::to_vec).collect();
    Some(chunks)
}

/// Summarize one chunk via `provider`, collecting the streamed completion
/// into its final text.
pub async fn summarize_chunk(provider: &dyn LlmProvider, model: &str, chunk: &[Message]) -> LlmResult<String> {
    use futures::StreamExt;

    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        content: serde_json::json!(
            "Summarize the following conversation excerpt in a few sentences, \
             preserving any decisions, facts, or outstanding tool results a \
             later reader would need."
        ),
        tool_call_id: None,
        tool_name: None,
    }];
    messages.extend(chunk.iter().map(to_chat_message));

    let request = CompletionRequest {
        messages,
        tools: Vec::new(),
        model: model.to_string(),
        stream: false,
    };

    let mut stream = provider.complete(request).await?;
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        if let CompletionEvent::Final(FinalOutcome::Text(final_text)) = event? {
            text = final_text;
        }
    }
    Ok(text)
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::ToolCall => "assistant",
        MessageRole::ToolResult => "tool",
    };
    ChatMessage {
        role: role.to_string(),
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.clone(),
        tool_name: message.tool_name.clone(),
    }
}

/// Join per-chunk summaries, in order, into the single synthetic summary
/// message's content.
#[must_use]
pub fn merge_summaries(parts: &[String]) -> String {
    parts.join("\n\n")
}
