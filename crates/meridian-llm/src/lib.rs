//! The LLM Port (spec §4.Y) and Credential Pool (spec §4.M6).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod credential;
mod echo;
mod error;
mod openai_compat;
mod provider;

pub use credential::{CredentialPool, FailureKind};
pub use echo::EchoProvider;
pub use error::{LlmError, LlmResult};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{
    ChatMessage, CompletionEvent, CompletionRequest, CompletionStream, FinalOutcome, LlmProvider, ToolCallRequest,
};
