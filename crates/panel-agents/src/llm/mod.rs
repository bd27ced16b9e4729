//! LLM-backed personas over an OpenAI-compatible endpoint

pub mod openai;
pub mod prompt;
pub mod provider;
pub mod runtime;

pub use openai::{OpenAIConfig, OpenAIProvider};
pub use prompt::{PromptLibrary, PromptVars};
pub use provider::{
    CompletionRequest, CompletionRequestBuilder, CompletionResponse, LLMError, LLMProvider,
    LlmResult, Message, Role, TokenUsage,
};
pub use runtime::{LlmRuntime, parse_signal_reply};
