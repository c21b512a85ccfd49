//! LLM provider abstractions and implementations for Tandem.
//!
//! The answer composer talks to a [`LlmProvider`]; this crate supplies the
//! Claude HTTP provider, a mock for tests and offline runs, and a
//! [`RetryWrapper`] adding per-attempt timeouts and exponential retry.

mod claude;
mod config;
mod mock;
mod provider;
mod retry;

pub use claude::ClaudeProvider;
pub use config::{GenerationConfig, create_llm_provider};
pub use mock::MockLlmProvider;
pub use provider::{
    CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, LlmProvider, TokenUsage,
};
pub use retry::RetryWrapper;
