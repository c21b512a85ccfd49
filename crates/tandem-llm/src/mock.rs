//! Mock LLM provider for testing and offline runs.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use tandem_core::{Error, Result};

/// What the mock answers with.
#[derive(Debug, Clone)]
enum Mode {
    /// Canned responses, cycled in order.
    Canned(Vec<String>),
    /// Echo the system prompt back (the retrieved context, in practice).
    Echo,
    /// Fail every call.
    Failing { retryable: bool },
}

/// Mock LLM provider.
///
/// Records every request it receives so tests can inspect the prompt.
#[derive(Clone)]
pub struct MockLlmProvider {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    mode: Mode,
    index: usize,
    requests: Vec<CompletionRequest>,
}

impl MockLlmProvider {
    fn with_mode(mode: Mode) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                mode,
                index: 0,
                requests: Vec::new(),
            })),
        }
    }

    /// Creates a mock provider with canned responses.
    ///
    /// Responses are returned in order. After all responses are used,
    /// the provider cycles back to the first response.
    ///
    /// # Examples
    ///
    /// ```
    /// use tandem_llm::MockLlmProvider;
    ///
    /// let provider = MockLlmProvider::new(vec![
    ///     "First response".to_string(),
    ///     "Second response".to_string(),
    /// ]);
    /// ```
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_mode(Mode::Canned(responses))
    }

    /// Creates a mock provider with a single response.
    pub fn with_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Creates a mock that answers with the request's system prompt.
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    /// Creates a mock whose calls always fail.
    ///
    /// A `retryable` failure is a transport error; otherwise a generation
    /// error.
    pub fn failing(retryable: bool) -> Self {
        Self::with_mode(Mode::Failing { retryable })
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Number of calls received so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());

        let content = match &state.mode {
            Mode::Canned(canned) if canned.is_empty() => String::new(),
            Mode::Canned(canned) => canned[state.index % canned.len()].clone(),
            Mode::Echo => request.system_prompt,
            Mode::Failing { retryable: true } => {
                return Err(Error::transport("mock provider unavailable"));
            }
            Mode::Failing { retryable: false } => {
                return Err(Error::generation("mock provider refused the request"));
            }
        };
        state.index += 1;

        Ok(CompletionResponse {
            content,
            tokens_used: TokenUsage {
                input: 10,
                output: 20,
            },
            truncated: false,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
