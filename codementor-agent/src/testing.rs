//! Scripted model for tests

use codementor_runtime::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderError, ToolCall, Usage,
};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Replays canned responses in order and records every request
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub(crate) fn from_results(script: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl LlmProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn models(&self) -> Vec<String> {
        vec!["scripted-1".into()]
    }

    fn default_model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidRequest("script exhausted".into())))
    }
}

fn response(content: Option<String>, tool_calls: Vec<ToolCall>) -> CompletionResponse {
    let finish_reason = if tool_calls.is_empty() { FinishReason::Stop } else { FinishReason::ToolCalls };
    CompletionResponse {
        id: uuid::Uuid::new_v4().to_string(),
        model: "scripted-1".into(),
        content,
        tool_calls,
        finish_reason,
        usage: Usage {
            prompt_tokens: 6,
            completion_tokens: 4,
            total_tokens: 10,
        },
    }
}

/// A final text answer
pub(crate) fn text(content: &str) -> CompletionResponse {
    response(Some(content.to_string()), Vec::new())
}

/// A turn requesting the given `(tool, arguments)` calls
pub(crate) fn calls(requested: &[(&str, &str)]) -> CompletionResponse {
    let tool_calls = requested
        .iter()
        .map(|(name, args)| ToolCall::new(format!("call_{}", uuid::Uuid::new_v4().simple()), *name, *args))
        .collect();
    response(None, tool_calls)
}
