//! Tool-calling agent loop
//!
//! Every agent (supervisor, solver, mentor) is a [`ReactAgent`]: render the
//! system prompt, ask the model, run any requested tools, repeat until the
//! model answers without tool calls.

use async_trait::async_trait;
use codementor_error::{Error, Result};
use codementor_runtime::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Tool, ToolContext,
    ToolRegistry, Usage, UsageTracker,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Default step budget for one `invoke`
pub const DEFAULT_MAX_STEPS: usize = 25;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Produces the system message for each model call
#[async_trait]
pub trait SystemPrompt: Send + Sync {
    /// Render the prompt for the conversation so far
    async fn render(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// A prompt that never changes
#[derive(Debug, Clone)]
pub struct StaticPrompt(pub String);

#[async_trait]
impl SystemPrompt for StaticPrompt {
    async fn render(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Outcome of one `invoke`
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Messages produced during this run (input not included)
    pub messages: Vec<ChatMessage>,
    /// Text of the final assistant message
    pub output: String,
    pub usage: Usage,
    /// Model calls made
    pub steps: usize,
}

pub struct ReactAgent<P: LlmProvider> {
    name: String,
    model: Arc<P>,
    prompt: Arc<dyn SystemPrompt>,
    tools: ToolRegistry,
    max_steps: usize,
    max_retries: u32,
    retry_base: Duration,
    usage: Option<Arc<Mutex<UsageTracker>>>,
}

impl<P: LlmProvider> ReactAgent<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run the loop on `messages` until the model gives a final answer
    pub async fn invoke(&self, messages: Vec<ChatMessage>, thread_id: Option<&str>) -> Result<AgentRun> {
        let start = messages.len();
        let mut transcript = messages;
        let mut usage = Usage::default();

        for step in 1..=self.max_steps {
            let system = self
                .prompt
                .render(&transcript)
                .await
                .map_err(|e| e.with_operation("agent::invoke").with_context("agent", self.name.clone()))?;

            let mut request_messages = Vec::with_capacity(transcript.len() + 1);
            request_messages.push(ChatMessage::system(system));
            request_messages.extend(transcript.iter().cloned());
            let request = CompletionRequest::new(request_messages).with_tools(self.tools.definitions());

            let response = self.complete_with_retry(request).await?;
            usage.add(&response.usage);

            tracing::debug!(
                agent = %self.name,
                step,
                tool_calls = response.tool_calls.len(),
                tokens = response.usage.total_tokens,
                "model responded"
            );

            let calls = response.tool_calls;
            let blank = response.content.as_deref().unwrap_or_default().trim().is_empty();
            if calls.is_empty() && blank {
                // never persisted; providers reject empty assistant turns on replay
                return Err(Error::inference_failed(format!("{} returned an empty answer", self.name))
                    .with_operation("agent::invoke")
                    .with_context("step", step.to_string()));
            }

            transcript.push(
                ChatMessage::assistant_tool_calls(response.content.clone(), calls.clone())
                    .with_name(self.name.clone()),
            );

            if calls.is_empty() {
                return Ok(AgentRun {
                    messages: transcript.split_off(start),
                    output: response.content.unwrap_or_default(),
                    usage,
                    steps: step,
                });
            }

            let ctx = ToolContext {
                messages: transcript.clone(),
                thread_id: thread_id.map(str::to_string),
            };
            for call in &calls {
                let out = self.tools.execute(call, &ctx).await;
                tracing::debug!(
                    agent = %self.name,
                    tool = %call.name,
                    is_error = out.is_error,
                    chars = out.content.len(),
                    "tool finished"
                );
                transcript.push(ChatMessage::tool_result(call.id.clone(), out.content));
            }
        }

        Err(Error::recursion_limit(self.name.clone(), self.max_steps).with_operation("agent::invoke"))
    }

    async fn complete_with_retry(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut attempt = 0u32;
        loop {
            match self.model.complete(request.clone()).await {
                Ok(response) => {
                    if let Some(tracker) = &self.usage {
                        tracker.lock().track(&response.model, &response.usage);
                    }
                    return Ok(response);
                }
                Err(provider_err) => {
                    let retry_after = match &provider_err {
                        codementor_runtime::ProviderError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    let err = provider_err
                        .into_error("agent::complete")
                        .with_context("agent", self.name.clone());

                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.max_retries {
                        return Err(err.persist());
                    }

                    let delay = backoff_delay(self.retry_base, attempt, retry_after);
                    attempt += 1;
                    tracing::warn!(
                        agent = %self.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Exponential backoff from `base`, capped, never shorter than the server's
/// `retry-after`
fn backoff_delay(base: Duration, attempt: u32, retry_after: Option<u64>) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_RETRY_DELAY);
    match retry_after {
        Some(secs) => exp.max(Duration::from_secs(secs).min(MAX_RETRY_DELAY)),
        None => exp,
    }
}

/// Builder for [`ReactAgent`]
pub struct AgentBuilder<P: LlmProvider> {
    name: String,
    model: Arc<P>,
    prompt: Arc<dyn SystemPrompt>,
    tools: ToolRegistry,
    max_steps: usize,
    max_retries: u32,
    retry_base: Duration,
    usage: Option<Arc<Mutex<UsageTracker>>>,
}

impl<P: LlmProvider> AgentBuilder<P> {
    pub fn new(name: impl Into<String>, model: Arc<P>) -> Self {
        Self {
            name: name.into(),
            model,
            prompt: Arc::new(StaticPrompt(String::new())),
            tools: ToolRegistry::new(),
            max_steps: DEFAULT_MAX_STEPS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            usage: None,
        }
    }

    pub fn prompt(mut self, prompt: impl SystemPrompt + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    pub fn static_prompt(self, prompt: impl Into<String>) -> Self {
        self.prompt(StaticPrompt(prompt.into()))
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Record every model call into a tracker shared with other agents
    pub fn usage_tracker(mut self, tracker: Arc<Mutex<UsageTracker>>) -> Self {
        self.usage = Some(tracker);
        self
    }

    pub fn build(self) -> ReactAgent<P> {
        ReactAgent {
            name: self.name,
            model: self.model,
            prompt: self.prompt,
            tools: self.tools,
            max_steps: self.max_steps,
            max_retries: self.max_retries,
            retry_base: self.retry_base,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{calls, text, ScriptedModel};
    use codementor_error::ErrorKind;
    use codementor_runtime::{ProviderError, Role, ToolDefinition};
    use serde_json::Value;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("upper", "Upper-case the text argument")
        }

        async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String> {
            assert_eq!(ctx.thread_id.as_deref(), Some("t-1"));
            Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
        }
    }

    struct CountingPrompt;

    #[async_trait]
    impl SystemPrompt for CountingPrompt {
        async fn render(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(format!("{} messages so far", messages.len()))
        }
    }

    fn agent(model: Arc<ScriptedModel>) -> ReactAgent<ScriptedModel> {
        AgentBuilder::new("helper", model)
            .prompt(CountingPrompt)
            .tool(Arc::new(Upper))
            .retry_base(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let model = Arc::new(ScriptedModel::new(vec![text("All done.")]));
        let run = agent(model.clone())
            .invoke(vec![ChatMessage::user("hi")], Some("t-1"))
            .await
            .unwrap();

        assert_eq!(run.output, "All done.");
        assert_eq!(run.steps, 1);
        assert_eq!(run.messages.len(), 1);
        assert_eq!(run.messages[0].name.as_deref(), Some("helper"));

        let request = &model.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].text(), "1 messages so far");
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_tool_calls_run_in_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            calls(&[("upper", r#"{"text":"a"}"#), ("upper", r#"{"text":"b"}"#), ("nope", "{}")]),
            text("A and B"),
        ]));
        let run = agent(model.clone())
            .invoke(vec![ChatMessage::user("shout")], Some("t-1"))
            .await
            .unwrap();

        assert_eq!(run.steps, 2);
        // assistant(calls), 3 tool results, assistant(final)
        assert_eq!(run.messages.len(), 5);
        assert_eq!(run.messages[1].text(), "A");
        assert_eq!(run.messages[2].text(), "B");
        assert!(run.messages[3].text().starts_with("Error: tool 'nope'"));
        assert_eq!(run.usage.total_tokens, 20);

        // the prompt is re-rendered with the grown transcript
        assert_eq!(model.requests()[1].messages[0].text(), "5 messages so far");
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let model = Arc::new(ScriptedModel::new(vec![text("   ")]));
        let err = agent(model.clone())
            .invoke(vec![ChatMessage::user("hi")], Some("t-1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(err.is_retryable());
        assert!(err.message().contains("helper returned an empty answer"));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let looping: Vec<_> = (0..3).map(|_| calls(&[("upper", r#"{"text":"x"}"#)])).collect();
        let model = Arc::new(ScriptedModel::new(looping));
        let agent = AgentBuilder::new("looper", model)
            .tool(Arc::new(Upper))
            .max_steps(2)
            .build();

        let err = agent.invoke(vec![ChatMessage::user("go")], Some("t-1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecursionLimit);
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let model = Arc::new(ScriptedModel::from_results(vec![
            Err(ProviderError::Api { status: 503, message: "overloaded".into() }),
            Err(ProviderError::Network("reset".into())),
            Ok(text("recovered")),
        ]));
        let run = agent(model.clone()).invoke(vec![ChatMessage::user("hi")], None).await.unwrap();
        assert_eq!(run.output, "recovered");
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let model = Arc::new(ScriptedModel::from_results(vec![Err(ProviderError::AuthenticationFailed)]));
        let err = agent(model.clone()).invoke(vec![ChatMessage::user("hi")], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_persistent() {
        let failures = (0..3).map(|_| Err(ProviderError::Network("down".into()))).collect();
        let model = Arc::new(ScriptedModel::from_results(failures));
        let agent = AgentBuilder::new("helper", model)
            .max_retries(2)
            .retry_base(Duration::from_millis(1))
            .build();

        let err = agent.invoke(vec![ChatMessage::user("hi")], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkFailed);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_shared_usage_tracker() {
        let tracker = Arc::new(Mutex::new(UsageTracker::new()));
        let model = Arc::new(ScriptedModel::new(vec![text("one"), text("two")]));
        let agent = AgentBuilder::new("a", model).usage_tracker(tracker.clone()).build();

        agent.invoke(vec![ChatMessage::user("1")], None).await.unwrap();
        agent.invoke(vec![ChatMessage::user("2")], None).await.unwrap();
        assert_eq!(tracker.lock().total_calls, 2);
        assert_eq!(tracker.lock().total_tokens(), 20);
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 20, None), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(base, 0, Some(5)), Duration::from_secs(5));
    }
}
