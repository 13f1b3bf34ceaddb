//! Handoffs between agents
//!
//! A handoff is a tool named `transfer_to_<agent>`. Calling it runs the
//! target agent on the caller's conversation and returns the agent's final
//! message as the tool result, so control always comes back to the caller.

use crate::react::ReactAgent;
use async_trait::async_trait;
use codementor_error::Result;
use codementor_runtime::{ChatMessage, LlmProvider, Role, Tool, ToolContext, ToolDefinition};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const HANDOFF_PREFIX: &str = "transfer_to_";

/// Tool name for handing off to `agent`
pub fn handoff_tool_name(agent: &str) -> String {
    format!("{}{}", HANDOFF_PREFIX, agent)
}

/// Agent name targeted by a handoff tool name
pub fn handoff_target(tool_name: &str) -> Option<&str> {
    tool_name.strip_prefix(HANDOFF_PREFIX)
}

/// Inspects a sub-agent's output before it is returned to the caller
pub trait HandoffReview: Send + Sync {
    /// A note to append to the output, if anything needs the caller's attention
    fn review(&self, output: &str, ctx: &ToolContext) -> Option<String>;
}

pub struct HandoffTool<P: LlmProvider> {
    agent: Arc<ReactAgent<P>>,
    review: Option<Arc<dyn HandoffReview>>,
}

impl<P: LlmProvider> HandoffTool<P> {
    pub fn new(agent: Arc<ReactAgent<P>>) -> Self {
        Self { agent, review: None }
    }

    pub fn with_review(mut self, review: Arc<dyn HandoffReview>) -> Self {
        self.review = Some(review);
        self
    }

    pub fn agent(&self) -> &Arc<ReactAgent<P>> {
        &self.agent
    }
}

/// The conversation a sub-agent sees.
///
/// User text and assistant text are kept; tool plumbing is dropped, except
/// that results of earlier handoffs become assistant messages named after
/// the agent that produced them.
pub fn handoff_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut out = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {}
            Role::User => {
                if !msg.text().trim().is_empty() {
                    out.push(msg.clone());
                }
            }
            Role::Assistant => {
                for call in msg.tool_calls.iter().flatten() {
                    call_names.insert(&call.id, &call.name);
                }
                if !msg.text().trim().is_empty() {
                    let mut kept = ChatMessage::assistant(msg.text());
                    kept.name = msg.name.clone();
                    out.push(kept);
                }
            }
            Role::Tool => {
                let agent = msg
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| call_names.get(id))
                    .and_then(|name| handoff_target(name));
                if let Some(agent) = agent {
                    out.push(ChatMessage::assistant(msg.text()).with_name(agent));
                }
            }
        }
    }

    out
}

#[async_trait]
impl<P: LlmProvider + 'static> Tool for HandoffTool<P> {
    fn definition(&self) -> ToolDefinition {
        let name = self.agent.name();
        ToolDefinition::new(
            handoff_tool_name(name),
            format!(
                "Transfer the conversation to {}. Its final answer is returned to you.",
                name
            ),
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "instructions": {
                    "type": "string",
                    "description": format!("Optional guidance or feedback for {}", name)
                }
            },
            "required": []
        }))
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let agent = self.agent.name();
        let instructions = args
            .get("instructions")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut input = handoff_messages(&ctx.messages);
        match instructions {
            Some(text) => input.push(ChatMessage::user(text)),
            None if input.last().map(|m| m.role) != Some(Role::User) => {
                input.push(ChatMessage::user("Continue with the task above."));
            }
            None => {}
        }

        tracing::info!(agent, with_instructions = instructions.is_some(), "handing off");

        let run = self
            .agent
            .invoke(input, ctx.thread_id.as_deref())
            .await
            .map_err(|e| e.with_operation("handoff::call"))?;

        let mut output = run.output;
        if let Some(note) = self.review.as_ref().and_then(|r| r.review(&output, ctx)) {
            tracing::warn!(agent, note = %note, "handoff output flagged for review");
            output.push_str("\n\n");
            output.push_str(&note);
        }

        tracing::info!(agent, steps = run.steps, tokens = run.usage.total_tokens, "handoff returned");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::AgentBuilder;
    use crate::testing::{calls, text, ScriptedModel};
    use codementor_runtime::{ToolCall, ToolRegistry};

    struct Always(&'static str);

    impl HandoffReview for Always {
        fn review(&self, _output: &str, _ctx: &ToolContext) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("My loop is off by one:\n```rust\nfor i in 0..=n {}\n```"),
            ChatMessage::assistant_tool_calls(
                Some("Let me get a solution first.".into()),
                vec![ToolCall::new("c1", "transfer_to_solving_agent", "{}")],
            )
            .with_name("supervisor"),
            ChatMessage::tool_result("c1", "Solution: use 0..n"),
            ChatMessage::assistant_tool_calls(None, vec![ToolCall::new("c2", "search_memory", "{}")])
                .with_name("supervisor"),
            ChatMessage::tool_result("c2", "[]"),
        ]
    }

    #[test]
    fn test_handoff_messages() {
        let msgs = handoff_messages(&conversation());
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].name.as_deref(), Some("supervisor"));
        assert!(msgs[1].tool_calls.is_none());
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[2].name.as_deref(), Some("solving_agent"));
        assert_eq!(msgs[2].text(), "Solution: use 0..n");
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(handoff_tool_name("mentor_agent"), "transfer_to_mentor_agent");
        assert_eq!(handoff_target("transfer_to_mentor_agent"), Some("mentor_agent"));
        assert_eq!(handoff_target("manage_memory"), None);
    }

    #[tokio::test]
    async fn test_handoff_runs_sub_agent_with_instructions() {
        let model = Arc::new(ScriptedModel::new(vec![text("1. Think about ranges.")]));
        let mentor = Arc::new(AgentBuilder::new("mentor_agent", model.clone()).static_prompt("mentor").build());
        let tool = HandoffTool::new(mentor).with_review(Arc::new(Always("[review] check this")));

        let ctx = ToolContext::new(conversation()).with_thread_id("t-1");
        let out = tool
            .call(json!({"instructions": "Hints were too revealing, try again."}), &ctx)
            .await
            .unwrap();

        assert_eq!(out, "1. Think about ranges.\n\n[review] check this");

        let sent = &model.requests()[0].messages;
        assert_eq!(sent[0].text(), "mentor");
        assert_eq!(sent.last().unwrap().text(), "Hints were too revealing, try again.");
        assert!(sent.iter().all(|m| m.role != Role::Tool));
    }

    #[tokio::test]
    async fn test_handoff_without_instructions_nudges() {
        let model = Arc::new(ScriptedModel::new(vec![text("Solution: ...")]));
        let solver = Arc::new(AgentBuilder::new("solving_agent", model.clone()).build());
        let tool = HandoffTool::new(solver);

        tool.call(json!({}), &ToolContext::new(conversation())).await.unwrap();
        let sent = &model.requests()[0].messages;
        assert_eq!(sent.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_handoff_in_registry() {
        let model = Arc::new(ScriptedModel::new(vec![
            calls(&[("transfer_to_solving_agent", "")]),
            text("solved"),
            text("supervisor reply"),
        ]));
        let solver = Arc::new(AgentBuilder::new("solving_agent", model.clone()).build());
        let supervisor = AgentBuilder::new("supervisor", model.clone())
            .tool(Arc::new(HandoffTool::new(solver)))
            .build();

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(HandoffTool::new(Arc::new(AgentBuilder::new("x", model.clone()).build()))));
        assert_eq!(registry.names(), ["transfer_to_x"]);

        let run = supervisor.invoke(vec![ChatMessage::user("fix my code")], None).await.unwrap();
        assert_eq!(run.output, "supervisor reply");
        assert_eq!(run.messages[1].text(), "solved");
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn test_empty_sub_agent_answer_is_an_error() {
        let model = Arc::new(ScriptedModel::new(vec![text("")]));
        let agent = Arc::new(AgentBuilder::new("mentor_agent", model).build());
        let err = HandoffTool::new(agent)
            .call(json!({}), &ToolContext::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), codementor_error::ErrorKind::InferenceFailed);
        assert_eq!(err.operation(), "handoff::call");
        assert!(err.message().contains("mentor_agent returned an empty answer"));
    }
}
