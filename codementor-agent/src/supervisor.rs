//! The supervisor agent
//!
//! Routes the student's question to the solving and mentor agents through
//! handoff tools, and keeps hint batches in the memory store.

use crate::memory_tools::{ManageMemoryTool, SearchMemoryTool};
use crate::prompts::{render, SUPERVISOR_PROMPT};
use crate::react::{AgentBuilder, SystemPrompt};
use async_trait::async_trait;
use codementor_error::Result;
use codementor_runtime::{ChatMessage, InMemoryStore, LlmProvider, Namespace, SearchQuery, Tool};
use std::sync::Arc;

pub const SUPERVISOR_NAME: &str = "supervisor";

/// Memories pulled into the supervisor prompt per model call
pub const MEMORY_PROMPT_LIMIT: usize = 15;

const MEMORIES_HEADER: &str = "==== RETRIEVED MEMORIES ====\n\n";

/// Supervisor prompt with memories relevant to the latest message filled in
pub struct MemoryPrompt {
    store: Arc<InMemoryStore>,
    namespace: Namespace,
    limit: usize,
}

impl MemoryPrompt {
    pub fn new(store: Arc<InMemoryStore>, namespace: Namespace) -> Self {
        Self {
            store,
            namespace,
            limit: MEMORY_PROMPT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    async fn memories(&self, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Ok(String::new());
        }

        let hits = self
            .store
            .search(&self.namespace, SearchQuery::new(query).with_limit(self.limit))
            .await?;
        if hits.is_empty() {
            return Ok(String::new());
        }

        let formatted: Vec<String> = hits
            .iter()
            .map(|hit| format!("Memory ID: {}\n{}", hit.item.key, hit.item.content_text()))
            .collect();
        Ok(format!("{}{}", MEMORIES_HEADER, formatted.join("\n\n")))
    }
}

#[async_trait]
impl SystemPrompt for MemoryPrompt {
    async fn render(&self, messages: &[ChatMessage]) -> Result<String> {
        let message = messages.last().map(ChatMessage::text).unwrap_or_default();
        let memories = self
            .memories(message)
            .await
            .map_err(|e| e.with_operation("supervisor::render_prompt"))?;

        tracing::debug!(
            namespace = %self.namespace,
            retrieved = !memories.is_empty(),
            "rendered supervisor prompt"
        );
        Ok(render(SUPERVISOR_PROMPT, &[("memories", &memories), ("message", message)]))
    }
}

/// Builder for the supervisor: memory prompt, memory tools and `handoffs`.
///
/// Returned unbuilt so callers can still set step limits and usage tracking.
pub fn create_supervisor<P: LlmProvider>(
    model: Arc<P>,
    handoffs: Vec<Arc<dyn Tool>>,
    store: Arc<InMemoryStore>,
    namespace: Namespace,
) -> AgentBuilder<P> {
    let mut builder = AgentBuilder::new(SUPERVISOR_NAME, model)
        .prompt(MemoryPrompt::new(store.clone(), namespace.clone()));

    for handoff in handoffs {
        builder = builder.tool(handoff);
    }

    builder
        .tool(Arc::new(ManageMemoryTool::new(store.clone(), namespace.clone())))
        .tool(Arc::new(SearchMemoryTool::new(store, namespace)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::HandoffTool;
    use crate::memory_tools::memories_namespace;
    use crate::testing::{text, ScriptedModel};
    use codementor_runtime::{HashEmbedder, IndexConfig};
    use serde_json::json;

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_index(
            IndexConfig::new(64, "hash:bow"),
            Arc::new(HashEmbedder::new(64)),
        ))
    }

    #[tokio::test]
    async fn test_memory_prompt_includes_hits() {
        let store = store();
        store
            .put(&memories_namespace(), "m-1", json!({"content": "1. Think about loop bounds"}))
            .await
            .unwrap();

        let prompt = MemoryPrompt::new(store, memories_namespace());
        let rendered = prompt
            .render(&[ChatMessage::user("my loop bounds are wrong")])
            .await
            .unwrap();

        assert!(rendered.contains("==== RETRIEVED MEMORIES ====\n\nMemory ID: m-1\n1. Think about loop bounds"));
        assert!(rendered.contains("<message>\nmy loop bounds are wrong\n</message>"));
        assert!(!rendered.contains("{memories}"));
    }

    #[tokio::test]
    async fn test_memory_prompt_empty_store() {
        let prompt = MemoryPrompt::new(store(), memories_namespace());
        let rendered = prompt.render(&[ChatMessage::user("hello")]).await.unwrap();
        assert!(rendered.contains("<memories>\n\n</memories>"));

        let rendered = prompt.render(&[]).await.unwrap();
        assert!(rendered.contains("<message>\n\n</message>"));
    }

    #[tokio::test]
    async fn test_memory_prompt_limit() {
        let store = store();
        for i in 0..4 {
            store
                .put(&memories_namespace(), &format!("m-{}", i), json!({"content": format!("hint {}", i)}))
                .await
                .unwrap();
        }
        let prompt = MemoryPrompt::new(store, memories_namespace()).with_limit(2);
        let rendered = prompt.render(&[ChatMessage::user("hint")]).await.unwrap();
        assert_eq!(rendered.matches("Memory ID:").count(), 2);
    }

    #[test]
    fn test_create_supervisor_tools() {
        let model = Arc::new(ScriptedModel::new(vec![text("ok")]));
        let solver = Arc::new(AgentBuilder::new("solving_agent", model.clone()).build());
        let mentor = Arc::new(AgentBuilder::new("mentor_agent", model.clone()).build());

        let handoffs: Vec<Arc<dyn Tool>> =
            vec![Arc::new(HandoffTool::new(solver)), Arc::new(HandoffTool::new(mentor))];
        let supervisor = create_supervisor(model, handoffs, store(), memories_namespace()).build();

        assert_eq!(supervisor.name(), "supervisor");
        assert_eq!(
            supervisor.tools().names(),
            ["transfer_to_solving_agent", "transfer_to_mentor_agent", "manage_memory", "search_memory"]
        );
    }
}
