//! The assembled mentor application
//!
//! Wires the solving and mentor agents behind the supervisor, attaches the
//! memory store and a checkpointer, and runs one student turn at a time per
//! thread.

use crate::handoff::{handoff_target, HandoffTool};
use crate::hints::MentorReview;
use crate::memory_tools::memories_namespace;
use crate::prompts::{mentor_prompt, solver_prompt};
use crate::react::{AgentBuilder, ReactAgent, DEFAULT_MAX_STEPS};
use crate::supervisor::{create_supervisor, SUPERVISOR_NAME};
use codementor_error::Result;
use codementor_runtime::{
    init_chat_model, init_embeddings, ChatMessage, ChatModel, CheckpointMetadata, Checkpointer,
    Configuration, FetchDocTool, InMemorySaver, InMemoryStore, IndexConfig, Item, LlmProvider,
    Namespace, Role, RunnableConfig, SearchQuery, Tool, Usage, UsageTracker,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub const SOLVER_NAME: &str = "solving_agent";
pub const MENTOR_NAME: &str = "mentor_agent";

/// Result of one student turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The supervisor's reply to the student
    pub response: String,
    /// Agents handed off to during the turn, in call order
    pub handoffs: Vec<String>,
    /// Memories created or updated during the turn
    pub memories_written: usize,
    /// Tokens spent by all agents during the turn
    pub usage: Usage,
}

pub struct MentorApp<P: LlmProvider> {
    supervisor: ReactAgent<P>,
    store: Arc<InMemoryStore>,
    checkpointer: Arc<dyn Checkpointer>,
    usage: Arc<Mutex<UsageTracker>>,
    namespace: Namespace,
}

impl<P: LlmProvider + 'static> MentorApp<P> {
    pub fn builder(model: Arc<P>) -> MentorAppBuilder<P> {
        MentorAppBuilder::new(model)
    }

    /// Run one student message on `thread_id`.
    ///
    /// The thread resumes from its latest checkpoint. An input checkpoint is
    /// written before the supervisor runs and a loop checkpoint after.
    pub async fn invoke(&self, thread_id: &str, message: impl Into<String>) -> Result<TurnOutcome> {
        let mut messages = self
            .checkpointer
            .get_latest(thread_id)?
            .map(|c| c.messages)
            .unwrap_or_default();
        messages.push(ChatMessage::user(message));
        self.checkpointer
            .put(thread_id, messages.clone(), CheckpointMetadata::input())?;

        let before = self.usage.lock().clone();
        let run = self
            .supervisor
            .invoke(messages.clone(), Some(thread_id))
            .await
            .map_err(|e| e.with_operation("app::invoke").with_context("thread_id", thread_id))?;
        let usage = usage_since(&before, &self.usage.lock());

        let handoffs = handoffs_in(&run.messages);
        let memories_written = memory_writes_in(&run.messages);

        messages.extend(run.messages);
        self.checkpointer
            .put(thread_id, messages, CheckpointMetadata::from_loop(SUPERVISOR_NAME))?;

        tracing::info!(
            thread_id,
            steps = run.steps,
            handoffs = ?handoffs,
            memories_written,
            tokens = usage.total_tokens,
            "turn complete"
        );

        Ok(TurnOutcome {
            response: run.output,
            handoffs,
            memories_written,
            usage,
        })
    }

    /// Conversation of a thread as of its latest checkpoint
    pub fn history(&self, thread_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .checkpointer
            .get_latest(thread_id)?
            .map(|c| c.messages)
            .unwrap_or_default())
    }

    /// Forget a thread's checkpoints; stored memories are kept
    pub fn reset_thread(&self, thread_id: &str) -> Result<()> {
        self.checkpointer.delete_thread(thread_id)
    }

    pub fn threads(&self) -> Result<Vec<String>> {
        self.checkpointer.list_threads()
    }

    /// Every stored hint memory, oldest first
    pub async fn memories(&self) -> Result<Vec<Item>> {
        let hits = self
            .store
            .search(&self.namespace, SearchQuery::default().with_limit(usize::MAX))
            .await?;
        Ok(hits.into_iter().map(|hit| hit.item).collect())
    }

    /// Memories most similar to `query`
    pub async fn search_memories(&self, query: &str, limit: usize) -> Result<Vec<Item>> {
        let hits = self
            .store
            .search(&self.namespace, SearchQuery::new(query).with_limit(limit))
            .await?;
        Ok(hits.into_iter().map(|hit| hit.item).collect())
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    /// Usage across every agent since the app was built
    pub fn usage(&self) -> UsageTracker {
        self.usage.lock().clone()
    }

    pub fn supervisor(&self) -> &ReactAgent<P> {
        &self.supervisor
    }
}

fn usage_since(before: &UsageTracker, after: &UsageTracker) -> Usage {
    let prompt_tokens = after.total_prompt_tokens.saturating_sub(before.total_prompt_tokens);
    let completion_tokens = after
        .total_completion_tokens
        .saturating_sub(before.total_completion_tokens);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

fn handoffs_in(messages: &[ChatMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_calls.iter().flatten())
        .filter_map(|call| handoff_target(&call.name))
        .map(str::to_string)
        .collect()
}

fn memory_writes_in(messages: &[ChatMessage]) -> usize {
    let memory_calls: HashSet<&str> = messages
        .iter()
        .flat_map(|m| m.tool_calls.iter().flatten())
        .filter(|call| call.name == "manage_memory")
        .map(|call| call.id.as_str())
        .collect();

    messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter(|m| {
            m.tool_call_id
                .as_deref()
                .is_some_and(|id| memory_calls.contains(id))
        })
        .filter(|m| m.text().starts_with("created memory") || m.text().starts_with("updated memory"))
        .count()
}

/// Builder for [`MentorApp`]
pub struct MentorAppBuilder<P: LlmProvider> {
    model: Arc<P>,
    store: Option<Arc<InMemoryStore>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    namespace: Namespace,
    max_steps: usize,
}

impl<P: LlmProvider + 'static> MentorAppBuilder<P> {
    pub fn new(model: Arc<P>) -> Self {
        Self {
            model,
            store: None,
            checkpointer: None,
            namespace: memories_namespace(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn store(mut self, store: Arc<InMemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Step budget for each agent's loop
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Result<MentorApp<P>> {
        let usage = Arc::new(Mutex::new(UsageTracker::new()));
        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let checkpointer = self
            .checkpointer
            .unwrap_or_else(|| Arc::new(InMemorySaver::new()));
        let fetch_doc: Arc<dyn Tool> = Arc::new(FetchDocTool::new()?);

        let solver = AgentBuilder::new(SOLVER_NAME, self.model.clone())
            .static_prompt(solver_prompt())
            .tool(fetch_doc.clone())
            .max_steps(self.max_steps)
            .usage_tracker(usage.clone())
            .build();
        let mentor = AgentBuilder::new(MENTOR_NAME, self.model.clone())
            .static_prompt(mentor_prompt())
            .tool(fetch_doc)
            .max_steps(self.max_steps)
            .usage_tracker(usage.clone())
            .build();

        let handoffs: Vec<Arc<dyn Tool>> = vec![
            Arc::new(HandoffTool::new(Arc::new(solver))),
            Arc::new(
                HandoffTool::new(Arc::new(mentor)).with_review(Arc::new(MentorReview::new(SOLVER_NAME))),
            ),
        ];

        let supervisor = create_supervisor(self.model, handoffs, store.clone(), self.namespace.clone())
            .max_steps(self.max_steps)
            .usage_tracker(usage.clone())
            .build();

        tracing::debug!(
            checkpointer = checkpointer.backend_name(),
            indexed = store.index_config().is_some(),
            max_steps = self.max_steps,
            "mentor app built"
        );

        Ok(MentorApp {
            supervisor,
            store,
            checkpointer,
            usage,
            namespace: self.namespace,
        })
    }
}

/// Build the app from `config` with the default embedding index
pub fn create_agent_app(config: Option<&RunnableConfig>) -> Result<MentorApp<ChatModel>> {
    create_agent_app_with(config, IndexConfig::default())
}

/// Build the app from `config`, embedding memories as `index` says.
///
/// Model settings resolve environment first, then `configurable`.
/// `recursion_limit` becomes every agent's step budget.
pub fn create_agent_app_with(
    config: Option<&RunnableConfig>,
    index: IndexConfig,
) -> Result<MentorApp<ChatModel>> {
    let configuration = Configuration::from_runnable_config(config)?;
    let model = init_chat_model(&configuration).map_err(|e| e.with_operation("app::create"))?;
    let embedder = init_embeddings(&index).map_err(|e| e.with_operation("app::create"))?;
    let store = Arc::new(InMemoryStore::with_index(index, embedder));

    let mut builder = MentorAppBuilder::new(Arc::new(model)).store(store);
    if let Some(limit) = config.and_then(|c| c.recursion_limit) {
        builder = builder.max_steps(limit);
    }
    builder.build()
}
