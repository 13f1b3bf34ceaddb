//! # Codementor Runtime
//!
//! Everything the mentor agents run on, independent of any one agent.
//!
//! ## Core Concepts
//! - **Configuration**: model provider, model and temperature, environment first
//! - **Provider**: Trait-based LLM communication (OpenAI, Anthropic, local)
//! - **Embedding**: Text vectors for semantic memory search
//! - **Store**: Namespaced memory items with similarity search
//! - **Checkpoint**: Per-thread conversation snapshots
//! - **Tool**: Functions the model can call, plus the `fetch_doc` tool

pub mod checkpoint;
pub mod config;
pub mod embedding;
pub mod error;
pub mod provider;
pub mod store;
pub mod tool;

pub use checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, Checkpointer, InMemorySaver};
pub use config::{Configuration, IndexConfig, RunnableConfig};
pub use embedding::{cosine_similarity, init_embeddings, Embedder, HashEmbedder, OpenAIEmbedder};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    init_chat_model, AnthropicProvider, ChatMessage, ChatModel, CompletionRequest,
    CompletionResponse, FinishReason, LlmProvider, OpenAIProvider, ProviderConfig, ProviderError,
    ProviderType, Role, ToolCall, ToolChoice, ToolDefinition, Usage, UsageTracker,
};
pub use store::{InMemoryStore, Item, Namespace, SearchItem, SearchQuery};
pub use tool::{FetchDocTool, Tool, ToolContext, ToolOutput, ToolRegistry};
