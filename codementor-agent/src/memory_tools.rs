//! Memory tools for the supervisor
//!
//! `manage_memory` creates, updates and deletes memories; `search_memory`
//! searches them. Both are bound to one store namespace.

use crate::hints::strip_review_notes;
use async_trait::async_trait;
use codementor_error::{Error, Result};
use codementor_runtime::error::memory_not_found;
use codementor_runtime::{InMemoryStore, Namespace, SearchQuery, Tool, ToolContext, ToolDefinition};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Namespace the mentor app keeps hint batches in
pub fn memories_namespace() -> Namespace {
    Namespace::from(["memories"])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MemoryAction {
    #[default]
    Create,
    Update,
    Delete,
}

#[derive(Debug, Deserialize)]
struct ManageMemoryArgs {
    #[serde(default)]
    action: MemoryAction,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

pub struct ManageMemoryTool {
    store: Arc<InMemoryStore>,
    namespace: Namespace,
}

impl ManageMemoryTool {
    pub fn new(store: Arc<InMemoryStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }
}

fn required(value: Option<String>, field: &str, action: &str) -> Result<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        Error::invalid_argument(format!("'{}' is required to {} a memory", field, action))
            .with_operation("manage_memory::call")
    })
}

#[async_trait]
impl Tool for ManageMemoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "manage_memory",
            "Create, update, or delete a persistent memory. Store hint batches verbatim; \
             pass the memory id to update or delete an existing one.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "update", "delete"],
                    "description": "What to do (default: create)"
                },
                "content": {
                    "type": "string",
                    "description": "Memory text, required for create and update"
                },
                "id": {
                    "type": "string",
                    "description": "Memory id, required for update and delete"
                }
            },
            "required": []
        }))
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: ManageMemoryArgs = serde_json::from_value(args).map_err(|e| {
            Error::invalid_argument(format!("invalid manage_memory arguments: {}", e))
                .with_operation("manage_memory::call")
        })?;

        match args.action {
            MemoryAction::Create => {
                let content = required(args.content.as_deref().map(strip_review_notes), "content", "create")?;
                let id = uuid::Uuid::new_v4().to_string();
                self.store
                    .put(&self.namespace, &id, json!({ "content": content }))
                    .await?;
                tracing::info!(namespace = %self.namespace, id = %id, chars = content.len(), "memory created");
                Ok(format!("created memory {}", id))
            }
            MemoryAction::Update => {
                let id = required(args.id, "id", "update")?;
                let content = required(args.content.as_deref().map(strip_review_notes), "content", "update")?;
                if self.store.get(&self.namespace, &id).is_none() {
                    return Err(memory_not_found(&self.namespace.to_string(), id)
                        .with_operation("manage_memory::call"));
                }
                self.store
                    .put(&self.namespace, &id, json!({ "content": content }))
                    .await?;
                tracing::info!(namespace = %self.namespace, id = %id, "memory updated");
                Ok(format!("updated memory {}", id))
            }
            MemoryAction::Delete => {
                let id = required(args.id, "id", "delete")?;
                self.store.delete(&self.namespace, &id);
                tracing::info!(namespace = %self.namespace, id = %id, "memory deleted");
                Ok(format!("deleted memory {}", id))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchMemoryArgs {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    10
}

pub struct SearchMemoryTool {
    store: Arc<InMemoryStore>,
    namespace: Namespace,
}

impl SearchMemoryTool {
    pub fn new(store: Arc<InMemoryStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "search_memory",
            "Search stored memories by meaning. Returns matching memories with their ids.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for" },
                "limit": { "type": "integer", "description": "Maximum results (default 10)" },
                "offset": { "type": "integer", "description": "Results to skip (default 0)" }
            },
            "required": ["query"]
        }))
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: SearchMemoryArgs = serde_json::from_value(args).map_err(|e| {
            Error::invalid_argument(format!("invalid search_memory arguments: {}", e))
                .with_operation("search_memory::call")
        })?;

        let query = SearchQuery::new(args.query)
            .with_limit(args.limit)
            .with_offset(args.offset);
        let hits = self.store.search(&self.namespace, query).await?;

        let results: Vec<Value> = hits
            .into_iter()
            .map(|hit| {
                json!({
                    "key": hit.item.key,
                    "value": hit.item.value,
                    "score": hit.score,
                })
            })
            .collect();

        tracing::debug!(namespace = %self.namespace, results = results.len(), "memory search");
        serde_json::to_string(&results).map_err(|e| {
            Error::serialization_failed("failed to encode search results")
                .with_operation("search_memory::call")
                .set_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codementor_error::ErrorKind;
    use codementor_runtime::{HashEmbedder, IndexConfig};

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_index(
            IndexConfig::new(64, "hash:bow"),
            Arc::new(HashEmbedder::new(64)),
        ))
    }

    fn created_id(result: &str) -> String {
        result.trim_start_matches("created memory ").to_string()
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let store = store();
        let tool = ManageMemoryTool::new(store.clone(), memories_namespace());
        let ctx = ToolContext::default();

        let created = tool.call(json!({"content": "1. Think about bounds"}), &ctx).await.unwrap();
        assert!(created.starts_with("created memory "));
        let id = created_id(&created);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(store.get(&memories_namespace(), &id).unwrap().content_text(), "1. Think about bounds");

        let updated = tool
            .call(json!({"action": "update", "id": id, "content": "1. Think about ranges"}), &ctx)
            .await
            .unwrap();
        assert_eq!(updated, format!("updated memory {}", id));
        assert_eq!(store.get(&memories_namespace(), &id).unwrap().content_text(), "1. Think about ranges");

        let deleted = tool.call(json!({"action": "delete", "id": id}), &ctx).await.unwrap();
        assert_eq!(deleted, format!("deleted memory {}", id));
        assert!(store.get(&memories_namespace(), &id).is_none());
    }

    #[tokio::test]
    async fn test_review_notes_are_not_stored() {
        let store = store();
        let tool = ManageMemoryTool::new(store.clone(), memories_namespace());
        let ctx = ToolContext::default();

        let content = "1. Think about bounds\n2. Trace the loop\n\n[hint review] expected 5 numbered hints, found 2.";
        let created = tool.call(json!({"content": content}), &ctx).await.unwrap();
        let stored = store.get(&memories_namespace(), &created_id(&created)).unwrap();
        assert_eq!(stored.content_text(), "1. Think about bounds\n2. Trace the loop");

        // a note on its own is nothing to store
        let err = tool
            .call(json!({"content": "[hint review] 1 line(s) of solution code appear verbatim."}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_missing_arguments() {
        let tool = ManageMemoryTool::new(store(), memories_namespace());
        let ctx = ToolContext::default();

        let err = tool.call(json!({"action": "create"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = tool.call(json!({"action": "update", "content": "x"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = tool.call(json!({"action": "delete"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = tool.call(json!({"action": "update", "id": "nope", "content": "x"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = tool.call(json!({"action": "archive", "content": "x"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_search_memory() {
        let store = store();
        let manage = ManageMemoryTool::new(store.clone(), memories_namespace());
        let search = SearchMemoryTool::new(store.clone(), memories_namespace());
        let ctx = ToolContext::default();

        manage.call(json!({"content": "Hints about recursion base cases"}), &ctx).await.unwrap();
        manage.call(json!({"content": "Hints about off by one loop bounds"}), &ctx).await.unwrap();

        let out = search.call(json!({"query": "loop bounds", "limit": 1}), &ctx).await.unwrap();
        let results: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["value"]["content"], "Hints about off by one loop bounds");
        assert!(results[0]["score"].as_f64().is_some());

        let out = search.call(json!({"query": "anything", "offset": 5}), &ctx).await.unwrap();
        assert_eq!(out, "[]");

        let err = search.call(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
