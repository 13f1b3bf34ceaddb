//! # Memory Store
//!
//! Namespaced key-value store with optional semantic search.
//! Volatile: contents live as long as the process.
//!
//! With an index configured, every `put` embeds the item's text and `search`
//! ranks items by cosine similarity to the query.

use crate::config::IndexConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Hierarchical namespace path, e.g. `("memories",)` or `("memories", "t-1")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    /// True if `prefix` is a leading path of this namespace
    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl<const N: usize> From<[&str; N]> for Namespace {
    fn from(labels: [&str; N]) -> Self {
        Self::new(labels)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// A stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// The text this item stands for: `value["content"]` when it is a string,
    /// otherwise the JSON rendering of the whole value.
    pub fn content_text(&self) -> String {
        content_text(&self.value)
    }
}

fn content_text(value: &Value) -> String {
    match value.get("content") {
        Some(Value::String(s)) => s.clone(),
        _ => value.to_string(),
    }
}

/// A search hit. `score` is `None` when no similarity ranking was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(flatten)]
    pub item: Item,
    pub score: Option<f32>,
}

/// Search parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: None,
            limit: 10,
            offset: 0,
        }
    }
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

struct Entry {
    item: Item,
    embedding: Option<Vec<f32>>,
    seq: u64,
}

struct Index {
    config: IndexConfig,
    embedder: Arc<dyn Embedder>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Namespace, HashMap<String, Entry>>,
    next_seq: u64,
}

/// In-process store shared between the app and its tools
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    index: Option<Index>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// A store without semantic search
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            index: None,
        }
    }

    /// A store that embeds every item with `embedder`
    pub fn with_index(config: IndexConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            index: Some(Index { config, embedder }),
        }
    }

    pub fn index_config(&self) -> Option<&IndexConfig> {
        self.index.as_ref().map(|i| &i.config)
    }

    /// Insert or replace an item. `created_at` survives replacement.
    pub async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<()> {
        let embedding = match &self.index {
            Some(index) => {
                let vector = index
                    .embedder
                    .embed_query(&content_text(&value))
                    .await
                    .map_err(|e| e.with_operation("store::put"))?;
                check_dims(index.config.dims, &vector)?;
                Some(vector)
            }
            None => None,
        };

        let now = Utc::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let seq = inner.next_seq;
        let items = inner.entries.entry(namespace.clone()).or_default();

        match items.get_mut(key) {
            Some(entry) => {
                entry.item.value = value;
                entry.item.updated_at = now;
                entry.embedding = embedding;
            }
            None => {
                items.insert(
                    key.to_string(),
                    Entry {
                        item: Item {
                            namespace: namespace.clone(),
                            key: key.to_string(),
                            value,
                            created_at: now,
                            updated_at: now,
                        },
                        embedding,
                        seq,
                    },
                );
                inner.next_seq += 1;
            }
        }

        tracing::debug!(namespace = %namespace, key, "stored item");
        Ok(())
    }

    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<Item> {
        self.inner
            .read()
            .entries
            .get(namespace)
            .and_then(|items| items.get(key))
            .map(|e| e.item.clone())
    }

    /// Remove an item. Missing keys are ignored.
    pub fn delete(&self, namespace: &Namespace, key: &str) {
        let mut inner = self.inner.write();
        if let Some(items) = inner.entries.get_mut(namespace) {
            items.remove(key);
            if items.is_empty() {
                inner.entries.remove(namespace);
            }
        }
    }

    /// All namespaces holding at least one item, sorted
    pub fn list_namespaces(&self) -> Vec<Namespace> {
        let mut namespaces: Vec<Namespace> = self.inner.read().entries.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Number of items under `prefix`
    pub fn count(&self, prefix: &Namespace) -> usize {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|(ns, _)| ns.starts_with(prefix))
            .map(|(_, items)| items.len())
            .sum()
    }

    /// Search items whose namespace starts with `prefix`.
    ///
    /// Ranked by similarity when there is a query and an index, otherwise in
    /// insertion order. `limit`/`offset` apply after ordering.
    pub async fn search(&self, prefix: &Namespace, query: SearchQuery) -> Result<Vec<SearchItem>> {
        let query_vector = match (&self.index, query.query.as_deref()) {
            (Some(index), Some(text)) => {
                let vector = index
                    .embedder
                    .embed_query(text)
                    .await
                    .map_err(|e| e.with_operation("store::search"))?;
                check_dims(index.config.dims, &vector)?;
                Some(vector)
            }
            _ => None,
        };

        let mut hits: Vec<(u64, SearchItem)> = {
            let inner = self.inner.read();
            inner
                .entries
                .iter()
                .filter(|(ns, _)| ns.starts_with(prefix))
                .flat_map(|(_, items)| items.values())
                .map(|entry| {
                    let score = match (&query_vector, &entry.embedding) {
                        (Some(q), Some(e)) => Some(cosine_similarity(q, e)),
                        (Some(_), None) => Some(0.0),
                        _ => None,
                    };
                    (entry.seq, SearchItem { item: entry.item.clone(), score })
                })
                .collect()
        };

        hits.sort_by_key(|(seq, _)| *seq);
        if query_vector.is_some() {
            // stable: equal scores keep insertion order
            hits.sort_by(|(_, a), (_, b)| {
                b.score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Ok(hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(_, hit)| hit)
            .collect())
    }
}

fn check_dims(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::dimension_mismatch(expected, vector.len()).with_operation("store::embed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use serde_json::json;

    fn memories() -> Namespace {
        Namespace::from(["memories"])
    }

    fn indexed_store() -> InMemoryStore {
        InMemoryStore::with_index(IndexConfig::new(128, "hash:bow"), Arc::new(HashEmbedder::new(128)))
    }

    struct FixedEmbedder(usize);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn dims(&self) -> usize {
            self.0
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        let ns = memories();

        store.put(&ns, "a", json!({"content": "hint one"})).await.unwrap();
        let item = store.get(&ns, "a").unwrap();
        assert_eq!(item.content_text(), "hint one");
        assert_eq!(item.namespace, ns);

        store.delete(&ns, "a");
        assert!(store.get(&ns, "a").is_none());
        // deleting again is fine
        store.delete(&ns, "a");
        assert!(store.list_namespaces().is_empty());
    }

    #[tokio::test]
    async fn test_replace_preserves_created_at() {
        let store = InMemoryStore::new();
        let ns = memories();

        store.put(&ns, "a", json!({"content": "v1"})).await.unwrap();
        let first = store.get(&ns, "a").unwrap();
        store.put(&ns, "a", json!({"content": "v2"})).await.unwrap();
        let second = store.get(&ns, "a").unwrap();

        assert_eq!(second.content_text(), "v2");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.count(&ns), 1);
    }

    #[test]
    fn test_content_text_fallback() {
        assert_eq!(content_text(&json!({"content": "plain"})), "plain");
        assert_eq!(content_text(&json!({"content": 3})), r#"{"content":3}"#);
        assert_eq!(content_text(&json!("bare")), r#""bare""#);
    }

    #[tokio::test]
    async fn test_search_without_index_uses_insertion_order() {
        let store = InMemoryStore::new();
        let ns = memories();
        for key in ["first", "second", "third"] {
            store.put(&ns, key, json!({"content": key})).await.unwrap();
        }

        let hits = store.search(&ns, SearchQuery::new("third")).await.unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.item.key.as_str()).collect();
        assert_eq!(keys, ["first", "second", "third"]);
        assert!(hits.iter().all(|h| h.score.is_none()));

        let page = store
            .search(&ns, SearchQuery::default().with_offset(1).with_limit(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].item.key, "second");
    }

    #[tokio::test]
    async fn test_semantic_search_ranks_by_similarity() {
        let store = indexed_store();
        let ns = memories();
        store
            .put(&ns, "loops", json!({"content": "Hint: check the loop bounds, an off by one error hides there"}))
            .await
            .unwrap();
        store
            .put(&ns, "recursion", json!({"content": "Hint: what is the base case of your recursion?"}))
            .await
            .unwrap();

        let hits = store
            .search(&ns, SearchQuery::new("my recursion never reaches a base case"))
            .await
            .unwrap();
        assert_eq!(hits[0].item.key, "recursion");
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryStore::with_index(IndexConfig::new(4, "fixed"), Arc::new(FixedEmbedder(4)));
        let ns = memories();
        for key in ["a", "b", "c"] {
            store.put(&ns, key, json!({"content": key})).await.unwrap();
        }
        let hits = store.search(&ns, SearchQuery::new("anything")).await.unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.item.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_namespace_prefix_search() {
        let store = InMemoryStore::new();
        store.put(&Namespace::from(["memories", "t-1"]), "a", json!({"content": "x"})).await.unwrap();
        store.put(&Namespace::from(["memories", "t-2"]), "b", json!({"content": "y"})).await.unwrap();
        store.put(&Namespace::from(["other"]), "c", json!({"content": "z"})).await.unwrap();

        let hits = store.search(&memories(), SearchQuery::default()).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(store.list_namespaces().len(), 3);
        assert_eq!(store.count(&memories()), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_stores_nothing() {
        let store = InMemoryStore::with_index(IndexConfig::new(1536, "fixed"), Arc::new(FixedEmbedder(3)));
        let ns = memories();

        let err = store.put(&ns, "a", json!({"content": "hint"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(store.get(&ns, "a").is_none());
    }

    #[test]
    fn test_namespace_display() {
        assert_eq!(Namespace::from(["memories", "t-1"]).to_string(), "(memories, t-1)");
        assert!(Namespace::from(["memories", "t-1"]).starts_with(&memories()));
        assert!(!memories().starts_with(&Namespace::from(["memories", "t-1"])));
    }
}
