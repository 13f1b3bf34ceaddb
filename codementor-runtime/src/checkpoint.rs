//! # Conversation Checkpoints
//!
//! Per-thread snapshots of the conversation. Each `put` records the full
//! message history of a thread at a new step, so a later turn can resume
//! from the latest snapshot.
//!
//! Backends implement [`Checkpointer`]; the only one shipped is the volatile
//! [`InMemorySaver`].

use crate::error::{self, Result};
use crate::provider::ChatMessage;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// New input from the student
    Input,
    /// Output of an agent run
    Loop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,
    /// Agent that wrote the checkpoint, for `Loop` checkpoints
    pub writer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CheckpointMetadata {
    pub fn input() -> Self {
        Self {
            source: CheckpointSource::Input,
            writer: None,
            created_at: Utc::now(),
        }
    }

    pub fn from_loop(writer: impl Into<String>) -> Self {
        Self {
            source: CheckpointSource::Loop,
            writer: Some(writer.into()),
            created_at: Utc::now(),
        }
    }
}

/// Snapshot of a thread's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    /// 0 for the first checkpoint of a thread, +1 for each after
    pub step: u64,
    pub messages: Vec<ChatMessage>,
    pub metadata: CheckpointMetadata,
}

/// Checkpoint storage backend
pub trait Checkpointer: Send + Sync {
    /// Record a new checkpoint for `thread_id`; the backend assigns id and step
    fn put(&self, thread_id: &str, messages: Vec<ChatMessage>, metadata: CheckpointMetadata) -> Result<Checkpoint>;

    /// Latest checkpoint of a thread, if any
    fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// All checkpoints of a thread, oldest first
    fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;

    /// Ids of threads with at least one checkpoint, sorted
    fn list_threads(&self) -> Result<Vec<String>>;

    /// Drop every checkpoint of a thread
    fn delete_thread(&self, thread_id: &str) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Volatile checkpointer
#[derive(Default)]
pub struct InMemorySaver {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl InMemorySaver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checkpointer for InMemorySaver {
    fn put(&self, thread_id: &str, messages: Vec<ChatMessage>, metadata: CheckpointMetadata) -> Result<Checkpoint> {
        let mut threads = self.threads.write();
        let history = threads.entry(thread_id.to_string()).or_default();
        let step = history.last().map_or(0, |c| c.step + 1);

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            step,
            messages,
            metadata,
        };
        history.push(checkpoint.clone());

        tracing::debug!(
            thread_id,
            step,
            source = ?checkpoint.metadata.source,
            messages = checkpoint.messages.len(),
            "saved checkpoint"
        );
        Ok(checkpoint)
    }

    fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .and_then(|history| history.last().cloned()))
    }

    fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self.threads.read().get(thread_id).cloned().unwrap_or_default())
    }

    fn list_threads(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.threads.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn delete_thread(&self, thread_id: &str) -> Result<()> {
        match self.threads.write().remove(thread_id) {
            Some(_) => Ok(()),
            None => Err(error::thread_not_found(thread_id).with_operation("checkpoint::delete_thread")),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
