//! Session management
//!
//! A `Session` combines metadata and message history and keeps both in
//! sync with storage as the conversation grows.

use std::path::PathBuf;

use uuid::Uuid;

use crate::core::FrameworkResult;
use crate::llm::{Message, Usage};

use super::metadata::{SessionMetadata, SessionStats};
use super::storage::SessionStorage;

/// A conversation with its persisted history
#[derive(Debug)]
pub struct Session {
    pub metadata: SessionMetadata,
    messages: Vec<Message>,
    storage: SessionStorage,
}

impl Session {
    /// Start a new session and persist its metadata
    pub fn create(
        storage: SessionStorage,
        model: impl Into<String>,
        cwd: impl Into<PathBuf>,
    ) -> FrameworkResult<Self> {
        let metadata = SessionMetadata::new(Uuid::new_v4().to_string(), model, cwd);
        storage.save_metadata(&metadata)?;
        tracing::info!(session_id = %metadata.session_id, "Created session");

        Ok(Self {
            metadata,
            messages: Vec::new(),
            storage,
        })
    }

    /// Load an existing session from storage
    pub fn resume(storage: SessionStorage, session_id: &str) -> FrameworkResult<Self> {
        let metadata = storage.load_metadata(session_id)?;
        let messages = storage.load_messages(session_id)?;
        tracing::info!(session_id, messages = messages.len(), "Resumed session");

        Ok(Self {
            metadata,
            messages,
            storage,
        })
    }

    /// Session kept only in memory, for print mode and tests
    pub fn ephemeral(model: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        let metadata = SessionMetadata::new(Uuid::new_v4().to_string(), model, cwd);
        Self {
            metadata,
            messages: Vec::new(),
            storage: SessionStorage::with_dir(PathBuf::new()),
        }
    }

    fn is_persistent(&self) -> bool {
        !self.storage.base_dir().as_os_str().is_empty()
    }

    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn stats(&self) -> &SessionStats {
        &self.metadata.stats
    }

    /// Append messages to history and storage
    pub fn add_messages(&mut self, messages: Vec<Message>) -> FrameworkResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if self.metadata.title.is_none() {
            if let Some(first_user) = messages.iter().find(|m| m.is_user()) {
                self.metadata.set_title_from(&first_user.text());
            }
        }
        if self.is_persistent() {
            self.storage
                .append_messages(&self.metadata.session_id, &messages)?;
        }
        self.messages.extend(messages);
        self.save_metadata()
    }

    /// Replace the whole history, rewriting the history file
    pub fn replace_history(&mut self, messages: Vec<Message>) -> FrameworkResult<()> {
        if self.is_persistent() {
            self.storage
                .save_messages(&self.metadata.session_id, &messages)?;
        }
        self.messages = messages;
        self.save_metadata()
    }

    pub fn record_api_call(&mut self, usage: &Usage, duration_ms: u64) {
        self.metadata.stats.record_api_call(usage, duration_ms);
    }

    pub fn record_tool_call(&mut self) {
        self.metadata.stats.record_tool_call();
    }

    pub fn record_compaction(&mut self) {
        self.metadata.stats.record_compaction();
    }

    /// Persist metadata, bumping the updated timestamp
    pub fn save_metadata(&mut self) -> FrameworkResult<()> {
        self.metadata.touch();
        if self.is_persistent() {
            self.storage.save_metadata(&self.metadata)?;
        }
        Ok(())
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }
}
