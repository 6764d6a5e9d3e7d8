//! Session metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::Usage;

/// Usage statistics accumulated over a session
///
/// Also written to the local settings file as `lastSession` when the
/// session ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    /// Model calls made, including retries after a fallback swap
    #[serde(default)]
    pub api_calls: u64,
    /// Wall-clock time spent waiting on the API
    #[serde(default)]
    pub api_duration_ms: u64,
    #[serde(default)]
    pub tool_calls: u64,
    #[serde(default)]
    pub compactions: u64,
}

impl SessionStats {
    /// Account for one completed model call
    pub fn record_api_call(&mut self, usage: &Usage, duration_ms: u64) {
        self.api_calls += 1;
        self.api_duration_ms += duration_ms;
        self.input_tokens += u64::from(usage.input_tokens);
        self.output_tokens += u64::from(usage.output_tokens);
        self.cache_creation_input_tokens += u64::from(usage.cache_creation_input_tokens.unwrap_or(0));
        self.cache_read_input_tokens += u64::from(usage.cache_read_input_tokens.unwrap_or(0));
    }

    pub fn record_tool_call(&mut self) {
        self.tool_calls += 1;
    }

    pub fn record_compaction(&mut self) {
        self.compactions += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }
}

/// Metadata for a session
///
/// This is persisted separately from the message history for quick access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Unique session ID
    pub session_id: String,

    /// Model the session started with
    pub model: String,

    /// Working directory the session ran in
    #[serde(default)]
    pub cwd: PathBuf,

    /// First line of the first prompt, for listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub stats: SessionStats,
}

impl SessionMetadata {
    pub fn new(session_id: impl Into<String>, model: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            model: model.into(),
            cwd: cwd.into(),
            title: None,
            created_at: now,
            updated_at: now,
            stats: SessionStats::default(),
        }
    }

    /// Update the updated_at timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Set the title from a prompt unless one is already set
    pub fn set_title_from(&mut self, prompt: &str) {
        if self.title.is_some() {
            return;
        }
        let first_line = prompt.lines().map(str::trim).find(|l| !l.is_empty());
        if let Some(line) = first_line {
            let title: String = line.chars().take(80).collect();
            self.title = Some(title);
        }
    }
}
