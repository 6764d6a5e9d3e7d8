//! Session storage helpers
//!
//! Each session lives in `<base>/<session_id>/` with `metadata.json` and an
//! append-only `history.jsonl`. Compaction rewrites the history file.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::PROJECT_DIR;
use crate::core::error::FrameworkError;
use crate::core::FrameworkResult;
use crate::llm::Message;

use super::metadata::SessionMetadata;

const SESSIONS_DIR: &str = "sessions";
const METADATA_FILE: &str = "metadata.json";
const HISTORY_FILE: &str = "history.jsonl";

/// Session storage manager
#[derive(Debug, Clone)]
pub struct SessionStorage {
    base_dir: PathBuf,
}

impl SessionStorage {
    /// Storage under `$HOME/.codewright/sessions`, or the working directory without a home
    pub fn new() -> Self {
        let root = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_dir(root.join(PROJECT_DIR).join(SESSIONS_DIR))
    }

    /// Create a new session storage with a custom directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
        }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(session_id)
    }

    pub fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(METADATA_FILE)
    }

    pub fn history_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(HISTORY_FILE)
    }

    /// Create the session directory if it doesn't exist
    pub fn ensure_session_dir(&self, session_id: &str) -> FrameworkResult<PathBuf> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn save_metadata(&self, metadata: &SessionMetadata) -> FrameworkResult<()> {
        self.ensure_session_dir(&metadata.session_id)?;
        let path = self.metadata_path(&metadata.session_id);

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, metadata)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_metadata(&self, session_id: &str) -> FrameworkResult<SessionMetadata> {
        let path = self.metadata_path(session_id);
        if !path.exists() {
            return Err(FrameworkError::SessionNotFound(session_id.to_string()));
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Append messages to the history file
    pub fn append_messages(&self, session_id: &str, messages: &[Message]) -> FrameworkResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.ensure_session_dir(session_id)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path(session_id))?;
        let mut writer = BufWriter::new(file);
        for message in messages {
            writeln!(writer, "{}", serde_json::to_string(message)?)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load all messages from the history file
    ///
    /// A truncated final line (from a crash mid-write) is skipped.
    pub fn load_messages(&self, session_id: &str) -> FrameworkResult<Vec<Message>> {
        let path = self.history_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let lines: Vec<String> = BufReader::new(File::open(&path)?)
            .lines()
            .collect::<Result<_, _>>()?;
        let last = lines.len().saturating_sub(1);

        let mut messages = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(message) => messages.push(message),
                Err(e) if i == last => {
                    tracing::warn!(session_id, error = %e, "Skipping truncated history line");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(messages)
    }

    /// Replace the whole history
    pub fn save_messages(&self, session_id: &str, messages: &[Message]) -> FrameworkResult<()> {
        self.ensure_session_dir(session_id)?;
        let path = self.history_path(session_id);
        let tmp = path.with_extension("jsonl.tmp");

        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for message in messages {
                writeln!(writer, "{}", serde_json::to_string(message)?)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn session_exists(&self, session_id: &str) -> bool {
        self.metadata_path(session_id).exists()
    }

    /// All sessions, most recently updated first
    pub fn list_sessions(&self) -> FrameworkResult<Vec<SessionMetadata>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            let Some(id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_dir() || !self.session_exists(id) {
                continue;
            }
            match self.load_metadata(id) {
                Ok(meta) => sessions.push(meta),
                Err(e) => tracing::warn!(session_id = id, error = %e, "Unreadable session metadata"),
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Most recently updated session, optionally restricted to a working directory
    pub fn latest_session(&self, cwd: Option<&Path>) -> FrameworkResult<Option<SessionMetadata>> {
        Ok(self
            .list_sessions()?
            .into_iter()
            .find(|meta| cwd.map_or(true, |dir| meta.cwd == dir)))
    }

    pub fn delete_session(&self, session_id: &str) -> FrameworkResult<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Default for SessionStorage {
    fn default() -> Self {
        Self::new()
    }
}
