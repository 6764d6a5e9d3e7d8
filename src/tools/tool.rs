//! Tool trait definition
//!
//! All tools implement this trait to provide a consistent interface to the
//! turn loop: a schema for the model, a validation step, a permission check
//! and the execution itself.

use anyhow::Result;
use async_trait::async_trait;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

use crate::core::FrameworkResult;
use crate::llm::ToolDefinition;
use crate::permissions::{
    HeuristicPrefixDetector, PermissionContext, PermissionResult, PrefixDetector,
};

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output of the tool
    pub output: String,
    /// Whether the tool execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }
}

/// Modification times of files the model has read
///
/// Write and Edit refuse to touch an existing file that was not read, or
/// that changed on disk after it was read.
#[derive(Debug, Default)]
pub struct ReadFileState {
    files: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl ReadFileState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the current modification time of `path`
    pub fn record(&self, path: &Path) {
        if let Some(mtime) = modified_time(path) {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_path_buf(), mtime);
        }
    }

    /// Forget `path`
    pub fn forget(&self, path: &Path) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Check that an existing file may be overwritten
    pub fn check_writable(&self, path: &Path) -> std::result::Result<(), String> {
        if !path.exists() {
            return Ok(());
        }
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(read_at) = files.get(path) else {
            return Err("File has not been read yet. Read it first before writing to it.".into());
        };
        match modified_time(path) {
            Some(mtime) if mtime > *read_at => Err(
                "File has been modified since read, either by the user or by a linter. \
                 Read it again before attempting to write it."
                    .into(),
            ),
            _ => Ok(()),
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Everything a tool needs from the session it runs in
#[derive(Clone)]
pub struct ToolContext {
    /// Working directory of the session
    pub cwd: PathBuf,
    /// Cancelled when the user interrupts the turn
    pub abort: CancellationToken,
    pub permissions: Arc<PermissionContext>,
    pub prefix_detector: Arc<dyn PrefixDetector>,
    pub read_files: Arc<ReadFileState>,
}

impl ToolContext {
    pub fn new(cwd: impl Into<PathBuf>, permissions: Arc<PermissionContext>) -> Self {
        Self {
            cwd: cwd.into(),
            abort: CancellationToken::new(),
            permissions,
            prefix_detector: Arc::new(HeuristicPrefixDetector::new()),
            read_files: Arc::new(ReadFileState::new()),
        }
    }

    pub fn with_prefix_detector(mut self, detector: Arc<dyn PrefixDetector>) -> Self {
        self.prefix_detector = detector;
        self
    }

    /// Same context bound to another abort token
    pub fn with_abort(&self, abort: CancellationToken) -> Self {
        Self {
            abort,
            ..self.clone()
        }
    }

    /// Resolve a possibly relative path against the working directory
    ///
    /// `.` and `..` components are resolved lexically.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.cwd.join(path).clean()
    }
}

/// Trait for tools that the agent can use
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the name of this tool
    fn name(&self) -> &str;

    /// Get the tool definition for the Messages API
    fn definition(&self) -> ToolDefinition;

    /// Whether the tool never modifies anything
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether the tool may run alongside other concurrency-safe tools
    fn is_concurrency_safe(&self) -> bool {
        self.is_read_only()
    }

    /// One-line description of what this invocation does, for prompts
    fn description_for(&self, input: &Value) -> String;

    /// Reject malformed input before permissions are checked
    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()>;

    /// Decide whether this invocation may run
    async fn check_permissions(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> FrameworkResult<PermissionResult>;

    /// Execute the tool with the given input
    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult>;
}
