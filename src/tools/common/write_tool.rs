//! Write tool for creating/writing files

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

use super::super::file_access::check_edit;
use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::PermissionResult;

pub const WRITE_TOOL_NAME: &str = "Write";

/// Write tool for creating files
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteTool;

/// Input for the write tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteInput {
    /// The path to the file to write (required)
    file_path: String,
    /// The content to write to the file (required)
    content: String,
}

impl WriteTool {
    pub fn new() -> Self {
        Self
    }
}

/// Write `content`, creating parent directories. Returns whether the file existed.
pub(crate) async fn write_file(path: &Path, content: &str) -> Result<bool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let existed = path.exists();
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(existed)
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        WRITE_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: WRITE_TOOL_NAME.to_string(),
            description: Some(
                "Writes a file to the local filesystem. \
                This tool will overwrite the existing file if there is one at the provided path. \
                If this is an existing file, you MUST use the Read tool first to read the file's contents."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new()
                .with_properties(json!({
                    "file_path": {
                        "type": "string",
                        "description": "The absolute path to the file to write (must be absolute, not relative)"
                    },
                    "content": {
                        "type": "string",
                        "description": "The content to write to the file"
                    }
                }))
                .with_required(&["file_path", "content"]),
        }
    }

    fn description_for(&self, input: &Value) -> String {
        let file_path = input
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        format!("Write file: {}", file_path)
    }

    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()> {
        let input: WriteInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.file_path);
        if path.is_dir() {
            return Err(FrameworkError::Validation(format!(
                "{} is a directory",
                path.display()
            )));
        }
        ctx.read_files
            .check_writable(&path)
            .map_err(FrameworkError::Validation)
    }

    async fn check_permissions(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> FrameworkResult<PermissionResult> {
        let input: WriteInput = parse_input(input)?;
        Ok(check_edit(WRITE_TOOL_NAME, &ctx.resolve_path(&input.file_path), ctx))
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: WriteInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.file_path);
        tracing::info!(path = %path.display(), bytes = input.content.len(), "Writing file");

        match write_file(&path, &input.content).await {
            Ok(existed) => {
                ctx.read_files.record(&path);
                let verb = if existed { "updated" } else { "created" };
                Ok(ToolResult::success(format!(
                    "File {} successfully at: {}",
                    verb, input.file_path
                )))
            }
            Err(e) => Ok(ToolResult::error(format!("{:#}", e))),
        }
    }
}
