//! Read tool for reading files
//!
//! Returns file content with line numbers. Notebooks are rendered cell by
//! cell instead of as raw JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

use super::super::file_access::check_read;
use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use super::notebook::Notebook;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::PermissionResult;

pub const READ_TOOL_NAME: &str = "Read";

/// Maximum lines to read by default
const DEFAULT_LINE_LIMIT: usize = 2000;
/// Maximum characters per line before truncation
const MAX_LINE_LENGTH: usize = 2000;

/// Read tool for reading files
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadTool;

/// Input for the read tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadInput {
    /// The path to the file to read (required)
    file_path: String,
    /// The line number to start reading from (1-indexed)
    offset: Option<usize>,
    /// The number of lines to read
    limit: Option<usize>,
}

impl ReadTool {
    pub fn new() -> Self {
        Self
    }
}

/// Format lines in `cat -n` style starting at 1-indexed `offset`
fn number_lines(content: &str, offset: Option<usize>, limit: Option<usize>) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();

    let start = offset.unwrap_or(1).saturating_sub(1);
    if start >= total_lines && total_lines > 0 {
        return format!(
            "File has {} lines. Requested offset {} is out of range.",
            total_lines,
            start + 1
        );
    }
    let end = (start + limit.unwrap_or(DEFAULT_LINE_LIMIT)).min(total_lines);

    let mut result = String::new();
    for (i, line) in lines[start..end].iter().enumerate() {
        let display_line = match line.char_indices().nth(MAX_LINE_LENGTH) {
            Some((cut, _)) => format!("{}...", &line[..cut]),
            None => line.to_string(),
        };
        result.push_str(&format!("{:>6}\t{}\n", start + i + 1, display_line));
    }

    if end < total_lines {
        result.push_str(&format!(
            "\n... ({} more lines, use offset and limit to read more)\n",
            total_lines - end
        ));
    }
    result
}

fn is_notebook(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "ipynb")
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        READ_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: READ_TOOL_NAME.to_string(),
            description: Some(
                "Reads a file from the local filesystem. \
                By default, reads up to 2000 lines. \
                You can optionally specify offset and limit for long files. \
                Results are returned with line numbers starting at 1. \
                Jupyter notebooks (.ipynb) are returned cell by cell with their outputs."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new()
                .with_properties(json!({
                    "file_path": {
                        "type": "string",
                        "description": "The absolute path to the file to read"
                    },
                    "offset": {
                        "type": "number",
                        "description": "The line number to start reading from (1-indexed). Only provide if the file is too large."
                    },
                    "limit": {
                        "type": "number",
                        "description": "The number of lines to read. Only provide if the file is too large."
                    }
                }))
                .with_required(&["file_path"]),
        }
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn description_for(&self, input: &Value) -> String {
        let file_path = input
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        format!("Read file: {}", file_path)
    }

    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()> {
        let input: ReadInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.file_path);
        if !path.exists() {
            return Err(FrameworkError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }
        if path.is_dir() {
            return Err(FrameworkError::Validation(format!(
                "{} is a directory, not a file",
                path.display()
            )));
        }
        if input.limit == Some(0) {
            return Err(FrameworkError::Validation("limit must be at least 1".into()));
        }
        Ok(())
    }

    async fn check_permissions(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> FrameworkResult<PermissionResult> {
        let input: ReadInput = parse_input(input)?;
        Ok(check_read(READ_TOOL_NAME, &ctx.resolve_path(&input.file_path), ctx))
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: ReadInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.file_path);
        tracing::info!(path = %path.display(), "Reading file");

        let content = match tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))
        {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::error(format!("{:#}", e))),
        };
        ctx.read_files.record(&path);

        if is_notebook(&path) {
            return Ok(match Notebook::parse(&content) {
                Ok(notebook) => ToolResult::success(notebook.render()),
                Err(e) => ToolResult::error(format!("Invalid notebook {}: {}", path.display(), e)),
            });
        }

        if content.is_empty() {
            return Ok(ToolResult::success(
                "<system-reminder>This file exists but has empty contents.</system-reminder>",
            ));
        }
        Ok(ToolResult::success(number_lines(
            &content,
            input.offset,
            input.limit,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionContext, PermissionMode};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> ToolContext {
        ToolContext::new(
            dir.path(),
            Arc::new(PermissionContext::new(PermissionMode::Default)),
        )
    }

    #[tokio::test]
    async fn test_read_file_numbers_lines_and_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();
        let ctx = context(&dir);

        let result = ReadTool
            .execute(&json!({ "file_path": "a.txt" }), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.output, "     1\talpha\n     2\tbeta\n     3\tgamma\n");
        assert!(ctx.read_files.check_writable(&path).is_ok());
    }

    #[test]
    fn test_offset_and_limit() {
        let content = (1..=10).map(|i| format!("line{}", i)).collect::<Vec<_>>().join("\n");
        let out = number_lines(&content, Some(4), Some(2));
        assert_eq!(out.lines().next(), Some("     4\tline4"));
        assert!(out.contains("     5\tline5"));
        assert!(!out.contains("line6\n"));
        assert!(out.contains("5 more lines"));

        let out = number_lines(&content, Some(50), None);
        assert!(out.contains("out of range"));
    }

    #[test]
    fn test_long_lines_are_truncated() {
        let line = "x".repeat(MAX_LINE_LENGTH + 10);
        let out = number_lines(&line, None, None);
        assert!(out.trim_end().ends_with("..."));
    }

    #[tokio::test]
    async fn test_validation() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let err = ReadTool
            .validate_input(&json!({ "file_path": "missing.txt" }), &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(ReadTool
            .validate_input(&json!({ "file_path": "." }), &ctx)
            .is_err());
    }

    #[tokio::test]
    async fn test_reads_notebook_cells() {
        let dir = TempDir::new().unwrap();
        let notebook = json!({
            "cells": [
                {"cell_type": "markdown", "source": ["# Title"], "metadata": {}},
                {"cell_type": "code", "source": "print(1)", "metadata": {},
                 "outputs": [{"output_type": "stream", "name": "stdout", "text": ["1\n"]}],
                 "execution_count": 1}
            ],
            "metadata": {"language_info": {"name": "python"}},
            "nbformat": 4,
            "nbformat_minor": 5
        });
        std::fs::write(dir.path().join("n.ipynb"), notebook.to_string()).unwrap();
        let ctx = context(&dir);

        let result = ReadTool
            .execute(&json!({ "file_path": "n.ipynb" }), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error, "{}", result.output);
        assert!(result.output.contains("# Title"));
        assert!(result.output.contains("print(1)"));
        assert!(result.output.contains("1\n"));
    }

    #[tokio::test]
    async fn test_outside_cwd_asks() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let path = other.path().join("x.txt");
        let ctx = context(&dir);
        let result = ReadTool
            .check_permissions(&json!({ "file_path": path.to_string_lossy() }), &ctx)
            .await
            .unwrap();
        assert!(result.is_ask());
    }
}
