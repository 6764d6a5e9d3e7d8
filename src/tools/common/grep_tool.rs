//! Grep tool for content search using ripgrep

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::super::file_access::check_read;
use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::PermissionResult;

pub const GREP_TOOL_NAME: &str = "Grep";

/// Lines returned when no head_limit is given
const DEFAULT_HEAD_LIMIT: usize = 250;

/// Grep tool for content search
#[derive(Debug, Default, Clone, Copy)]
pub struct GrepTool;

/// Output mode for grep results
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
enum OutputMode {
    Content,
    #[default]
    FilesWithMatches,
    Count,
}

/// Input for the grep tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GrepInput {
    /// The regex pattern to search for (required)
    pattern: String,
    /// File or directory to search in
    path: Option<String>,
    /// Glob pattern to filter files
    glob: Option<String>,
    output_mode: Option<OutputMode>,
    #[serde(rename = "-B")]
    before_context: Option<u32>,
    #[serde(rename = "-A")]
    after_context: Option<u32>,
    #[serde(rename = "-C")]
    context: Option<u32>,
    #[serde(rename = "-n")]
    line_numbers: Option<bool>,
    #[serde(rename = "-i")]
    case_insensitive: Option<bool>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    /// Limit output lines, 0 for unlimited
    head_limit: Option<usize>,
    /// Skip first N entries
    offset: Option<usize>,
    multiline: Option<bool>,
}

impl GrepTool {
    pub fn new() -> Self {
        Self
    }
}

fn search_path(input: &GrepInput, ctx: &ToolContext) -> PathBuf {
    match &input.path {
        Some(path) => ctx.resolve_path(path),
        None => ctx.cwd.clone(),
    }
}

/// ripgrep arguments for `input`, ending with the pattern and path
fn rg_args(input: &GrepInput, path: &str) -> Vec<String> {
    let output_mode = input.output_mode.unwrap_or_default();
    let mut args: Vec<String> = vec!["--color=never".into(), "--hidden".into()];

    match output_mode {
        OutputMode::FilesWithMatches => args.push("-l".into()),
        OutputMode::Count => args.push("-c".into()),
        OutputMode::Content => {
            if input.line_numbers.unwrap_or(true) {
                args.push("-n".into());
            }
            for (flag, value) in [
                ("-B", input.before_context),
                ("-A", input.after_context),
                ("-C", input.context),
            ] {
                if let Some(n) = value {
                    args.push(flag.into());
                    args.push(n.to_string());
                }
            }
        }
    }

    if input.case_insensitive.unwrap_or(false) {
        args.push("-i".into());
    }
    if let Some(ft) = &input.file_type {
        args.push("--type".into());
        args.push(ft.clone());
    }
    if let Some(g) = &input.glob {
        args.push("--glob".into());
        args.push(g.clone());
    }
    if input.multiline.unwrap_or(false) {
        args.push("-U".into());
        args.push("--multiline-dotall".into());
    }

    // Keep VCS directories out of results
    args.push("--glob".into());
    args.push("!.git".into());

    args.push("-e".into());
    args.push(input.pattern.clone());
    args.push(path.into());
    args
}

/// Apply offset and head_limit to result lines
fn paginate(stdout: &str, offset: Option<usize>, head_limit: Option<usize>) -> (Vec<&str>, bool) {
    let mut lines: Vec<&str> = stdout.lines().skip(offset.unwrap_or(0)).collect();
    let limit = head_limit.unwrap_or(DEFAULT_HEAD_LIMIT);
    let truncated = limit > 0 && lines.len() > limit;
    if truncated {
        lines.truncate(limit);
    }
    (lines, truncated)
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        GREP_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GREP_TOOL_NAME.to_string(),
            description: Some(
                "A powerful search tool built on ripgrep. \
                Supports full regex syntax. Filter files with the glob or type parameter. \
                Output modes: \"content\" shows matching lines, \"files_with_matches\" shows only file paths (default), \"count\" shows match counts."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new().with_properties(json!({
                "pattern": {
                    "type": "string",
                    "description": "The regular expression pattern to search for in file contents"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in. Defaults to the current working directory."
                },
                "glob": {
                    "type": "string",
                    "description": "Glob pattern to filter files (e.g. \"*.js\", \"*.{ts,tsx}\")"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output mode. Defaults to \"files_with_matches\"."
                },
                "-B": { "type": "number", "description": "Lines to show before each match (content mode)" },
                "-A": { "type": "number", "description": "Lines to show after each match (content mode)" },
                "-C": { "type": "number", "description": "Lines to show around each match (content mode)" },
                "-n": { "type": "boolean", "description": "Show line numbers (content mode). Defaults to true." },
                "-i": { "type": "boolean", "description": "Case insensitive search" },
                "type": { "type": "string", "description": "File type to search (rg --type), e.g. js, py, rust" },
                "head_limit": { "type": "number", "description": "Limit output to the first N lines. Defaults to 250, 0 for unlimited." },
                "offset": { "type": "number", "description": "Skip the first N lines before applying head_limit" },
                "multiline": { "type": "boolean", "description": "Enable multiline mode where . matches newlines" }
            }))
            .with_required(&["pattern"]),
        }
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn description_for(&self, input: &Value) -> String {
        let pattern = input.get("pattern").and_then(|v| v.as_str()).unwrap_or("?");
        match input.get("path").and_then(|v| v.as_str()) {
            Some(path) => format!("Search for \"{}\" in {}", pattern, path),
            None => format!("Search for \"{}\"", pattern),
        }
    }

    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()> {
        let input: GrepInput = parse_input(input)?;
        let path = search_path(&input, ctx);
        if !path.exists() {
            return Err(FrameworkError::Validation(format!(
                "Path does not exist: {}",
                path.display()
            )));
        }
        Ok(())
    }

    async fn check_permissions(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> FrameworkResult<PermissionResult> {
        let input: GrepInput = parse_input(input)?;
        let path = search_path(&input, ctx);
        let target = if path.is_dir() { path.join("*") } else { path };
        Ok(check_read(GREP_TOOL_NAME, &target, ctx))
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: GrepInput = parse_input(input)?;
        let path = search_path(&input, ctx);
        let args = rg_args(&input, &path.to_string_lossy());
        tracing::info!(pattern = %input.pattern, path = %path.display(), "Running ripgrep");

        let child = match Command::new("rg")
            .args(&args)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Failed to run ripgrep (is `rg` installed?): {}",
                    e
                )))
            }
        };

        let output = tokio::select! {
            _ = ctx.abort.cancelled() => return Err(FrameworkError::Aborted.into()),
            output = child.wait_with_output() => output?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.is_empty() {
            if output.status.code() == Some(1) {
                return Ok(ToolResult::success(format!(
                    "No matches found for pattern: {}",
                    input.pattern
                )));
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ToolResult::error(format!("Search error: {}", stderr.trim())));
        }

        // Report paths relative to the working directory
        let prefix = format!("{}/", ctx.cwd.display());
        let relative = stdout.replace(&prefix, "");
        let (lines, truncated) = paginate(&relative, input.offset, input.head_limit);
        let mut result = lines.join("\n");
        if truncated {
            result.push_str("\n\n(Results truncated. Use offset or a narrower pattern to see more.)");
        }
        Ok(ToolResult::success(result))
    }
}
