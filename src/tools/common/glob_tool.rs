//! Glob tool for file pattern matching

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::super::file_access::check_read;
use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::PermissionResult;

pub const GLOB_TOOL_NAME: &str = "Glob";

/// Maximum number of paths returned
const MAX_RESULTS: usize = 100;

/// Glob tool for file pattern matching
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobTool;

/// Input for the glob tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GlobInput {
    /// The glob pattern to match files against (required)
    pattern: String,
    /// The directory to search in (optional)
    path: Option<String>,
}

impl GlobTool {
    pub fn new() -> Self {
        Self
    }
}

fn search_dir(input: &GlobInput, ctx: &ToolContext) -> PathBuf {
    match &input.path {
        Some(path) => ctx.resolve_path(path),
        None => ctx.cwd.clone(),
    }
}

/// Paths matching `pattern` under `base`, most recently modified first.
/// Returns whether the list was truncated.
fn search(pattern: &str, base: &Path, cwd: &Path) -> Result<(Vec<String>, bool)> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("{}/{}", base.display(), pattern)
    };
    tracing::debug!(pattern = %full_pattern, "Glob search");

    let mut entries: Vec<(String, SystemTime)> = glob::glob(&full_pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let mtime = path.metadata().ok()?.modified().ok()?;
            let display = path
                .strip_prefix(cwd)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| path.to_string_lossy().into_owned());
            Some((display, mtime))
        })
        .collect();

    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let truncated = entries.len() > MAX_RESULTS;
    entries.truncate(MAX_RESULTS);
    Ok((entries.into_iter().map(|(path, _)| path).collect(), truncated))
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        GLOB_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GLOB_TOOL_NAME.to_string(),
            description: Some(
                "Fast file pattern matching tool that works with any codebase size. \
                Supports glob patterns like \"**/*.js\" or \"src/**/*.ts\". \
                Returns matching file paths sorted by modification time."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new()
                .with_properties(json!({
                    "pattern": {
                        "type": "string",
                        "description": "The glob pattern to match files against"
                    },
                    "path": {
                        "type": "string",
                        "description": "The directory to search in. If not specified, the current working directory will be used."
                    }
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
            Some(path) => format!("Find files matching {} in {}", pattern, path),
            None => format!("Find files matching {}", pattern),
        }
    }

    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()> {
        let input: GlobInput = parse_input(input)?;
        if let Err(e) = glob::Pattern::new(&input.pattern) {
            return Err(FrameworkError::Validation(format!(
                "Invalid glob pattern: {}",
                e
            )));
        }
        let dir = search_dir(&input, ctx);
        if !dir.is_dir() {
            return Err(FrameworkError::Validation(format!(
                "Directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(())
    }

    async fn check_permissions(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> FrameworkResult<PermissionResult> {
        let input: GlobInput = parse_input(input)?;
        // A trailing component stands in for the directory itself
        Ok(check_read(GLOB_TOOL_NAME, &search_dir(&input, ctx).join("*"), ctx))
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: GlobInput = parse_input(input)?;
        let base = search_dir(&input, ctx);
        let cwd = ctx.cwd.clone();
        let pattern = input.pattern.clone();

        let outcome =
            tokio::task::spawn_blocking(move || search(&pattern, &base, &cwd)).await?;

        match outcome {
            Ok((paths, _)) if paths.is_empty() => Ok(ToolResult::success("No files found")),
            Ok((paths, truncated)) => {
                let mut output = paths.join("\n");
                if truncated {
                    output.push_str(
                        "\n(Results are truncated. Consider using a more specific path or pattern.)",
                    );
                }
                Ok(ToolResult::success(output))
            }
            Err(e) => Ok(ToolResult::error(format!("Glob search failed: {}", e))),
        }
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
    async fn test_glob_matches_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/nested/b.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        let ctx = context(&dir);

        let result = GlobTool
            .execute(&json!({ "pattern": "**/*.rs" }), &ctx)
            .await
            .unwrap();
        let mut lines: Vec<&str> = result.output.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["src/a.rs", "src/nested/b.rs"]);
    }

    #[tokio::test]
    async fn test_no_matches() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let result = GlobTool
            .execute(&json!({ "pattern": "*.zig" }), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, "No files found");
    }

    #[test]
    fn test_results_are_capped() {
        let dir = TempDir::new().unwrap();
        for i in 0..(MAX_RESULTS + 5) {
            std::fs::write(dir.path().join(format!("f{}.txt", i)), "").unwrap();
        }
        let (paths, truncated) = search("*.txt", dir.path(), dir.path()).unwrap();
        assert_eq!(paths.len(), MAX_RESULTS);
        assert!(truncated);
    }

    #[tokio::test]
    async fn test_validation_and_permissions() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert!(GlobTool
            .validate_input(&json!({ "pattern": "[" }), &ctx)
            .is_err());
        assert!(GlobTool
            .validate_input(&json!({ "pattern": "*", "path": "nope" }), &ctx)
            .is_err());

        let inside = GlobTool
            .check_permissions(&json!({ "pattern": "*" }), &ctx)
            .await
            .unwrap();
        assert!(inside.is_allow());
    }
}
