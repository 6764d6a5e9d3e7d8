//! Edit tool for modifying files
//!
//! Performs exact string replacements in files. An empty `old_string`
//! creates a new file with `new_string` as its content.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::super::file_access::{check_edit, EDIT_RULE_TOOL};
use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use super::write_tool::write_file;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::PermissionResult;

/// Edit tool for string replacement in files
#[derive(Debug, Default, Clone, Copy)]
pub struct EditTool;

/// Input for the edit tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EditInput {
    /// The path to the file to modify (required)
    file_path: String,
    /// The text to replace (required)
    old_string: String,
    /// The text to replace it with (required)
    new_string: String,
    /// Replace all occurrences (default false)
    #[serde(default)]
    replace_all: bool,
}

impl EditTool {
    pub fn new() -> Self {
        Self
    }
}

/// Replace `old` with `new` in `content`, enforcing a unique match unless `replace_all`
fn replace_in(content: &str, old: &str, new: &str, replace_all: bool) -> Result<(String, usize), String> {
    let occurrences = content.matches(old).count();
    if occurrences == 0 {
        return Err(
            "String to replace not found in file. Make sure to include exact text including whitespace."
                .to_string(),
        );
    }
    if !replace_all && occurrences > 1 {
        return Err(format!(
            "Found {} matches of the string to replace, but replace_all is false. \
            Either provide a more specific string to ensure only one match, \
            or use replace_all: true to change every instance.",
            occurrences
        ));
    }
    let updated = if replace_all {
        content.replace(old, new)
    } else {
        content.replacen(old, new, 1)
    };
    Ok((updated, occurrences))
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        EDIT_RULE_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: EDIT_RULE_TOOL.to_string(),
            description: Some(
                "Performs exact string replacements in files. \
                You must use the Read tool at least once before editing an existing file. \
                The edit will FAIL if old_string is not unique in the file unless replace_all is true. \
                Use an empty old_string to create a new file."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new()
                .with_properties(json!({
                    "file_path": {
                        "type": "string",
                        "description": "The absolute path to the file to modify"
                    },
                    "old_string": {
                        "type": "string",
                        "description": "The text to replace"
                    },
                    "new_string": {
                        "type": "string",
                        "description": "The text to replace it with (must be different from old_string)"
                    },
                    "replace_all": {
                        "type": "boolean",
                        "default": false,
                        "description": "Replace all occurrences of old_string (default false)"
                    }
                }))
                .with_required(&["file_path", "old_string", "new_string"]),
        }
    }

    fn description_for(&self, input: &Value) -> String {
        let file_path = input
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        format!("Edit file: {}", file_path)
    }

    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()> {
        let input: EditInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.file_path);

        if input.old_string == input.new_string {
            return Err(FrameworkError::Validation(
                "No changes to make: old_string and new_string are exactly the same.".into(),
            ));
        }
        if input.old_string.is_empty() {
            if path.exists() {
                return Err(FrameworkError::Validation(
                    "Cannot create new file - file already exists.".into(),
                ));
            }
            return Ok(());
        }
        if !path.exists() {
            return Err(FrameworkError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }
        if path.extension().map_or(false, |ext| ext == "ipynb") {
            return Err(FrameworkError::Validation(
                "File is a Jupyter Notebook. Use the NotebookEdit tool to edit this file.".into(),
            ));
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
        let input: EditInput = parse_input(input)?;
        Ok(check_edit(EDIT_RULE_TOOL, &ctx.resolve_path(&input.file_path), ctx))
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: EditInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.file_path);
        tracing::info!(path = %path.display(), replace_all = input.replace_all, "Editing file");

        if input.old_string.is_empty() {
            return match write_file(&path, &input.new_string).await {
                Ok(_) => {
                    ctx.read_files.record(&path);
                    Ok(ToolResult::success(format!(
                        "File created successfully at: {}",
                        input.file_path
                    )))
                }
                Err(e) => Ok(ToolResult::error(format!("{:#}", e))),
            };
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let (updated, occurrences) =
            match replace_in(&content, &input.old_string, &input.new_string, input.replace_all) {
                Ok(done) => done,
                Err(message) => return Ok(ToolResult::error(message)),
            };

        if let Err(e) = write_file(&path, &updated).await {
            return Ok(ToolResult::error(format!("{:#}", e)));
        }
        ctx.read_files.record(&path);

        if input.replace_all {
            Ok(ToolResult::success(format!(
                "Successfully replaced {} occurrences in {}",
                occurrences, input.file_path
            )))
        } else {
            Ok(ToolResult::success(format!(
                "Successfully replaced text in {}",
                input.file_path
            )))
        }
    }
}
