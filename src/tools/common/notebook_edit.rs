//! NotebookEdit tool for replacing, inserting and deleting notebook cells

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::super::file_access::check_edit;
use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use super::notebook::{Cell, CellType, Notebook};
use super::write_tool::write_file;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::PermissionResult;

pub const NOTEBOOK_EDIT_TOOL_NAME: &str = "NotebookEdit";

#[derive(Debug, Default, Clone, Copy)]
pub struct NotebookEditTool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EditMode {
    #[default]
    Replace,
    Insert,
    Delete,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotebookEditInput {
    notebook_path: String,
    /// Cell id, or index when the notebook has no ids. Insert goes after it.
    cell_id: Option<String>,
    #[serde(default)]
    new_source: String,
    cell_type: Option<CellType>,
    #[serde(default)]
    edit_mode: EditMode,
}

impl NotebookEditTool {
    pub fn new() -> Self {
        Self
    }
}

fn apply_edit(notebook: &mut Notebook, input: &NotebookEditInput) -> Result<String, String> {
    let target = match &input.cell_id {
        Some(id) => Some(
            notebook
                .find_cell(id)
                .ok_or_else(|| format!("Cell with ID \"{}\" not found in notebook.", id))?,
        ),
        None => None,
    };

    match input.edit_mode {
        EditMode::Replace => {
            let index = target.ok_or("cell_id is required when replacing a cell")?;
            let cell = &mut notebook.cells[index];
            if let Some(cell_type) = input.cell_type {
                cell.set_type(cell_type);
            }
            cell.set_source(input.new_source.as_str());
            Ok(format!("Updated cell {} with {}", index, input.new_source))
        }
        EditMode::Insert => {
            let cell_type = input
                .cell_type
                .ok_or("cell_type is required when inserting a cell")?;
            let index = target.map_or(0, |i| i + 1);
            notebook
                .cells
                .insert(index, Cell::new(cell_type, input.new_source.as_str()));
            Ok(format!("Inserted cell {} with {}", index, input.new_source))
        }
        EditMode::Delete => {
            let index = target.ok_or("cell_id is required when deleting a cell")?;
            notebook.cells.remove(index);
            Ok(format!("Deleted cell {}", index))
        }
    }
}

#[async_trait]
impl Tool for NotebookEditTool {
    fn name(&self) -> &str {
        NOTEBOOK_EDIT_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NOTEBOOK_EDIT_TOOL_NAME.to_string(),
            description: Some(
                "Completely replaces the contents of a specific cell in a Jupyter notebook (.ipynb file) with new source. \
                Use edit_mode=insert to add a new cell after the cell given by cell_id (or at the start when omitted). \
                Use edit_mode=delete to delete the cell."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new()
                .with_properties(json!({
                    "notebook_path": {
                        "type": "string",
                        "description": "The absolute path to the Jupyter notebook file to edit"
                    },
                    "cell_id": {
                        "type": "string",
                        "description": "The ID of the cell to edit"
                    },
                    "new_source": {
                        "type": "string",
                        "description": "The new source for the cell"
                    },
                    "cell_type": {
                        "type": "string",
                        "enum": ["code", "markdown"],
                        "description": "The type of the cell. Required for edit_mode=insert."
                    },
                    "edit_mode": {
                        "type": "string",
                        "enum": ["replace", "insert", "delete"],
                        "description": "The type of edit to make. Defaults to replace."
                    }
                }))
                .with_required(&["notebook_path", "new_source"]),
        }
    }

    fn description_for(&self, input: &Value) -> String {
        let path = input
            .get("notebook_path")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        let mode = input
            .get("edit_mode")
            .and_then(|v| v.as_str())
            .unwrap_or("replace");
        format!("Notebook {}: {}", mode, path)
    }

    fn validate_input(&self, input: &Value, ctx: &ToolContext) -> FrameworkResult<()> {
        let input: NotebookEditInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.notebook_path);
        if path.extension().map_or(true, |ext| ext != "ipynb") {
            return Err(FrameworkError::Validation(
                "File must be a Jupyter notebook (.ipynb file).".into(),
            ));
        }
        if !path.exists() {
            return Err(FrameworkError::Validation(format!(
                "Notebook file does not exist: {}",
                path.display()
            )));
        }
        if input.edit_mode == EditMode::Insert && input.cell_type.is_none() {
            return Err(FrameworkError::Validation(
                "Cell type is required when using edit_mode=insert.".into(),
            ));
        }
        if input.edit_mode != EditMode::Insert && input.cell_id.is_none() {
            return Err(FrameworkError::Validation(
                "cell_id is required unless inserting a cell.".into(),
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
        let input: NotebookEditInput = parse_input(input)?;
        Ok(check_edit(
            NOTEBOOK_EDIT_TOOL_NAME,
            &ctx.resolve_path(&input.notebook_path),
            ctx,
        ))
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: NotebookEditInput = parse_input(input)?;
        let path = ctx.resolve_path(&input.notebook_path);
        tracing::info!(path = %path.display(), mode = ?input.edit_mode, "Editing notebook");

        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read notebook: {}", path.display()))?;
        let mut notebook = match Notebook::parse(&raw) {
            Ok(nb) => nb,
            Err(e) => return Ok(ToolResult::error(format!("Notebook is not valid JSON: {}", e))),
        };

        let summary = match apply_edit(&mut notebook, &input) {
            Ok(summary) => summary,
            Err(message) => return Ok(ToolResult::error(message)),
        };

        write_file(&path, &notebook.to_json()?).await?;
        ctx.read_files.record(&path);
        Ok(ToolResult::success(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionContext, PermissionMode};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ToolContext, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nb.ipynb");
        let notebook = json!({
            "cells": [
                {"cell_type": "code", "id": "c1", "source": "a = 1", "metadata": {},
                 "outputs": [{"output_type": "stream", "name": "stdout", "text": "x"}], "execution_count": 1},
                {"cell_type": "markdown", "id": "c2", "source": "text", "metadata": {}}
            ],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 5
        });
        std::fs::write(&path, notebook.to_string()).unwrap();
        let ctx = ToolContext::new(
            dir.path(),
            Arc::new(PermissionContext::new(PermissionMode::AcceptEdits)),
        );
        ctx.read_files.record(&path);
        (dir, ctx, path)
    }

    fn cells(path: &std::path::Path) -> Vec<Cell> {
        Notebook::parse(&std::fs::read_to_string(path).unwrap()).unwrap().cells
    }

    #[tokio::test]
    async fn test_replace_cell() {
        let (_dir, ctx, path) = setup();
        let input = json!({"notebook_path": "nb.ipynb", "cell_id": "c1", "new_source": "a = 2"});
        NotebookEditTool.validate_input(&input, &ctx).unwrap();
        let result = NotebookEditTool.execute(&input, &ctx).await.unwrap();
        assert!(!result.is_error, "{}", result.output);

        let cells = cells(&path);
        assert_eq!(cells[0].source.as_text(), "a = 2");
        assert_eq!(cells[0].outputs.as_ref().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_insert_and_delete() {
        let (_dir, ctx, path) = setup();
        let insert = json!({"notebook_path": "nb.ipynb", "cell_id": "c1", "new_source": "# mid",
                            "cell_type": "markdown", "edit_mode": "insert"});
        NotebookEditTool.execute(&insert, &ctx).await.unwrap();
        let after_insert = cells(&path);
        assert_eq!(after_insert.len(), 3);
        assert_eq!(after_insert[1].source.as_text(), "# mid");

        let delete = json!({"notebook_path": "nb.ipynb", "cell_id": "c2", "new_source": "",
                            "edit_mode": "delete"});
        NotebookEditTool.validate_input(&delete, &ctx).unwrap();
        NotebookEditTool.execute(&delete, &ctx).await.unwrap();
        let after_delete = cells(&path);
        assert_eq!(after_delete.len(), 2);
        assert!(after_delete.iter().all(|c| c.id.as_deref() != Some("c2")));
    }

    #[tokio::test]
    async fn test_validation() {
        let (_dir, ctx, _path) = setup();
        let missing_type = json!({"notebook_path": "nb.ipynb", "new_source": "x", "edit_mode": "insert"});
        assert!(NotebookEditTool.validate_input(&missing_type, &ctx).is_err());

        let unknown = json!({"notebook_path": "nb.ipynb", "cell_id": "zz", "new_source": "x"});
        let result = NotebookEditTool.execute(&unknown, &ctx).await.unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("not found"));

        let not_notebook = json!({"notebook_path": "a.py", "cell_id": "c1", "new_source": "x"});
        assert!(NotebookEditTool.validate_input(&not_notebook, &ctx).is_err());
    }
}
