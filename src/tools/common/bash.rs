//! Bash tool for executing shell commands
//!
//! Runs `bash -c` in the session's working directory with a timeout. The
//! child is killed when the turn is interrupted.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::super::tool::{Tool, ToolContext, ToolResult};
use super::super::validation::parse_input;
use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::{
    evaluate_command, DecisionReason, HeuristicPrefixDetector, PermissionMode, PermissionResult,
    BASH_TOOL_NAME,
};

/// Default timeout in milliseconds (2 minutes)
const DEFAULT_TIMEOUT_MS: u64 = 120000;
/// Maximum timeout in milliseconds (10 minutes)
const MAX_TIMEOUT_MS: u64 = 600000;
/// Maximum output length in characters
const MAX_OUTPUT_LENGTH: usize = 30000;

/// Bash tool for executing shell commands
#[derive(Debug, Default, Clone, Copy)]
pub struct BashTool;

/// Input for the bash tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BashInput {
    /// The command to execute (required)
    command: String,
    /// Optional timeout in milliseconds (max 600000)
    timeout: Option<u64>,
    /// Optional description of what this command does
    #[allow(dead_code)]
    description: Option<String>,
}

/// Outcome of running a command
#[derive(Debug)]
enum RunOutcome {
    Finished { output: String, exit_code: i32 },
    TimedOut,
    Interrupted,
}

impl BashTool {
    pub fn new() -> Self {
        Self
    }

    async fn run_command(
        &self,
        command: &str,
        timeout_ms: u64,
        ctx: &ToolContext,
    ) -> Result<RunOutcome> {
        tracing::info!(command, cwd = %ctx.cwd.display(), timeout_ms, "Executing bash command");

        let child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let duration = Duration::from_millis(timeout_ms.min(MAX_TIMEOUT_MS));

        // Dropping the wait future drops the child, which kills it
        let output = tokio::select! {
            _ = ctx.abort.cancelled() => return Ok(RunOutcome::Interrupted),
            result = tokio::time::timeout(duration, child.wait_with_output()) => match result {
                Ok(output) => output?,
                Err(_) => return Ok(RunOutcome::TimedOut),
            },
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Combine stdout and stderr
        let mut result = stdout.trim_end().to_string();
        let stderr = stderr.trim_end();
        if !stderr.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str("STDERR:\n");
            result.push_str(stderr);
        }

        tracing::debug!(exit_code, output_len = result.len(), "Command finished");

        Ok(RunOutcome::Finished {
            output: truncate_output(result),
            exit_code,
        })
    }
}

/// Cut output to `MAX_OUTPUT_LENGTH` characters, noting how many lines were dropped
fn truncate_output(output: String) -> String {
    if output.chars().count() <= MAX_OUTPUT_LENGTH {
        return output;
    }
    let cut = output
        .char_indices()
        .nth(MAX_OUTPUT_LENGTH)
        .map(|(i, _)| i)
        .unwrap_or(output.len());
    let dropped_lines = output[cut..].lines().count();
    format!(
        "{}\n\n... [{} lines truncated] ...",
        &output[..cut],
        dropped_lines
    )
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        BASH_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: BASH_TOOL_NAME.to_string(),
            description: Some(
                "Executes a given bash command with optional timeout. \
                Use this for terminal operations like git, npm, cargo, docker, etc. \
                DO NOT use it for file operations (reading, writing, editing, searching) - use the specialized tools instead."
                    .to_string(),
            ),
            input_schema: ToolInputSchema::new()
                .with_properties(json!({
                    "command": {
                        "type": "string",
                        "description": "The command to execute"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Optional timeout in milliseconds (max 600000). Default is 120000ms (2 minutes)."
                    },
                    "description": {
                        "type": "string",
                        "description": "Clear, concise description of what this command does in 5-10 words, in active voice."
                    }
                }))
                .with_required(&["command"]),
        }
    }

    fn description_for(&self, input: &Value) -> String {
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown command>");
        match input.get("description").and_then(|v| v.as_str()) {
            Some(desc) => format!("{} ({})", command, desc),
            None => command.to_string(),
        }
    }

    fn validate_input(&self, input: &Value, _ctx: &ToolContext) -> FrameworkResult<()> {
        let input: BashInput = parse_input(input)?;
        if input.command.trim().is_empty() {
            return Err(FrameworkError::Validation("The command must not be empty".into()));
        }
        if input.timeout.map_or(false, |t| t > MAX_TIMEOUT_MS) {
            return Err(FrameworkError::Validation(format!(
                "The timeout must not exceed {}ms",
                MAX_TIMEOUT_MS
            )));
        }
        Ok(())
    }

    async fn check_permissions(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> FrameworkResult<PermissionResult> {
        let input: BashInput = parse_input(input)?;
        let mode = ctx.permissions.mode();

        if mode == PermissionMode::BypassPermissions {
            // Deny rules still apply; nothing is asked
            let result = evaluate_command(
                &input.command,
                &ctx.permissions,
                &HeuristicPrefixDetector::new(),
                &ctx.cwd,
                &ctx.abort,
            )
            .await?;
            return Ok(match result {
                PermissionResult::Ask { .. } => PermissionResult::Allow {
                    reason: Some(DecisionReason::Mode { mode }),
                },
                other => other,
            });
        }

        evaluate_command(
            &input.command,
            &ctx.permissions,
            ctx.prefix_detector.as_ref(),
            &ctx.cwd,
            &ctx.abort,
        )
        .await
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: BashInput = parse_input(input)?;
        let timeout_ms = input.timeout.unwrap_or(DEFAULT_TIMEOUT_MS);

        match self.run_command(&input.command, timeout_ms, ctx).await {
            Ok(RunOutcome::Finished { output, exit_code }) => {
                if exit_code == 0 {
                    if output.is_empty() {
                        Ok(ToolResult::success("Command completed successfully (no output)"))
                    } else {
                        Ok(ToolResult::success(output))
                    }
                } else {
                    Ok(ToolResult::error(format!(
                        "Command failed with exit code {}\n{}",
                        exit_code, output
                    )))
                }
            }
            Ok(RunOutcome::TimedOut) => Ok(ToolResult::error(format!(
                "Command timed out after {}ms",
                timeout_ms
            ))),
            Ok(RunOutcome::Interrupted) => Err(FrameworkError::Aborted.into()),
            Err(e) => Ok(ToolResult::error(format!("Failed to execute command: {}", e))),
        }
    }
}
