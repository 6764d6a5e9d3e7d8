//! Tool Executor
//!
//! Runs the tool uses of one assistant message:
//! 1. Partition into batches (consecutive concurrency-safe tools share a batch)
//! 2. Per tool: look up, validate input, check permissions, prompt on `Ask`
//! 3. Run the approved tools of a batch concurrently
//! 4. Return results in request order
//!
//! A rejected prompt cancels every tool use after it. An interrupt fills
//! every outstanding tool use with an interrupted result so the history
//! stays well formed.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentState, FrameworkError};
use crate::permissions::{PermissionResult, ToolUseConfirm};
use crate::runtime::AgentInternals;
use crate::tools::{Tool, ToolContext, ToolRegistry, ToolResult};

/// Concurrent tools per batch
pub const MAX_TOOL_CONCURRENCY: usize = 10;

pub const REJECT_MESSAGE: &str = "The user doesn't want to proceed with this tool use. \
The tool use was rejected (eg. if it was a file edit, the new_string was NOT written to the file). \
STOP what you are doing and wait for the user to tell you how to proceed.";

pub const CANCEL_MESSAGE: &str = "The user doesn't want to take this action right now. \
STOP what you are doing and wait for the user to tell you how to proceed.";

pub const INTERRUPT_MESSAGE_FOR_TOOL_USE: &str = "[Request interrupted by user for tool use]";

/// A `tool_use` block requested by the model
#[derive(Debug, Clone)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolUse {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Results of one round of tool uses
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    /// `(tool_use_id, result)` in request order
    pub results: Vec<(String, ToolResult)>,
    pub rejected: bool,
    pub interrupted: bool,
}

enum Authorization {
    Run(Arc<dyn Tool>),
    Finished(ToolResult),
    Rejected,
}

/// Permission-aware tool execution
pub struct ToolExecutor;

impl ToolExecutor {
    /// Group indices into batches
    ///
    /// Consecutive concurrency-safe tools share a batch; any other tool
    /// (including unknown ones) gets a batch of its own.
    pub fn partition(tools: &ToolRegistry, uses: &[ToolUse]) -> Vec<Vec<usize>> {
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut last_safe = false;
        for (index, tool_use) in uses.iter().enumerate() {
            let safe = tools
                .get(&tool_use.name)
                .is_some_and(|tool| tool.is_concurrency_safe());
            match batches.last_mut() {
                Some(batch) if safe && last_safe => batch.push(index),
                _ => batches.push(vec![index]),
            }
            last_safe = safe;
        }
        batches
    }

    /// Run every tool use of an assistant message
    pub async fn execute_all(
        internals: &mut AgentInternals,
        tools: &ToolRegistry,
        uses: &[ToolUse],
        assistant_message_id: &str,
        abort: &CancellationToken,
    ) -> ExecutionOutcome {
        let mut results: Vec<Option<ToolResult>> = vec![None; uses.len()];
        let mut outcome = ExecutionOutcome::default();

        for batch in Self::partition(tools, uses) {
            if outcome.rejected || outcome.interrupted {
                break;
            }

            // Permissions are resolved one at a time; prompts need the input channel
            let mut approved: Vec<(usize, Arc<dyn Tool>)> = Vec::new();
            for &index in &batch {
                if abort.is_cancelled() {
                    outcome.interrupted = true;
                    break;
                }
                let tool_use = &uses[index];
                match Self::authorize(internals, tools, tool_use, assistant_message_id, abort).await {
                    Ok(Authorization::Run(tool)) => approved.push((index, tool)),
                    Ok(Authorization::Finished(result)) => {
                        internals.send_tool_end(&tool_use.id, &tool_use.name, &result);
                        results[index] = Some(result);
                    }
                    Ok(Authorization::Rejected) => {
                        let result = ToolResult::error(REJECT_MESSAGE);
                        internals.send_tool_end(&tool_use.id, &tool_use.name, &result);
                        results[index] = Some(result);
                        outcome.rejected = true;
                        break;
                    }
                    Err(e) => {
                        tracing::info!(tool = %tool_use.name, error = %e, "Tool use interrupted before running");
                        outcome.interrupted = true;
                        break;
                    }
                }
            }
            if outcome.rejected || outcome.interrupted {
                break;
            }
            if approved.is_empty() {
                continue;
            }

            let (first, first_tool) = &approved[0];
            internals
                .set_state(AgentState::executing_tool(first_tool.name(), &uses[*first].id))
                .await;
            for (index, _) in &approved {
                internals.send_tool_start(&uses[*index].id, &uses[*index].name, &uses[*index].input);
            }

            let ctx = internals.tools.clone();
            let jobs: Vec<BoxFuture<'_, (usize, ToolResult)>> = approved
                .into_iter()
                .map(|(index, tool)| {
                    let ctx = &ctx;
                    let input = uses[index].input.clone();
                    async move { (index, Self::run_tool(tool, &input, ctx).await) }.boxed()
                })
                .collect();
            let mut finished: Vec<(usize, ToolResult)> = stream::iter(jobs)
            .buffer_unordered(MAX_TOOL_CONCURRENCY)
            .collect()
            .await;
            finished.sort_by_key(|(index, _)| *index);

            for (index, result) in finished {
                internals.session.record_tool_call();
                internals.send_tool_end(&uses[index].id, &uses[index].name, &result);
                results[index] = Some(result);
            }
            if abort.is_cancelled() {
                outcome.interrupted = true;
            }
        }

        let filler = if outcome.rejected {
            CANCEL_MESSAGE
        } else {
            INTERRUPT_MESSAGE_FOR_TOOL_USE
        };
        outcome.results = uses
            .iter()
            .zip(results)
            .map(|(tool_use, result)| {
                let result = result.unwrap_or_else(|| ToolResult::error(filler));
                (tool_use.id.clone(), result)
            })
            .collect();
        outcome
    }

    /// Decide whether a tool use may run; prompts the user on `Ask`
    ///
    /// Errors only when the turn was interrupted or the agent is stopping.
    async fn authorize(
        internals: &mut AgentInternals,
        tools: &ToolRegistry,
        tool_use: &ToolUse,
        assistant_message_id: &str,
        abort: &CancellationToken,
    ) -> Result<Authorization, FrameworkError> {
        let Some(tool) = tools.get(&tool_use.name) else {
            tracing::warn!(tool = %tool_use.name, "Unknown tool requested");
            return Ok(Authorization::Finished(ToolResult::error(format!(
                "Error: No such tool available: {}",
                tool_use.name
            ))));
        };

        if let Err(e) = tool.validate_input(&tool_use.input, &internals.tools) {
            tracing::info!(tool = %tool_use.name, error = %e, "Tool input rejected");
            return Ok(Authorization::Finished(ToolResult::error(e.to_string())));
        }

        let permission = match tool.check_permissions(&tool_use.input, &internals.tools).await {
            Ok(permission) => permission,
            Err(e) if e.is_aborted() => return Err(e),
            Err(e) => {
                return Ok(Authorization::Finished(ToolResult::error(format!(
                    "Error checking permissions: {}",
                    e
                ))))
            }
        };
        tracing::info!(
            tool = %tool_use.name,
            tool_use_id = %tool_use.id,
            behavior = permission.behavior(),
            "Permission check"
        );

        match permission {
            PermissionResult::Allow { .. } => Ok(Authorization::Run(tool)),
            PermissionResult::Deny { message, .. } => {
                Ok(Authorization::Finished(ToolResult::error(message)))
            }
            PermissionResult::Ask { ref message, .. } if !internals.tools.permissions.is_interactive() => {
                Ok(Authorization::Finished(ToolResult::error(format!(
                    "{} Permission prompts are unavailable in non-interactive mode.",
                    message
                ))))
            }
            ask @ PermissionResult::Ask { .. } => {
                let confirm = ToolUseConfirm::new(
                    &tool_use.id,
                    &tool_use.name,
                    tool_use.input.clone(),
                    tool.description_for(&tool_use.input),
                    &ask,
                    assistant_message_id,
                );
                let decision = internals.await_permission(confirm.clone(), abort).await?;
                internals.set_state(AgentState::Processing).await;
                let allowed = confirm
                    .resolve(decision, &internals.tools.permissions)
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "Failed to store permission rule");
                        decision.is_allow()
                    });
                if allowed {
                    Ok(Authorization::Run(tool))
                } else {
                    Ok(Authorization::Rejected)
                }
            }
        }
    }

    async fn run_tool(tool: Arc<dyn Tool>, input: &Value, ctx: &ToolContext) -> ToolResult {
        let started = std::time::Instant::now();
        let result = match tool.execute(input, ctx).await {
            Ok(result) => result,
            Err(e) if is_abort(&e) => ToolResult::error(INTERRUPT_MESSAGE_FOR_TOOL_USE),
            Err(e) => ToolResult::error(format!("Error: {:#}", e)),
        };
        tracing::info!(
            tool = %tool.name(),
            is_error = result.is_error,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool finished"
        );
        result
    }
}

fn is_abort(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|e| e.downcast_ref::<FrameworkError>().is_some_and(FrameworkError::is_aborted))
}
