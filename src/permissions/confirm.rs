//! Pending tool use awaiting the user's decision

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::PermissionContext;
use super::result::{DecisionReason, PermissionDecision, PermissionResult};
use super::rule::{PermissionRule, RuleBehavior};
use crate::core::FrameworkResult;

/// A tool use whose permission check returned `Ask`
///
/// Sent to the UI as `OutputChunk::PermissionRequest`; answered with
/// `InputMessage::PermissionResponse` carrying the same `tool_use_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseConfirm {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: Value,
    /// One-line description of what the tool will do
    pub description: String,
    /// Prompt text from the permission check
    pub message: String,
    /// Rules stored if the user allows for the session or always
    pub suggestions: Vec<PermissionRule>,
    pub reason: Option<DecisionReason>,
    /// Assistant message that requested the tool
    pub assistant_message_id: String,
}

impl ToolUseConfirm {
    /// Build from an `Ask` result; other results carry no prompt data
    pub fn new(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
        description: impl Into<String>,
        permission: &PermissionResult,
        assistant_message_id: impl Into<String>,
    ) -> Self {
        let (message, suggestions, reason) = match permission {
            PermissionResult::Ask {
                message,
                suggestions,
                reason,
            } => (message.clone(), suggestions.clone(), reason.clone()),
            PermissionResult::Deny { message, reason } => {
                (message.clone(), Vec::new(), reason.clone())
            }
            PermissionResult::Allow { reason } => (String::new(), Vec::new(), reason.clone()),
        };
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            input,
            description: description.into(),
            message,
            suggestions,
            reason,
            assistant_message_id: assistant_message_id.into(),
        }
    }

    /// Apply the user's answer, storing suggested rules when asked to
    ///
    /// Returns whether the tool may run.
    pub fn resolve(
        &self,
        decision: PermissionDecision,
        ctx: &PermissionContext,
    ) -> FrameworkResult<bool> {
        tracing::info!(
            tool = %self.tool_name,
            tool_use_id = %self.tool_use_id,
            ?decision,
            "Permission decision"
        );

        if let Some(duration) = decision.rule_duration() {
            let rules = if self.suggestions.is_empty() {
                // Nothing more specific to remember; only file tools get a tool-wide rule
                if self.tool_name == super::BASH_TOOL_NAME {
                    Vec::new()
                } else {
                    vec![PermissionRule::tool(&self.tool_name)]
                }
            } else {
                self.suggestions.clone()
            };
            for rule in rules {
                ctx.add_rule(rule, RuleBehavior::Allow, duration)?;
            }
        }

        Ok(decision.is_allow())
    }
}
