//! Permission prompt text
//!
//! Rendering is a pure function of the pending tool use so it can be
//! checked without a terminal.

use colored::*;
use serde_json::Value;

use crate::permissions::{DecisionReason, PermissionDecision, ToolUseConfirm, BASH_TOOL_NAME};

const RULE_WIDTH: usize = 60;

/// Render the prompt shown for a pending tool use
pub fn render_permission_prompt(confirm: &ToolUseConfirm) -> String {
    let mut lines = Vec::new();
    lines.push("─".repeat(RULE_WIDTH).yellow().to_string());
    lines.push(format!("{}", title(&confirm.tool_name).yellow().bold()));
    lines.push(String::new());

    for line in body(confirm).lines() {
        lines.push(format!("  {}", line));
    }
    if !confirm.description.is_empty() && confirm.tool_name != BASH_TOOL_NAME {
        lines.push(format!("  {}", confirm.description.bright_black()));
    }
    if let Some(note) = reason_note(confirm.reason.as_ref()) {
        lines.push(format!("  {}", note.red()));
    }

    lines.push(String::new());
    lines.push("Do you want to proceed?".to_string());
    lines.push(format!("  {} Yes", "[y]".bold()));
    if let Some(scope) = remembered_scope(confirm) {
        lines.push(format!("  {} Yes, for this session: {}", "[s]".bold(), scope));
        lines.push(format!("  {} Yes, and don't ask again: {}", "[a]".bold(), scope));
    }
    lines.push(format!(
        "  {} No, and tell the assistant what to do differently",
        "[n]".bold()
    ));
    lines.push("─".repeat(RULE_WIDTH).yellow().to_string());
    lines.join("\n")
}

fn title(tool_name: &str) -> String {
    match tool_name {
        BASH_TOOL_NAME => "Bash command".to_string(),
        "Edit" | "Write" | "NotebookEdit" => "Edit file".to_string(),
        other => format!("Use {}", other),
    }
}

/// The part of the input the user needs to see
fn body(confirm: &ToolUseConfirm) -> String {
    let field = |name: &str| confirm.input.get(name).and_then(Value::as_str);
    match confirm.tool_name.as_str() {
        BASH_TOOL_NAME => field("command").unwrap_or_default().to_string(),
        "Write" => {
            let path = field("file_path").unwrap_or_default();
            let lines = field("content").map(|c| c.lines().count()).unwrap_or(0);
            format!("{} ({} lines)", path, lines)
        }
        "Edit" => {
            let path = field("file_path").unwrap_or_default();
            let old = field("old_string").unwrap_or_default();
            let new = field("new_string").unwrap_or_default();
            let mut out = path.to_string();
            for line in old.lines() {
                out.push_str(&format!("\n{}", format!("- {}", line).red()));
            }
            for line in new.lines() {
                out.push_str(&format!("\n{}", format!("+ {}", line).green()));
            }
            out
        }
        "NotebookEdit" => {
            let path = field("notebook_path").unwrap_or_default();
            let mode = field("edit_mode").unwrap_or("replace");
            match field("cell_id") {
                Some(cell) => format!("{} ({} cell {})", path, mode, cell),
                None => format!("{} ({})", path, mode),
            }
        }
        _ => serde_json::to_string(&confirm.input).unwrap_or_default(),
    }
}

fn reason_note(reason: Option<&DecisionReason>) -> Option<String> {
    match reason? {
        DecisionReason::MultipleCd => {
            Some("This command changes directory more than once.".to_string())
        }
        DecisionReason::CommandInjection => {
            Some("Command contains input that could not be matched to a safe prefix.".to_string())
        }
        DecisionReason::Other { reason } => Some(reason.clone()),
        _ => None,
    }
}

/// What "don't ask again" would cover
fn remembered_scope(confirm: &ToolUseConfirm) -> Option<String> {
    if !confirm.suggestions.is_empty() {
        let rules: Vec<String> = confirm.suggestions.iter().map(ToString::to_string).collect();
        return Some(rules.join(", "));
    }
    if confirm.tool_name == BASH_TOOL_NAME {
        None
    } else {
        Some(confirm.tool_name.clone())
    }
}

/// Parse the user's answer; `None` for anything unrecognized
pub fn parse_decision(answer: &str) -> Option<PermissionDecision> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "1" => Some(PermissionDecision::AllowOnce),
        "s" | "session" | "2" => Some(PermissionDecision::AllowForSession),
        "a" | "always" | "3" => Some(PermissionDecision::AllowAlways),
        "n" | "no" | "4" | "" => Some(PermissionDecision::Reject),
        _ => None,
    }
}
