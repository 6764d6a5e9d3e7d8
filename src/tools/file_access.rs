//! Permission checks shared by the file tools
//!
//! Reads inside the working directory are allowed; reads elsewhere ask.
//! Edits ask unless a rule or the permission mode covers them. Rules for
//! `Edit` also cover the other editing tools.

use std::path::{Path, PathBuf};

use path_clean::PathClean;

use super::tool::ToolContext;
use crate::permissions::{DecisionReason, PermissionMode, PermissionResult, PermissionRule, RuleBehavior};

/// Tool name whose rules cover every editing tool
pub const EDIT_RULE_TOOL: &str = "Edit";

/// `path` against the working directory with `.` and `..` resolved lexically
fn normalize(path: &Path, ctx: &ToolContext) -> PathBuf {
    ctx.cwd.join(path).clean()
}

fn is_inside(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir.clean())
}

fn path_rule(
    ctx: &ToolContext,
    tools: &[&str],
    path: &Path,
    behavior: RuleBehavior,
) -> Option<PermissionRule> {
    let display = path.to_string_lossy();
    let relative = path
        .strip_prefix(ctx.cwd.clean())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| display.to_string());
    tools.iter().find_map(|tool| {
        ctx.permissions
            .path_rule(tool, &display, behavior)
            .or_else(|| ctx.permissions.path_rule(tool, &relative, behavior))
    })
}

/// Deny, ask and allow rules in that order, then bypass mode
fn check_rules(
    tool: &str,
    tools: &[&str],
    path: &Path,
    ctx: &ToolContext,
) -> Option<PermissionResult> {
    if let Some(rule) = path_rule(ctx, tools, path, RuleBehavior::Deny) {
        return Some(PermissionResult::deny_by_rule(tool, rule));
    }
    let mode = ctx.permissions.mode();
    if mode == PermissionMode::BypassPermissions {
        return Some(PermissionResult::Allow {
            reason: Some(DecisionReason::Mode { mode }),
        });
    }
    if let Some(rule) = path_rule(ctx, tools, path, RuleBehavior::Ask) {
        return Some(PermissionResult::ask_by_rule(tool, rule));
    }
    path_rule(ctx, tools, path, RuleBehavior::Allow).map(PermissionResult::allow_by_rule)
}

/// Suggest a rule covering the directory that holds `path`
fn directory_rule(tool: &str, path: &Path) -> PermissionRule {
    match path.parent() {
        Some(parent) => PermissionRule::with_content(tool, format!("{}/**", parent.display())),
        None => PermissionRule::tool(tool),
    }
}

/// Permission for a read-only tool touching `path`
pub fn check_read(tool: &str, path: &Path, ctx: &ToolContext) -> PermissionResult {
    let path = normalize(path, ctx);
    if let Some(result) = check_rules(tool, &[tool], &path, ctx) {
        return result;
    }
    if is_inside(&path, &ctx.cwd) {
        return PermissionResult::allow();
    }
    PermissionResult::ask(tool, vec![directory_rule(tool, &path)])
}

/// Permission for an editing tool touching `path`
pub fn check_edit(tool: &str, path: &Path, ctx: &ToolContext) -> PermissionResult {
    let path = normalize(path, ctx);
    if let Some(result) = check_rules(tool, &[tool, EDIT_RULE_TOOL], &path, ctx) {
        return result;
    }

    let mode = ctx.permissions.mode();
    if mode == PermissionMode::AcceptEdits && is_inside(&path, &ctx.cwd) {
        return PermissionResult::Allow {
            reason: Some(DecisionReason::Mode { mode }),
        };
    }

    PermissionResult::ask(tool, vec![PermissionRule::tool(EDIT_RULE_TOOL)])
}
