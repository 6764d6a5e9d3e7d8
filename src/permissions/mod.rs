//! Permission system for tool execution
//!
//! Rules are written `Tool` or `Tool(content)` and carry a behavior
//! (allow, deny, ask) and a duration (temporary or permanent). The
//! [`PermissionContext`] holds them for a session; shell commands go
//! through [`evaluate_command`], which splits compound commands and asks a
//! [`PrefixDetector`] for the prefixes behind `Bash(<prefix>:*)` rules.
//!
//! ## Example
//!
//! ```rust,ignore
//! use codewright::permissions::*;
//!
//! let ctx = PermissionContext::default();
//! ctx.add_rule(PermissionRule::bash_prefix("npm test"), RuleBehavior::Allow, RuleDuration::Temporary)?;
//!
//! let result = evaluate_command("npm test -- --watch", &ctx, &HeuristicPrefixDetector::new(), &cwd, &abort).await?;
//! assert!(result.is_allow());
//! ```

mod bash;
mod confirm;
mod context;
mod prefix;
mod result;
mod rule;
pub mod shell;

pub use bash::{evaluate_command, BASH_TOOL_NAME};
pub use confirm::ToolUseConfirm;
pub use context::{PermissionContext, PermissionMode, StoredRule};
pub use prefix::{
    CommandPrefixResult, HeuristicPrefixDetector, ModelPrefixDetector, PrefixDetector,
    PrefixResult,
};
pub use result::{DecisionReason, PermissionDecision, PermissionResult};
pub use rule::{PermissionRule, RuleBehavior, RuleDuration};
