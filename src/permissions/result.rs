//! Outcomes of permission checks and user decisions

use serde::{Deserialize, Serialize};

use super::context::PermissionMode;
use super::rule::{PermissionRule, RuleDuration};

/// Why a permission check produced its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DecisionReason {
    /// A stored rule matched
    Rule { rule: PermissionRule },
    /// The permission mode decided
    Mode { mode: PermissionMode },
    /// The command changes directory more than once
    MultipleCd,
    /// The prefix detector flagged command injection
    CommandInjection,
    /// The session cannot prompt
    NonInteractive,
    /// Per-subcommand results of a compound command
    Subcommands { results: Vec<(String, String)> },
    /// Free-form explanation
    Other { reason: String },
}

/// Result of checking whether a tool use may run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionResult {
    Allow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<DecisionReason>,
    },
    Deny {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<DecisionReason>,
    },
    Ask {
        message: String,
        /// Rules that would allow this use if the user accepts them
        #[serde(default)]
        suggestions: Vec<PermissionRule>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<DecisionReason>,
    },
}

impl PermissionResult {
    pub fn allow() -> Self {
        PermissionResult::Allow { reason: None }
    }

    pub fn allow_by_rule(rule: PermissionRule) -> Self {
        PermissionResult::Allow {
            reason: Some(DecisionReason::Rule { rule }),
        }
    }

    pub fn deny_by_rule(tool_name: &str, rule: PermissionRule) -> Self {
        PermissionResult::Deny {
            message: format!("Permission to use {} has been denied.", tool_name),
            reason: Some(DecisionReason::Rule { rule }),
        }
    }

    /// Ask because an `ask` rule matched; nothing is suggested
    pub fn ask_by_rule(tool_name: &str, rule: PermissionRule) -> Self {
        PermissionResult::Ask {
            message: ask_message(tool_name),
            suggestions: Vec::new(),
            reason: Some(DecisionReason::Rule { rule }),
        }
    }

    /// Whether a stored rule produced this result
    pub fn is_from_rule(&self) -> bool {
        matches!(self.reason(), Some(DecisionReason::Rule { .. }))
    }

    /// Ask the user with the standard prompt text
    pub fn ask(tool_name: &str, suggestions: Vec<PermissionRule>) -> Self {
        PermissionResult::Ask {
            message: ask_message(tool_name),
            suggestions,
            reason: None,
        }
    }

    /// Ask with an explicit reason
    pub fn ask_because(
        tool_name: &str,
        suggestions: Vec<PermissionRule>,
        reason: DecisionReason,
    ) -> Self {
        PermissionResult::Ask {
            message: ask_message(tool_name),
            suggestions,
            reason: Some(reason),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, PermissionResult::Allow { .. })
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, PermissionResult::Deny { .. })
    }

    pub fn is_ask(&self) -> bool {
        matches!(self, PermissionResult::Ask { .. })
    }

    /// Suggested rules of an `Ask` result
    pub fn suggestions(&self) -> &[PermissionRule] {
        match self {
            PermissionResult::Ask { suggestions, .. } => suggestions,
            _ => &[],
        }
    }

    pub fn reason(&self) -> Option<&DecisionReason> {
        match self {
            PermissionResult::Allow { reason }
            | PermissionResult::Deny { reason, .. }
            | PermissionResult::Ask { reason, .. } => reason.as_ref(),
        }
    }

    /// Short label used in logs and reasons
    pub fn behavior(&self) -> &'static str {
        match self {
            PermissionResult::Allow { .. } => "allow",
            PermissionResult::Deny { .. } => "deny",
            PermissionResult::Ask { .. } => "ask",
        }
    }
}

fn ask_message(tool_name: &str) -> String {
    format!(
        "The assistant requested permission to use {}, but you have not granted it yet.",
        tool_name
    )
}

/// The user's answer to a permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionDecision {
    /// Run this tool use only
    AllowOnce,
    /// Run it and remember the suggested rules for this session
    AllowForSession,
    /// Run it and persist the suggested rules to local settings
    AllowAlways,
    /// Do not run it
    Reject,
}

impl PermissionDecision {
    pub fn is_allow(&self) -> bool {
        !matches!(self, PermissionDecision::Reject)
    }

    /// Duration of the rules this decision stores, if any
    pub fn rule_duration(&self) -> Option<RuleDuration> {
        match self {
            PermissionDecision::AllowForSession => Some(RuleDuration::Temporary),
            PermissionDecision::AllowAlways => Some(RuleDuration::Permanent),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_accessors() {
        let ask = PermissionResult::ask("Bash", vec![PermissionRule::bash_prefix("npm test")]);
        assert!(ask.is_ask());
        assert_eq!(ask.suggestions().len(), 1);
        assert_eq!(ask.behavior(), "ask");

        let deny = PermissionResult::deny_by_rule("Bash", PermissionRule::bash_exact("rm -rf /"));
        assert!(deny.is_deny());
        assert!(deny.suggestions().is_empty());
        assert!(matches!(deny.reason(), Some(DecisionReason::Rule { .. })));

        assert!(PermissionResult::allow().is_allow());
    }

    #[test]
    fn test_decision_durations() {
        assert_eq!(PermissionDecision::AllowOnce.rule_duration(), None);
        assert_eq!(
            PermissionDecision::AllowForSession.rule_duration(),
            Some(RuleDuration::Temporary)
        );
        assert_eq!(
            PermissionDecision::AllowAlways.rule_duration(),
            Some(RuleDuration::Permanent)
        );
        assert!(!PermissionDecision::Reject.is_allow());
    }

    #[test]
    fn test_result_serializes_with_behavior_tag() {
        let ask = PermissionResult::ask_because("Bash", vec![], DecisionReason::MultipleCd);
        let json = serde_json::to_value(&ask).unwrap();
        assert_eq!(json["behavior"], "ask");
        assert_eq!(json["reason"]["type"], "multipleCd");
    }
}
