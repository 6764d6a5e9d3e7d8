//! Permission rules in `Tool(content)` form
//!
//! A rule targets a whole tool (`Edit`) or a specific input of a tool:
//! `Bash(git status)` matches exactly that command, `Bash(npm test:*)`
//! matches any command starting with `npm test`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Suffix marking a prefix rule
const PREFIX_MARKER: &str = ":*";

/// What a matching rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleBehavior {
    Allow,
    Deny,
    Ask,
}

/// How long a rule lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDuration {
    /// In memory for the current session only
    Temporary,
    /// Loaded from and written back to the local settings file
    Permanent,
}

/// A single permission rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionRule {
    /// Tool the rule applies to
    pub tool_name: String,
    /// Optional rule content (command, prefix or path pattern)
    pub content: Option<String>,
}

fn rule_regex() -> &'static Regex {
    static RULE_RE: OnceLock<Regex> = OnceLock::new();
    RULE_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9_]*)(?:\((.*)\))?$").expect("rule regex is valid")
    })
}

impl PermissionRule {
    /// Rule covering every use of a tool
    pub fn tool(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            content: None,
        }
    }

    /// Rule for a specific tool input
    pub fn with_content(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            content: Some(content.into()),
        }
    }

    /// `Bash(<command>)`
    pub fn bash_exact(command: impl Into<String>) -> Self {
        Self::with_content("Bash", command)
    }

    /// `Bash(<prefix>:*)`
    pub fn bash_prefix(prefix: &str) -> Self {
        Self::with_content("Bash", format!("{}{}", prefix, PREFIX_MARKER))
    }

    /// Parse a rule string such as `Bash(npm test:*)`
    pub fn parse(s: &str) -> Option<Self> {
        let caps = rule_regex().captures(s.trim())?;
        let tool_name = caps.get(1)?.as_str().to_string();
        let content = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|c| !c.is_empty());
        Some(Self { tool_name, content })
    }

    /// The command prefix if this is a prefix rule
    pub fn prefix(&self) -> Option<&str> {
        self.content
            .as_deref()
            .and_then(|c| c.strip_suffix(PREFIX_MARKER))
    }

    /// Whether this rule covers the whole tool
    pub fn is_tool_wide(&self) -> bool {
        self.content.is_none()
    }

    /// Whether this rule matches `command` exactly
    pub fn matches_exact(&self, tool_name: &str, command: &str) -> bool {
        self.tool_name == tool_name
            && self.prefix().is_none()
            && self.content.as_deref() == Some(command.trim())
    }

    /// Whether this prefix rule covers `prefix`
    ///
    /// The detected prefix must equal the rule prefix, or extend it at a
    /// word boundary (`git` covers `git status`).
    pub fn matches_prefix(&self, tool_name: &str, prefix: &str) -> bool {
        if self.tool_name != tool_name {
            return false;
        }
        match self.prefix() {
            Some(rule_prefix) => {
                prefix == rule_prefix
                    || prefix
                        .strip_prefix(rule_prefix)
                        .map_or(false, |rest| rest.starts_with(' '))
            }
            None => false,
        }
    }

    /// Whether a path-style rule matches the given path
    pub fn matches_path(&self, tool_name: &str, path: &str) -> bool {
        if self.tool_name != tool_name {
            return false;
        }
        match &self.content {
            None => true,
            Some(pattern) => glob::Pattern::new(pattern)
                .map(|p| p.matches(path))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Some(content) => write!(f, "{}({})", self.tool_name, content),
            None => write!(f, "{}", self.tool_name),
        }
    }
}

impl TryFrom<String> for PermissionRule {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid permission rule: {}", value))
    }
}

impl From<PermissionRule> for String {
    fn from(rule: PermissionRule) -> Self {
        rule.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let rule = PermissionRule::parse("Bash(npm test:*)").unwrap();
        assert_eq!(rule.tool_name, "Bash");
        assert_eq!(rule.prefix(), Some("npm test"));
        assert_eq!(rule.to_string(), "Bash(npm test:*)");

        let rule = PermissionRule::parse("Edit").unwrap();
        assert!(rule.is_tool_wide());
        assert_eq!(rule.to_string(), "Edit");

        let rule = PermissionRule::parse("Bash()").unwrap();
        assert!(rule.is_tool_wide());

        assert!(PermissionRule::parse("not a rule").is_none());
        assert!(PermissionRule::parse("").is_none());
    }

    #[test]
    fn test_content_with_parentheses() {
        let rule = PermissionRule::parse("Bash(echo (hi))").unwrap();
        assert_eq!(rule.content.as_deref(), Some("echo (hi)"));
    }

    #[test]
    fn test_exact_match() {
        let rule = PermissionRule::bash_exact("git status");
        assert!(rule.matches_exact("Bash", "git status"));
        assert!(rule.matches_exact("Bash", "  git status "));
        assert!(!rule.matches_exact("Bash", "git status -s"));
        assert!(!rule.matches_exact("Read", "git status"));
    }

    #[test]
    fn test_prefix_match_respects_word_boundary() {
        let rule = PermissionRule::bash_prefix("npm test");
        assert!(rule.matches_prefix("Bash", "npm test"));
        assert!(rule.matches_prefix("Bash", "npm test unit"));
        assert!(!rule.matches_prefix("Bash", "npm testing"));
        assert!(!rule.matches_prefix("Bash", "npm"));

        // Prefix rules never match exactly
        assert!(!rule.matches_exact("Bash", "npm test:*"));
    }

    #[test]
    fn test_path_match() {
        let rule = PermissionRule::parse("Read(src/**)").unwrap();
        assert!(rule.matches_path("Read", "src/lib.rs"));
        assert!(!rule.matches_path("Read", "Cargo.toml"));
        assert!(PermissionRule::tool("Read").matches_path("Read", "/etc/hosts"));
    }

    #[test]
    fn test_serde_as_string() {
        let rule = PermissionRule::bash_prefix("git diff");
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, "\"Bash(git diff:*)\"");
        let back: PermissionRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
