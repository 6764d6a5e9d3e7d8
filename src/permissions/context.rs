//! Session-scoped permission context
//!
//! Holds every remembered rule together with its behavior and duration.
//! Permanent rules come from the local settings file and are written back
//! when the user picks "always allow". The context is shared as
//! `Arc<PermissionContext>` between the agent, its tools and the CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::rule::{PermissionRule, RuleBehavior, RuleDuration};
use crate::config::Settings;
use crate::core::{FrameworkError, FrameworkResult};

/// How permission prompts are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask for anything not covered by a rule
    #[default]
    Default,
    /// File edits inside the working directory are allowed
    AcceptEdits,
    /// Everything not explicitly denied is allowed
    BypassPermissions,
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        };
        f.write_str(s)
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            other => Err(format!(
                "unknown permission mode '{}' (expected default, acceptEdits or bypassPermissions)",
                other
            )),
        }
    }
}

/// A rule with its behavior and lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRule {
    pub rule: PermissionRule,
    pub behavior: RuleBehavior,
    pub duration: RuleDuration,
}

#[derive(Debug, Default)]
struct ContextState {
    rules: Vec<StoredRule>,
    mode: PermissionMode,
}

/// Remembered permission decisions for one session
#[derive(Debug)]
pub struct PermissionContext {
    state: RwLock<ContextState>,
    /// Whether the session can prompt the user
    interactive: bool,
    /// Where permanent rules are persisted
    settings_path: Option<PathBuf>,
}

impl Default for PermissionContext {
    fn default() -> Self {
        Self::new(PermissionMode::Default)
    }
}

impl PermissionContext {
    /// In-memory context with no settings file
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            state: RwLock::new(ContextState {
                rules: Vec::new(),
                mode,
            }),
            interactive: true,
            settings_path: None,
        }
    }

    /// Load permanent rules from the settings file at `path`
    pub fn load(path: impl Into<PathBuf>, mode: PermissionMode) -> FrameworkResult<Self> {
        let path = path.into();
        let settings = Settings::load(&path)?;
        let mut ctx = Self::new(mode);
        ctx.settings_path = Some(path);

        {
            let mut state = ctx.write();
            let groups = [
                (settings.permissions.allow, RuleBehavior::Allow),
                (settings.permissions.deny, RuleBehavior::Deny),
                (settings.permissions.ask, RuleBehavior::Ask),
            ];
            for (rules, behavior) in groups {
                for rule in rules {
                    state.rules.push(StoredRule {
                        rule,
                        behavior,
                        duration: RuleDuration::Permanent,
                    });
                }
            }
            tracing::info!(rules = state.rules.len(), "Loaded permission rules");
        }

        Ok(ctx)
    }

    /// Set whether the session can prompt; `Ask` results are refused when it cannot
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn mode(&self) -> PermissionMode {
        self.read().mode
    }

    pub fn set_mode(&self, mode: PermissionMode) {
        tracing::info!(%mode, "Permission mode changed");
        self.write().mode = mode;
    }

    pub fn settings_path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a rule; permanent rules are persisted immediately
    pub fn add_rule(
        &self,
        rule: PermissionRule,
        behavior: RuleBehavior,
        duration: RuleDuration,
    ) -> FrameworkResult<()> {
        {
            let mut state = self.write();
            let exists = state
                .rules
                .iter()
                .any(|r| r.rule == rule && r.behavior == behavior && r.duration == duration);
            if exists {
                return Ok(());
            }
            tracing::info!(rule = %rule, ?behavior, ?duration, "Adding permission rule");
            state.rules.push(StoredRule {
                rule,
                behavior,
                duration,
            });
        }

        if duration == RuleDuration::Permanent {
            self.persist()?;
        }
        Ok(())
    }

    /// Remove a rule; returns whether anything was removed
    pub fn remove_rule(&self, rule: &PermissionRule, behavior: RuleBehavior) -> FrameworkResult<bool> {
        let removed_permanent = {
            let mut state = self.write();
            let before = state.rules.len();
            let had_permanent = state.rules.iter().any(|r| {
                &r.rule == rule && r.behavior == behavior && r.duration == RuleDuration::Permanent
            });
            state
                .rules
                .retain(|r| !(&r.rule == rule && r.behavior == behavior));
            if state.rules.len() == before {
                return Ok(false);
            }
            had_permanent
        };

        if removed_permanent {
            self.persist()?;
        }
        Ok(true)
    }

    /// Snapshot of all rules
    pub fn rules(&self) -> Vec<StoredRule> {
        self.read().rules.clone()
    }

    /// First rule with `behavior` satisfying `pred`
    pub fn find_rule(
        &self,
        behavior: RuleBehavior,
        pred: impl Fn(&PermissionRule) -> bool,
    ) -> Option<PermissionRule> {
        self.read()
            .rules
            .iter()
            .find(|r| r.behavior == behavior && pred(&r.rule))
            .map(|r| r.rule.clone())
    }

    /// Tool-wide rule (`Edit`) with the given behavior
    pub fn tool_rule(&self, tool_name: &str, behavior: RuleBehavior) -> Option<PermissionRule> {
        self.find_rule(behavior, |r| r.tool_name == tool_name && r.is_tool_wide())
    }

    /// Rule matching `command` exactly, or a tool-wide rule
    pub fn exact_rule(
        &self,
        tool_name: &str,
        command: &str,
        behavior: RuleBehavior,
    ) -> Option<PermissionRule> {
        self.find_rule(behavior, |r| {
            (r.tool_name == tool_name && r.is_tool_wide()) || r.matches_exact(tool_name, command)
        })
    }

    /// Prefix rule covering `prefix`
    pub fn prefix_rule(
        &self,
        tool_name: &str,
        prefix: &str,
        behavior: RuleBehavior,
    ) -> Option<PermissionRule> {
        self.find_rule(behavior, |r| r.matches_prefix(tool_name, prefix))
    }

    /// Path rule (`Read(src/**)`) or tool-wide rule matching `path`
    pub fn path_rule(
        &self,
        tool_name: &str,
        path: &str,
        behavior: RuleBehavior,
    ) -> Option<PermissionRule> {
        self.find_rule(behavior, |r| r.matches_path(tool_name, path))
    }

    /// Write all permanent rules to the settings file
    fn persist(&self) -> FrameworkResult<()> {
        let Some(path) = &self.settings_path else {
            tracing::debug!("No settings path, permanent rules stay in memory");
            return Ok(());
        };

        let rules = self.rules();
        Settings::update(path, |settings| {
            let permissions = &mut settings.permissions;
            permissions.allow.clear();
            permissions.deny.clear();
            permissions.ask.clear();
            for stored in rules
                .into_iter()
                .filter(|r| r.duration == RuleDuration::Permanent)
            {
                match stored.behavior {
                    RuleBehavior::Allow => permissions.allow.push(stored.rule),
                    RuleBehavior::Deny => permissions.deny.push(stored.rule),
                    RuleBehavior::Ask => permissions.ask.push(stored.rule),
                }
            }
        })
        .map_err(|e| FrameworkError::InvalidConfig(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_by_kind() {
        let ctx = PermissionContext::default();
        ctx.add_rule(
            PermissionRule::bash_exact("git status"),
            RuleBehavior::Allow,
            RuleDuration::Temporary,
        )
        .unwrap();
        ctx.add_rule(
            PermissionRule::bash_prefix("rm"),
            RuleBehavior::Deny,
            RuleDuration::Temporary,
        )
        .unwrap();
        ctx.add_rule(PermissionRule::tool("Glob"), RuleBehavior::Allow, RuleDuration::Temporary)
            .unwrap();

        assert!(ctx.exact_rule("Bash", "git status", RuleBehavior::Allow).is_some());
        assert!(ctx.exact_rule("Bash", "git status", RuleBehavior::Deny).is_none());
        assert!(ctx.prefix_rule("Bash", "rm", RuleBehavior::Deny).is_some());
        assert!(ctx.prefix_rule("Bash", "rmdir", RuleBehavior::Deny).is_none());
        assert!(ctx.tool_rule("Glob", RuleBehavior::Allow).is_some());
        assert!(ctx.tool_rule("Bash", RuleBehavior::Allow).is_none());
    }

    #[test]
    fn test_duplicate_rules_are_ignored() {
        let ctx = PermissionContext::default();
        for _ in 0..3 {
            ctx.add_rule(PermissionRule::tool("Edit"), RuleBehavior::Allow, RuleDuration::Temporary)
                .unwrap();
        }
        assert_eq!(ctx.rules().len(), 1);
    }

    #[test]
    fn test_permanent_rules_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = Settings::local_path(dir.path());

        let ctx = PermissionContext::load(&path, PermissionMode::Default).unwrap();
        ctx.add_rule(
            PermissionRule::bash_prefix("npm test"),
            RuleBehavior::Allow,
            RuleDuration::Permanent,
        )
        .unwrap();
        ctx.add_rule(
            PermissionRule::bash_prefix("ls"),
            RuleBehavior::Allow,
            RuleDuration::Temporary,
        )
        .unwrap();

        let reloaded = PermissionContext::load(&path, PermissionMode::Default).unwrap();
        let rules = reloaded.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule, PermissionRule::bash_prefix("npm test"));
        assert_eq!(rules[0].duration, RuleDuration::Permanent);

        assert!(reloaded
            .remove_rule(&PermissionRule::bash_prefix("npm test"), RuleBehavior::Allow)
            .unwrap());
        let again = PermissionContext::load(&path, PermissionMode::Default).unwrap();
        assert!(again.rules().is_empty());
    }

    #[test]
    fn test_mode_parse_and_display() {
        let mode: PermissionMode = "acceptEdits".parse().unwrap();
        assert_eq!(mode, PermissionMode::AcceptEdits);
        assert_eq!(PermissionMode::BypassPermissions.to_string(), "bypassPermissions");
        assert!("yolo".parse::<PermissionMode>().is_err());

        let ctx = PermissionContext::default();
        ctx.set_mode(mode);
        assert_eq!(ctx.mode(), PermissionMode::AcceptEdits);
    }
}
