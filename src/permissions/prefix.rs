//! Command prefix and injection detection
//!
//! A prefix is the part of a command that identifies what it does
//! (`git diff` for `git diff --stat HEAD~1`). Prefixes back the
//! `Bash(<prefix>:*)` rules suggested to the user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::core::{FrameworkError, FrameworkResult};
use crate::llm::LlmProvider;

/// Detected prefix of one command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrefixResult {
    /// The prefix, when one could be determined
    pub prefix: Option<String>,
    /// The command looks like it smuggles another command
    pub injection_detected: bool,
}

impl PrefixResult {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            injection_detected: false,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn injection() -> Self {
        Self {
            prefix: None,
            injection_detected: true,
        }
    }
}

/// Prefixes of a full command and each of its subcommands
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandPrefixResult {
    pub command: PrefixResult,
    pub subcommands: HashMap<String, PrefixResult>,
}

/// Source of command prefixes
#[async_trait]
pub trait PrefixDetector: Send + Sync {
    /// Detect prefixes for `command` and its `subcommands`
    ///
    /// Returns `Ok(None)` when detection is unavailable and
    /// `Err(FrameworkError::Aborted)` when `abort` fires.
    async fn detect(
        &self,
        command: &str,
        subcommands: &[String],
        abort: &CancellationToken,
    ) -> FrameworkResult<Option<CommandPrefixResult>>;
}

/// Commands whose second word names the action
const MULTI_LEVEL_COMMANDS: &[&str] = &[
    "git", "npm", "npx", "yarn", "pnpm", "cargo", "docker", "kubectl", "go", "pip", "pip3",
    "poetry", "uv", "gh", "make", "bun", "deno", "brew", "apt", "apt-get", "dotnet", "mvn",
    "gradle", "terraform", "helm", "rustup", "systemctl",
];

/// Prefix detection from the command words alone
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicPrefixDetector;

impl HeuristicPrefixDetector {
    pub fn new() -> Self {
        Self
    }

    /// Prefix of a single command
    pub fn prefix_for(command: &str) -> PrefixResult {
        if command.contains("$(") || command.contains('`') {
            return PrefixResult::injection();
        }

        let words = match shell_words::split(command) {
            Ok(words) => words,
            Err(_) => return PrefixResult::none(),
        };

        let mut prefix: Vec<&str> = Vec::new();
        let mut iter = words.iter().map(String::as_str).peekable();

        // Leading VAR=value assignments stay part of the prefix
        while let Some(&word) = iter.peek() {
            if is_env_assignment(word) {
                prefix.push(word);
                iter.next();
            } else {
                break;
            }
        }

        let Some(program) = iter.next() else {
            return PrefixResult::none();
        };
        prefix.push(program);

        let program_name = program.rsplit('/').next().unwrap_or(program);
        if MULTI_LEVEL_COMMANDS.contains(&program_name) {
            if let Some(sub) = iter.next() {
                if !sub.starts_with('-') && is_plain_word(sub) {
                    prefix.push(sub);
                }
            }
        }

        PrefixResult::prefix(prefix.join(" "))
    }
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_plain_word(word: &str) -> bool {
    word.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.' | '@'))
}

#[async_trait]
impl PrefixDetector for HeuristicPrefixDetector {
    async fn detect(
        &self,
        command: &str,
        subcommands: &[String],
        abort: &CancellationToken,
    ) -> FrameworkResult<Option<CommandPrefixResult>> {
        if abort.is_cancelled() {
            return Err(FrameworkError::Aborted);
        }
        Ok(Some(CommandPrefixResult {
            command: Self::prefix_for(command),
            subcommands: subcommands
                .iter()
                .map(|s| (s.clone(), Self::prefix_for(s)))
                .collect(),
        }))
    }
}

const PREFIX_SYSTEM_PROMPT: &str = "Your task is to process Bash commands that an AI coding agent wants to run.

Return the command prefix: the leading words that identify what the command does, so that a user can approve all commands starting with it.

Rules:
- Return ONLY the prefix, with no explanation or formatting.
- If the command has no meaningful prefix, return: none
- If the command appears to contain command injection (a second command hidden in arguments, substitution, or unusual quoting), return: command_injection_detected

Examples:
- cat foo.txt => cat
- git diff --stat HEAD~1 => git diff
- npm run lint -- --fix => npm run lint
- FOO=bar go test ./... => FOO=bar go test
- git status`ls` => command_injection_detected
- pwd
 whoami => command_injection_detected";

const INJECTION_MARKER: &str = "command_injection_detected";

/// Prefix detection by a small fast model, with results cached per command
pub struct ModelPrefixDetector {
    provider: Arc<dyn LlmProvider>,
    cache: Mutex<HashMap<String, PrefixResult>>,
}

impl ModelPrefixDetector {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, command: &str) -> Option<PrefixResult> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .cloned()
    }

    async fn prefix_for(&self, command: &str) -> anyhow::Result<PrefixResult> {
        if let Some(hit) = self.cached(command) {
            return Ok(hit);
        }

        let reply = self
            .provider
            .send_message(
                &format!("Command: {}", command),
                &[],
                Some(PREFIX_SYSTEM_PROMPT),
            )
            .await?;
        let result = interpret_reply(command, &reply);
        tracing::debug!(command, ?result, "Detected command prefix");

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.to_string(), result.clone());
        Ok(result)
    }
}

/// Turn the model's reply into a prefix result
fn interpret_reply(command: &str, reply: &str) -> PrefixResult {
    let reply = reply.trim();
    if reply == INJECTION_MARKER {
        return PrefixResult::injection();
    }
    if reply.is_empty() || reply.eq_ignore_ascii_case("none") {
        return PrefixResult::none();
    }
    // The reply must end on a word boundary of the command
    let command = command.trim_start();
    let on_boundary = match command.strip_prefix(reply) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    };
    if !on_boundary {
        return PrefixResult::none();
    }
    PrefixResult::prefix(reply)
}

#[async_trait]
impl PrefixDetector for ModelPrefixDetector {
    async fn detect(
        &self,
        command: &str,
        subcommands: &[String],
        abort: &CancellationToken,
    ) -> FrameworkResult<Option<CommandPrefixResult>> {
        let work = async {
            let full = self.prefix_for(command);
            let subs = join_all(subcommands.iter().map(|s| self.prefix_for(s)));
            let (full, subs) = futures::join!(full, subs);

            let mut result = CommandPrefixResult {
                command: full?,
                subcommands: HashMap::new(),
            };
            for (sub, prefix) in subcommands.iter().zip(subs) {
                result.subcommands.insert(sub.clone(), prefix?);
            }
            anyhow::Ok(result)
        };

        tokio::select! {
            _ = abort.cancelled() => Err(FrameworkError::Aborted),
            outcome = work => match outcome {
                Ok(result) => Ok(Some(result)),
                Err(e) => {
                    tracing::warn!(error = %e, "Prefix detection failed");
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedProvider;

    #[test]
    fn test_heuristic_prefixes() {
        let p = |c: &str| HeuristicPrefixDetector::prefix_for(c).prefix;
        assert_eq!(p("git diff --stat HEAD~1"), Some("git diff".into()));
        assert_eq!(p("git -C repo status"), Some("git".into()));
        assert_eq!(p("cat foo.txt"), Some("cat".into()));
        assert_eq!(p("npm test"), Some("npm test".into()));
        assert_eq!(p("FOO=bar go test ./..."), Some("FOO=bar go test".into()));
        assert_eq!(p("/usr/bin/cargo build --release"), Some("/usr/bin/cargo build".into()));
        assert_eq!(p("echo 'unterminated"), None);
        assert!(HeuristicPrefixDetector::prefix_for("git status `ls`").injection_detected);
    }

    #[test]
    fn test_interpret_reply() {
        assert_eq!(interpret_reply("git diff HEAD", "git diff\n"), PrefixResult::prefix("git diff"));
        assert_eq!(interpret_reply("git diff", "none"), PrefixResult::none());
        assert_eq!(interpret_reply("ls; rm", INJECTION_MARKER), PrefixResult::injection());
        assert_eq!(interpret_reply("ls -la", "rm"), PrefixResult::none());
    }

    #[test]
    fn test_reply_must_end_on_word_boundary() {
        assert_eq!(interpret_reply("gitx --evil", "git"), PrefixResult::none());
        assert_eq!(interpret_reply("npm testing", "npm test"), PrefixResult::none());
        assert_eq!(interpret_reply("make", "make"), PrefixResult::prefix("make"));
        assert_eq!(interpret_reply("git\tstatus", "git"), PrefixResult::prefix("git"));
    }

    #[tokio::test]
    async fn test_model_detector_caches() {
        let provider = ScriptedProvider::new("small");
        provider.push_message_reply("npm test");
        let detector = ModelPrefixDetector::new(Arc::new(provider.clone()));
        let abort = CancellationToken::new();

        let first = detector.detect("npm test", &[], &abort).await.unwrap().unwrap();
        assert_eq!(first.command.prefix.as_deref(), Some("npm test"));

        // Served from cache; the script has no more replies
        let second = detector.detect("npm test", &[], &abort).await.unwrap().unwrap();
        assert_eq!(second.command, first.command);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_yields_none() {
        let provider = ScriptedProvider::new("small");
        let detector = ModelPrefixDetector::new(Arc::new(provider));
        let result = detector
            .detect("make", &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_abort_during_detection() {
        let abort = CancellationToken::new();
        abort.cancel();
        let err = HeuristicPrefixDetector::new()
            .detect("ls", &[], &abort)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}
