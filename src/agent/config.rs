//! Agent Configuration
//!
//! Options for the turn loop, built with `with_*` methods.

use std::sync::Arc;

use crate::llm::{ThinkingConfig, ToolDefinition, DEFAULT_MAX_TOKENS};
use crate::tools::ToolRegistry;

/// Context size (input plus output tokens of the last request) above which
/// history is compacted before the next request
pub const DEFAULT_AUTO_COMPACT_THRESHOLD: u32 = 184_000;

/// Model round trips allowed per user prompt
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Configuration for a StandardAgent
///
/// ```ignore
/// let config = AgentConfig::new(system_prompt)
///     .with_tools(Arc::new(ToolRegistry::with_defaults()))
///     .with_fallback_model("claude-haiku-4-5")
///     .with_max_iterations(20);
/// ```
#[derive(Clone)]
pub struct AgentConfig {
    /// System prompt sent with every request
    pub system_prompt: String,

    pub tools: Arc<ToolRegistry>,

    /// Model to switch to once when the primary one is rate limited or overloaded
    pub fallback_model: Option<String>,

    /// Max tokens used when building the fallback provider
    pub fallback_max_tokens: u32,

    /// `None` disables auto-compaction
    pub auto_compact_threshold: Option<u32>,

    pub max_iterations: usize,

    /// Write the session's usage statistics to local settings on exit
    pub save_stats: bool,

    pub thinking: Option<ThinkingConfig>,
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            tools: Arc::new(ToolRegistry::new()),
            fallback_model: None,
            fallback_max_tokens: DEFAULT_MAX_TOKENS,
            auto_compact_threshold: Some(DEFAULT_AUTO_COMPACT_THRESHOLD),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            save_stats: true,
            thinking: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub fn with_fallback_max_tokens(mut self, max_tokens: u32) -> Self {
        self.fallback_max_tokens = max_tokens;
        self
    }

    pub fn with_auto_compact_threshold(mut self, threshold: Option<u32>) -> Self {
        self.auto_compact_threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_save_stats(mut self, save: bool) -> Self {
        self.save_stats = save;
        self
    }

    /// Enable extended thinking with the given token budget
    pub fn with_thinking(mut self, budget_tokens: u32) -> Self {
        self.thinking = Some(ThinkingConfig::enabled(budget_tokens));
        self
    }

    /// Definitions of every registered tool, sorted by name
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    /// Whether a request of `context_tokens` should trigger compaction
    pub fn should_auto_compact(&self, context_tokens: u32) -> bool {
        self.auto_compact_threshold
            .is_some_and(|threshold| context_tokens >= threshold)
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("system_prompt_len", &self.system_prompt.len())
            .field("tools", &self.tools.tool_names())
            .field("fallback_model", &self.fallback_model)
            .field("auto_compact_threshold", &self.auto_compact_threshold)
            .field("max_iterations", &self.max_iterations)
            .field("thinking", &self.thinking.is_some())
            .finish()
    }
}
