//! The assistant: configuration, turn loop and tool execution

pub mod compactor;
pub mod config;
pub mod executor;
pub mod stream;
pub mod system_prompt;
pub mod turn_loop;

pub use config::{AgentConfig, DEFAULT_AUTO_COMPACT_THRESHOLD, DEFAULT_MAX_ITERATIONS};
pub use executor::{ExecutionOutcome, ToolExecutor, ToolUse, MAX_TOOL_CONCURRENCY};
pub use system_prompt::{default_system_prompt, SYSTEM_PROMPT};
pub use turn_loop::{StandardAgent, TurnOutcome, INTERRUPT_MESSAGE};
