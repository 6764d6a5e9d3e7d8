//! Input and output message types for agent communication

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::AgentState;
use crate::permissions::{PermissionDecision, ToolUseConfirm};
use crate::tools::ToolResult;

/// Messages that can be sent TO an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InputMessage {
    /// User input text. Input arriving while a turn is running is queued
    /// and appended to the conversation after the current tool round.
    UserInput(String),

    /// Answer to a pending `ToolUseConfirm`
    PermissionResponse {
        /// Tool use the answer belongs to
        tool_use_id: String,
        /// The user's decision
        decision: PermissionDecision,
    },

    /// Summarize the conversation now
    Compact,

    /// Request shutdown
    Shutdown,
}

/// Output chunks streamed FROM an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputChunk {
    /// Incremental text output
    TextDelta(String),

    /// Complete text block
    TextComplete(String),

    /// Incremental thinking output
    ThinkingDelta(String),

    /// Complete thinking block
    ThinkingComplete(String),

    /// An approved tool use started running
    ToolStart { id: String, name: String, input: Value },

    /// A tool use finished, was refused, or was cancelled
    ToolEnd {
        id: String,
        name: String,
        result: ToolResult,
    },

    /// A tool use is waiting for the user's decision
    PermissionRequest(ToolUseConfirm),

    /// Agent state changed
    StateChange(AgentState),

    /// Status update (for progress indicators)
    Status(String),

    /// Prompts queued during the turn were added to the conversation
    QueuedInputsAttached(usize),

    /// Error occurred
    Error(String),

    /// Agent completed this turn
    Done,
}

impl OutputChunk {
    /// Create a text delta chunk
    pub fn text(text: impl Into<String>) -> Self {
        OutputChunk::TextDelta(text.into())
    }

    /// `Done` ends the reply to one input
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutputChunk::Done)
    }
}

impl InputMessage {
    /// Create a user input message
    pub fn user_input(text: impl Into<String>) -> Self {
        InputMessage::UserInput(text.into())
    }

    /// Create a permission response
    pub fn permission(tool_use_id: impl Into<String>, decision: PermissionDecision) -> Self {
        InputMessage::PermissionResponse {
            tool_use_id: tool_use_id.into(),
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_done_is_terminal() {
        assert!(OutputChunk::Done.is_terminal());
        assert!(!OutputChunk::Error("oops".into()).is_terminal());
        assert!(!OutputChunk::text("hello").is_terminal());
        assert!(!OutputChunk::StateChange(AgentState::Done).is_terminal());
    }

    #[test]
    fn test_input_message_creation() {
        let msg = InputMessage::user_input("hello");
        assert!(matches!(msg, InputMessage::UserInput(s) if s == "hello"));

        let msg = InputMessage::permission("toolu_1", PermissionDecision::AllowOnce);
        assert!(matches!(
            msg,
            InputMessage::PermissionResponse {
                decision: PermissionDecision::AllowOnce,
                ..
            }
        ));
    }
}
