//! Agent state types

use serde::{Deserialize, Serialize};

/// Current state of an agent
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum AgentState {
    /// Agent is idle, waiting for input
    #[default]
    Idle,

    /// Agent is calling the model
    Processing,

    /// Agent is summarizing the conversation
    Compacting,

    /// Agent is waiting for a permission decision
    WaitingForPermission {
        /// Tool use awaiting the decision
        tool_use_id: String,
    },

    /// Agent is executing a tool
    ExecutingTool {
        /// Name of the tool being executed
        tool_name: String,
        /// ID of the tool use
        tool_use_id: String,
    },

    /// Agent has shut down
    Done,

    /// Agent encountered an error
    Error {
        /// Error message
        message: String,
    },
}

impl AgentState {
    /// Check if agent is in a terminal state (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Done | AgentState::Error { .. })
    }

    /// Create an error state
    pub fn error(msg: impl Into<String>) -> Self {
        AgentState::Error {
            message: msg.into(),
        }
    }

    /// Create an executing tool state
    pub fn executing_tool(name: impl Into<String>, id: impl Into<String>) -> Self {
        AgentState::ExecutingTool {
            tool_name: name.into(),
            tool_use_id: id.into(),
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Idle => write!(f, "Idle"),
            AgentState::Processing => write!(f, "Processing"),
            AgentState::Compacting => write!(f, "Compacting conversation"),
            AgentState::WaitingForPermission { tool_use_id } => {
                write!(f, "Waiting for permission: {}", tool_use_id)
            }
            AgentState::ExecutingTool { tool_name, .. } => {
                write!(f, "Executing tool: {}", tool_name)
            }
            AgentState::Done => write!(f, "Done"),
            AgentState::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_checks() {
        assert!(AgentState::Done.is_terminal());
        assert!(AgentState::error("oops").is_terminal());
        assert!(!AgentState::Idle.is_terminal());

        assert!(!AgentState::executing_tool("Bash", "123").is_terminal());
        assert!(!AgentState::Compacting.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            AgentState::executing_tool("Read", "t1").to_string(),
            "Executing tool: Read"
        );
        assert_eq!(AgentState::default(), AgentState::Idle);
    }
}
