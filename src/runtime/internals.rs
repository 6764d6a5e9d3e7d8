//! AgentInternals - state and channels owned by the running agent task
//!
//! The agent task receives this when spawned. It is the only reader of the
//! input channel, so everything that waits for the user (permission answers,
//! queued prompts) goes through it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentState, FrameworkError, FrameworkResult, InputMessage, OutputChunk};
use crate::permissions::{PermissionDecision, ToolUseConfirm};
use crate::session::Session;
use crate::tools::{ToolContext, ToolResult};

use super::channels::{InputReceiver, OutputSender};

/// Abort signal shared between the agent task and its handle
///
/// A fresh token is installed for every turn so an interrupt only stops the
/// turn that was running when it arrived.
#[derive(Clone, Default)]
pub struct TurnSignal {
    current: Arc<Mutex<CancellationToken>>,
}

impl TurnSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install and return a fresh token for a new turn
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// Token of the running turn
    pub fn current(&self) -> CancellationToken {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel the running turn
    pub fn interrupt(&self) {
        self.current().cancel();
    }
}

/// Internal state and channels for the agent task
pub struct AgentInternals {
    pub session: Session,

    /// Context handed to tools; its abort token is replaced per turn
    pub tools: ToolContext,

    input_rx: InputReceiver,
    output_tx: OutputSender,
    state: Arc<RwLock<AgentState>>,
    signal: TurnSignal,

    /// User prompts that arrived while a turn was running
    queued_inputs: VecDeque<String>,
    compact_requested: bool,
    shutdown_requested: bool,
}

impl AgentInternals {
    pub fn new(
        session: Session,
        tools: ToolContext,
        input_rx: InputReceiver,
        output_tx: OutputSender,
        state: Arc<RwLock<AgentState>>,
        signal: TurnSignal,
    ) -> Self {
        Self {
            session,
            tools,
            input_rx,
            output_tx,
            state,
            signal,
            queued_inputs: VecDeque::new(),
            compact_requested: false,
            shutdown_requested: false,
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Next input message, serving queued prompts first
    ///
    /// Returns `None` once the handle is gone or shutdown was requested.
    pub async fn receive(&mut self) -> Option<InputMessage> {
        if self.shutdown_requested {
            return None;
        }
        if self.compact_requested {
            self.compact_requested = false;
            return Some(InputMessage::Compact);
        }
        if let Some(text) = self.queued_inputs.pop_front() {
            return Some(InputMessage::UserInput(text));
        }
        self.input_rx.recv().await
    }

    /// Sort a message that arrived mid-turn
    fn stash(&mut self, message: InputMessage) {
        match message {
            InputMessage::UserInput(text) => self.queued_inputs.push_back(text),
            InputMessage::Compact => self.compact_requested = true,
            InputMessage::Shutdown => self.shutdown_requested = true,
            InputMessage::PermissionResponse { tool_use_id, .. } => {
                tracing::warn!(%tool_use_id, "Permission response with no pending request");
            }
        }
    }

    /// Pull everything already waiting on the input channel and return the
    /// queued prompts
    pub fn drain_queued_inputs(&mut self) -> Vec<String> {
        while let Ok(message) = self.input_rx.try_recv() {
            self.stash(message);
        }
        self.queued_inputs.drain(..).collect()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Ask the user about a tool use and wait for the answer
    ///
    /// Other input arriving meanwhile is queued. Cancelling `abort` returns
    /// `FrameworkError::Aborted`.
    pub async fn await_permission(
        &mut self,
        confirm: ToolUseConfirm,
        abort: &CancellationToken,
    ) -> FrameworkResult<PermissionDecision> {
        let tool_use_id = confirm.tool_use_id.clone();
        self.set_state(AgentState::WaitingForPermission {
            tool_use_id: tool_use_id.clone(),
        })
        .await;
        self.send(OutputChunk::PermissionRequest(confirm));

        loop {
            let message = tokio::select! {
                _ = abort.cancelled() => return Err(FrameworkError::Aborted),
                message = self.input_rx.recv() => message,
            };
            match message {
                Some(InputMessage::PermissionResponse {
                    tool_use_id: answered,
                    decision,
                }) if answered == tool_use_id => return Ok(decision),
                Some(InputMessage::Shutdown) => {
                    self.shutdown_requested = true;
                    return Err(FrameworkError::Shutdown);
                }
                Some(other) => self.stash(other),
                None => return Err(FrameworkError::ChannelClosed),
            }
        }
    }

    // =========================================================================
    // Turn signal
    // =========================================================================

    /// Start a turn: fresh abort token, bound into the tool context
    pub fn begin_turn(&mut self) -> CancellationToken {
        let token = self.signal.begin_turn();
        self.tools = self.tools.with_abort(token.clone());
        token
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Send an output chunk to all subscribers; 0 when nobody listens
    pub fn send(&self, chunk: OutputChunk) -> usize {
        self.output_tx.send(chunk).unwrap_or(0)
    }

    pub fn send_text(&self, text: impl Into<String>) -> usize {
        self.send(OutputChunk::TextDelta(text.into()))
    }

    pub fn send_thinking(&self, text: impl Into<String>) -> usize {
        self.send(OutputChunk::ThinkingDelta(text.into()))
    }

    pub fn send_status(&self, status: impl Into<String>) -> usize {
        self.send(OutputChunk::Status(status.into()))
    }

    pub fn send_error(&self, error: impl Into<String>) -> usize {
        self.send(OutputChunk::Error(error.into()))
    }

    pub fn send_done(&self) -> usize {
        self.send(OutputChunk::Done)
    }

    pub fn send_tool_start(&self, id: &str, name: &str, input: &serde_json::Value) -> usize {
        self.send(OutputChunk::ToolStart {
            id: id.to_string(),
            name: name.to_string(),
            input: input.clone(),
        })
    }

    pub fn send_tool_end(&self, id: &str, name: &str, result: &ToolResult) -> usize {
        self.send(OutputChunk::ToolEnd {
            id: id.to_string(),
            name: name.to_string(),
            result: result.clone(),
        })
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Set the state and notify subscribers
    pub async fn set_state(&self, new_state: AgentState) {
        *self.state.write().await = new_state.clone();
        self.send(OutputChunk::StateChange(new_state));
    }

    pub async fn state(&self) -> AgentState {
        self.state.read().await.clone()
    }

    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }
}

impl std::fmt::Debug for AgentInternals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentInternals")
            .field("session_id", &self.session.session_id())
            .field("queued_inputs", &self.queued_inputs.len())
            .field("subscriber_count", &self.output_tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::permissions::{PermissionContext, PermissionResult};
    use crate::runtime::channels::{create_agent_channels, InputSender, OutputReceiver};
    use serde_json::json;

    pub(crate) fn create_test_internals() -> (AgentInternals, InputSender, OutputReceiver) {
        let (input_tx, input_rx, output_tx) = create_agent_channels();
        let output_rx = output_tx.subscribe();
        let tools = ToolContext::new("/work", Arc::new(PermissionContext::default()));
        let internals = AgentInternals::new(
            Session::ephemeral("test-model", "/work"),
            tools,
            input_rx,
            output_tx,
            Arc::new(RwLock::new(AgentState::Idle)),
            TurnSignal::new(),
        );
        (internals, input_tx, output_rx)
    }

    fn confirm(id: &str) -> ToolUseConfirm {
        ToolUseConfirm::new(
            id,
            "Bash",
            json!({"command": "make"}),
            "make",
            &PermissionResult::ask("Bash", vec![]),
            "msg_1",
        )
    }

    #[tokio::test]
    async fn test_await_permission_queues_other_input() {
        let (mut internals, input_tx, mut output_rx) = create_test_internals();

        input_tx.send(InputMessage::user_input("also run tests")).await.unwrap();
        input_tx
            .send(InputMessage::permission("other", PermissionDecision::AllowOnce))
            .await
            .unwrap();
        input_tx
            .send(InputMessage::permission("toolu_1", PermissionDecision::AllowForSession))
            .await
            .unwrap();

        let abort = CancellationToken::new();
        let decision = internals.await_permission(confirm("toolu_1"), &abort).await.unwrap();
        assert_eq!(decision, PermissionDecision::AllowForSession);
        assert_eq!(internals.drain_queued_inputs(), vec!["also run tests".to_string()]);

        // State change first, then the request itself
        assert!(matches!(output_rx.recv().await.unwrap(), OutputChunk::StateChange(_)));
        assert!(matches!(
            output_rx.recv().await.unwrap(),
            OutputChunk::PermissionRequest(c) if c.tool_use_id == "toolu_1"
        ));
    }

    #[tokio::test]
    async fn test_await_permission_aborts() {
        let (mut internals, _input_tx, _output_rx) = create_test_internals();
        let abort = CancellationToken::new();
        abort.cancel();
        let err = internals.await_permission(confirm("t"), &abort).await.unwrap_err();
        assert!(err.is_aborted());
    }

    #[tokio::test]
    async fn test_receive_serves_queue_first() {
        let (mut internals, input_tx, _output_rx) = create_test_internals();
        input_tx.send(InputMessage::user_input("queued")).await.unwrap();
        input_tx.send(InputMessage::Compact).await.unwrap();
        internals.drain_queued_inputs();
        input_tx.send(InputMessage::user_input("later")).await.unwrap();

        // Drained prompts were handed out, the compact request remains
        assert!(matches!(internals.receive().await, Some(InputMessage::Compact)));
        assert!(matches!(internals.receive().await, Some(InputMessage::UserInput(s)) if s == "later"));
    }

    #[tokio::test]
    async fn test_shutdown_mid_turn_stops_receive() {
        let (mut internals, input_tx, _output_rx) = create_test_internals();
        input_tx.send(InputMessage::Shutdown).await.unwrap();
        internals.drain_queued_inputs();
        assert!(internals.shutdown_requested());
        assert!(internals.receive().await.is_none());
    }

    #[test]
    fn test_turn_signal_only_cancels_current_turn() {
        let signal = TurnSignal::new();
        let first = signal.begin_turn();
        signal.interrupt();
        assert!(first.is_cancelled());

        let second = signal.begin_turn();
        assert!(!second.is_cancelled());
        assert!(!signal.current().is_cancelled());
    }
}
