//! AgentHandle - external interface to a running agent
//!
//! The console and tests use the handle to send input, subscribe to
//! streamed output, interrupt the running turn and watch the agent state.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::{AgentState, FrameworkError, FrameworkResult, InputMessage};
use crate::permissions::{PermissionContext, PermissionDecision};

use super::channels::{InputSender, OutputReceiver, OutputSender};
use super::internals::TurnSignal;

/// Handle for interacting with a running agent
///
/// Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct AgentHandle {
    session_id: String,
    input_tx: InputSender,
    output_tx: OutputSender,
    state: Arc<RwLock<AgentState>>,
    signal: TurnSignal,
    permissions: Arc<PermissionContext>,
}

impl AgentHandle {
    pub fn new(
        session_id: impl Into<String>,
        input_tx: InputSender,
        output_tx: OutputSender,
        state: Arc<RwLock<AgentState>>,
        signal: TurnSignal,
        permissions: Arc<PermissionContext>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            input_tx,
            output_tx,
            state,
            signal,
            permissions,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Permission rules and mode of the session
    pub fn permissions(&self) -> &Arc<PermissionContext> {
        &self.permissions
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Send a prompt; while a turn runs it is queued for the next tool round
    pub async fn send_input(&self, input: impl Into<String>) -> FrameworkResult<()> {
        self.send(InputMessage::UserInput(input.into())).await
    }

    /// Answer a pending permission request
    pub async fn respond_permission(
        &self,
        tool_use_id: impl Into<String>,
        decision: PermissionDecision,
    ) -> FrameworkResult<()> {
        self.send(InputMessage::permission(tool_use_id, decision)).await
    }

    pub async fn compact(&self) -> FrameworkResult<()> {
        self.send(InputMessage::Compact).await
    }

    /// Cancel the running turn
    ///
    /// Takes effect immediately: streaming, permission prompts and tools all
    /// watch the same token.
    pub fn interrupt(&self) {
        tracing::info!(session_id = %self.session_id, "Interrupt requested");
        self.signal.interrupt();
    }

    /// Stop the agent after interrupting any running turn
    pub async fn shutdown(&self) -> FrameworkResult<()> {
        self.signal.interrupt();
        self.send(InputMessage::Shutdown).await
    }

    pub async fn send(&self, message: InputMessage) -> FrameworkResult<()> {
        self.input_tx
            .send(message)
            .await
            .map_err(|_| FrameworkError::ChannelClosed)
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Receiver for every output chunk from this point on
    pub fn subscribe(&self) -> OutputReceiver {
        self.output_tx.subscribe()
    }

    // =========================================================================
    // State
    // =========================================================================

    pub async fn state(&self) -> AgentState {
        self.state.read().await.clone()
    }

    pub async fn is_idle(&self) -> bool {
        matches!(*self.state.read().await, AgentState::Idle)
    }

    /// Not done and not errored
    pub async fn is_running(&self) -> bool {
        !self.state.read().await.is_terminal()
    }

    /// Poll until the agent reaches a terminal state
    pub async fn wait_for_completion(&self) {
        while self.is_running().await {
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::channels::create_agent_channels;

    fn handle() -> (AgentHandle, super::super::channels::InputReceiver, TurnSignal) {
        let (input_tx, input_rx, output_tx) = create_agent_channels();
        let signal = TurnSignal::new();
        let handle = AgentHandle::new(
            "s1",
            input_tx,
            output_tx,
            Arc::new(RwLock::new(AgentState::Idle)),
            signal.clone(),
            Arc::new(PermissionContext::default()),
        );
        (handle, input_rx, signal)
    }

    #[tokio::test]
    async fn test_interrupt_cancels_current_turn() {
        let (handle, _rx, signal) = handle();
        let token = signal.begin_turn();
        handle.interrupt();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_respond_permission() {
        let (handle, mut rx, _signal) = handle();
        handle
            .respond_permission("toolu_9", PermissionDecision::AllowAlways)
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(InputMessage::PermissionResponse { tool_use_id, decision: PermissionDecision::AllowAlways })
                if tool_use_id == "toolu_9"
        ));
    }

    #[tokio::test]
    async fn test_send_after_agent_gone() {
        let (handle, rx, _signal) = handle();
        drop(rx);
        let err = handle.send_input("hello").await.unwrap_err();
        assert!(matches!(err, FrameworkError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_state_queries() {
        let (handle, _rx, _signal) = handle();
        assert!(handle.is_idle().await);
        assert!(handle.is_running().await);
        *handle.state.write().await = AgentState::Done;
        assert!(!handle.is_running().await);
        handle.wait_for_completion().await;
    }
}
