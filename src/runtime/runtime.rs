//! AgentRuntime - spawns agent tasks and tracks the running ones

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::{AgentState, FrameworkResult};
use crate::session::Session;
use crate::tools::ToolContext;

use super::channels::create_agent_channels;
use super::handle::AgentHandle;
use super::internals::{AgentInternals, TurnSignal};

/// Runtime for spawning and managing agents
#[derive(Clone, Default)]
pub struct AgentRuntime {
    agents: Arc<RwLock<HashMap<String, AgentHandle>>>,
}

impl AgentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an agent task
    ///
    /// `agent_fn` receives the `AgentInternals` and runs until shutdown. The
    /// agent state becomes `Done` when it returns `Ok` and `Error` otherwise.
    ///
    /// ```ignore
    /// let handle = runtime.spawn(session, tools, |mut internals| async move {
    ///     while let Some(InputMessage::UserInput(text)) = internals.receive().await {
    ///         internals.send_text(format!("You said: {}", text));
    ///         internals.send_done();
    ///     }
    ///     Ok(())
    /// }).await;
    /// ```
    pub async fn spawn<F, Fut>(&self, session: Session, tools: ToolContext, agent_fn: F) -> AgentHandle
    where
        F: FnOnce(AgentInternals) -> Fut + Send + 'static,
        Fut: Future<Output = FrameworkResult<()>> + Send + 'static,
    {
        let session_id = session.session_id().to_string();
        let (input_tx, input_rx, output_tx) = create_agent_channels();
        let state = Arc::new(RwLock::new(AgentState::Idle));
        let signal = TurnSignal::new();

        let handle = AgentHandle::new(
            session_id.clone(),
            input_tx,
            output_tx.clone(),
            state.clone(),
            signal.clone(),
            tools.permissions.clone(),
        );
        let internals = AgentInternals::new(session, tools, input_rx, output_tx, state.clone(), signal);

        self.agents
            .write()
            .await
            .insert(session_id.clone(), handle.clone());

        let agents = self.agents.clone();
        tokio::spawn(async move {
            let final_state = match agent_fn(internals).await {
                Ok(()) => AgentState::Done,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Agent task errored");
                    AgentState::error(e.to_string())
                }
            };
            agents.write().await.remove(&session_id);
            *state.write().await = final_state;
            tracing::debug!(session_id = %session_id, "Agent task completed");
        });

        handle
    }

    pub async fn get(&self, session_id: &str) -> Option<AgentHandle> {
        self.agents.read().await.get(session_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Send shutdown to every running agent and wait for them to finish
    pub async fn shutdown_all(&self) {
        let handles: Vec<AgentHandle> = self.agents.read().await.values().cloned().collect();
        for handle in &handles {
            if let Err(e) = handle.shutdown().await {
                tracing::debug!(session_id = %handle.session_id(), error = %e, "Agent already stopped");
            }
        }
        for handle in &handles {
            handle.wait_for_completion().await;
        }
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameworkError, InputMessage, OutputChunk};
    use crate::permissions::PermissionContext;

    fn tools() -> ToolContext {
        ToolContext::new("/work", Arc::new(PermissionContext::default()))
    }

    #[tokio::test]
    async fn test_spawn_echo_agent() {
        let runtime = AgentRuntime::new();
        let handle = runtime
            .spawn(Session::ephemeral("m", "/work"), tools(), |mut internals| async move {
                while let Some(message) = internals.receive().await {
                    match message {
                        InputMessage::UserInput(text) => {
                            internals.send_text(format!("echo: {}", text));
                            internals.send_done();
                        }
                        InputMessage::Shutdown => break,
                        _ => {}
                    }
                }
                Ok(())
            })
            .await;

        let mut rx = handle.subscribe();
        assert_eq!(runtime.count().await, 1);
        handle.send_input("hi").await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), OutputChunk::TextDelta(s) if s == "echo: hi"));
        assert!(rx.recv().await.unwrap().is_terminal());

        runtime.shutdown_all().await;
        assert!(matches!(handle.state().await, AgentState::Done));
        assert_eq!(runtime.count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_agent_reports_error_state() {
        let runtime = AgentRuntime::new();
        let handle = runtime
            .spawn(Session::ephemeral("m", "/work"), tools(), |_internals| async move {
                Err(FrameworkError::other("boom"))
            })
            .await;
        handle.wait_for_completion().await;
        assert!(matches!(handle.state().await, AgentState::Error { message } if message == "boom"));
    }
}
