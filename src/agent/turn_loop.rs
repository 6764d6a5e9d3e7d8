//! Assistant turn loop
//!
//! One user prompt drives a loop of model requests and tool rounds:
//! - compact history when the last request was near the context limit
//! - stream the request, forwarding text and thinking deltas
//! - run the requested tools and append their results plus queued prompts
//! - repeat until the model stops asking for tools
//!
//! A turn also ends on rejection, interrupt or the iteration cap.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::core::{AgentState, FrameworkResult, InputMessage, OutputChunk};
use crate::llm::{
    find_api_error, ContentBlock, LlmProvider, LlmProviderHandle, Message, StopReason,
    SwappableLlmProvider, SystemPrompt, ToolDefinition,
};
use crate::runtime::AgentInternals;
use crate::session::CompactionState;

use super::compactor;
use super::config::AgentConfig;
use super::executor::{ToolExecutor, ToolUse};
use super::stream::{StreamAccumulator, StreamDelta, StreamedResponse};

/// Recorded in history when a turn is interrupted while streaming
pub const INTERRUPT_MESSAGE: &str = "[Request interrupted by user]";

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without requesting tools
    Completed,
    /// The user rejected a tool use
    Rejected,
    Interrupted,
    IterationLimit,
    /// Shutdown arrived while the turn was running
    Stopped,
}

/// Agent that runs the turn loop for every prompt it receives
///
/// ```ignore
/// let llm = Arc::new(SwappableLlmProvider::new(provider));
/// let agent = StandardAgent::new(config, llm);
/// let handle = runtime.spawn(session, tools, |internals| agent.run(internals)).await;
/// ```
pub struct StandardAgent {
    config: AgentConfig,
    llm: Arc<SwappableLlmProvider>,
    provider: LlmProviderHandle,
    compaction: CompactionState,
    fallback_active: bool,
    /// Context size of the most recent request
    last_context_tokens: u32,
}

impl StandardAgent {
    pub fn new(config: AgentConfig, llm: Arc<SwappableLlmProvider>) -> Self {
        let provider = llm.handle();
        Self {
            config,
            llm,
            provider,
            compaction: CompactionState::new(),
            fallback_active: false,
            last_context_tokens: 0,
        }
    }

    /// Main loop; pass this to `AgentRuntime::spawn`
    pub async fn run(mut self, mut internals: AgentInternals) -> FrameworkResult<()> {
        tracing::info!(session_id = %internals.session_id(), model = %self.llm.model(), "Agent started");

        loop {
            internals.set_state(AgentState::Idle).await;

            match internals.receive().await {
                Some(InputMessage::UserInput(text)) => {
                    match self.run_turn(&mut internals, &text).await {
                        Ok(outcome) => tracing::info!(?outcome, "Turn finished"),
                        Err(e) => {
                            tracing::error!(error = %e, "Turn failed");
                            internals.send_error(format!("Error: {}", e));
                        }
                    }
                    if let Err(e) = internals.session.save_metadata() {
                        tracing::warn!(error = %e, "Failed to save session metadata");
                    }
                    internals.send_done();
                }

                Some(InputMessage::Compact) => {
                    internals.set_state(AgentState::Compacting).await;
                    match self.compact(&mut internals, false).await {
                        Ok(count) => {
                            internals.send_status(format!("Compacted {} messages", count))
                        }
                        Err(e) => internals.send_error(format!("Error compacting conversation: {}", e)),
                    };
                    internals.send_done();
                }

                Some(InputMessage::PermissionResponse { tool_use_id, .. }) => {
                    tracing::warn!(%tool_use_id, "Permission response while idle");
                }

                Some(InputMessage::Shutdown) | None => {
                    tracing::info!(session_id = %internals.session_id(), "Agent shutting down");
                    break;
                }
            }
        }

        self.save_stats(&internals);
        Ok(())
    }

    /// Run one user prompt to completion
    pub async fn run_turn(
        &mut self,
        internals: &mut AgentInternals,
        prompt: &str,
    ) -> FrameworkResult<TurnOutcome> {
        let abort = internals.begin_turn();
        internals.set_state(AgentState::Processing).await;
        if self.config.should_auto_compact(self.last_context_tokens) {
            self.auto_compact(internals).await;
        }
        internals.session.add_messages(vec![Message::user(prompt)])?;

        let tool_definitions = self.config.tool_definitions();
        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                tracing::warn!(max = self.config.max_iterations, "Iteration cap reached");
                internals.send_status("Max tool iterations reached");
                return Ok(TurnOutcome::IterationLimit);
            }

            if iterations > 1 && self.config.should_auto_compact(self.last_context_tokens) {
                self.auto_compact(internals).await;
            }

            let Some(response) = self.query(internals, &tool_definitions, &abort).await? else {
                tracing::info!("Turn interrupted while streaming");
                internals
                    .session
                    .add_messages(vec![Message::user(INTERRUPT_MESSAGE)])?;
                return Ok(TurnOutcome::Interrupted);
            };

            let uses: Vec<ToolUse> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| ToolUse::new(id, name, input))
                .collect();

            if !response.content.is_empty() {
                internals
                    .session
                    .add_messages(vec![Message::assistant_with_blocks(response.content.clone())])?;
            }

            if uses.is_empty() {
                if response.stop_reason == Some(StopReason::MaxTokens) {
                    internals.send_status("Response truncated (max tokens)");
                }
                return Ok(TurnOutcome::Completed);
            }

            let outcome = ToolExecutor::execute_all(
                internals,
                &self.config.tools,
                &uses,
                &response.message_id,
                &abort,
            )
            .await;
            internals.set_state(AgentState::Processing).await;

            let mut blocks: Vec<ContentBlock> = outcome
                .results
                .into_iter()
                .map(|(id, result)| ContentBlock::tool_result(id, result.output, result.is_error))
                .collect();

            if outcome.interrupted || outcome.rejected {
                internals.session.add_messages(vec![Message::user_with_blocks(blocks)])?;
                return Ok(if outcome.interrupted {
                    TurnOutcome::Interrupted
                } else {
                    TurnOutcome::Rejected
                });
            }

            let queued = internals.drain_queued_inputs();
            if !queued.is_empty() {
                tracing::info!(count = queued.len(), "Attaching queued prompts");
                internals.send(OutputChunk::QueuedInputsAttached(queued.len()));
            }
            blocks.extend(queued.into_iter().map(|text| ContentBlock::text(text)));
            internals.session.add_messages(vec![Message::user_with_blocks(blocks)])?;

            if internals.shutdown_requested() {
                return Ok(TurnOutcome::Stopped);
            }
        }
    }

    /// Stream one request, switching to the fallback model once on overload
    ///
    /// `None` means the turn was interrupted.
    async fn query(
        &mut self,
        internals: &mut AgentInternals,
        tools: &[ToolDefinition],
        abort: &CancellationToken,
    ) -> FrameworkResult<Option<StreamedResponse>> {
        loop {
            let model = self.llm.model();
            let started = Instant::now();

            match self.stream_once(internals, tools, abort).await {
                Ok(Some(response)) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        model = %model,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        duration_ms,
                        stop_reason = ?response.stop_reason,
                        "Model call complete"
                    );
                    internals.session.record_api_call(&response.usage, duration_ms);
                    self.last_context_tokens = response.usage.context_tokens();
                    let session_id = internals.session_id().to_string();
                    self.compaction.on_model_call(&session_id, &model);
                    return Ok(Some(response));
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    let overloaded = find_api_error(&e).is_some_and(|api| api.triggers_fallback());
                    match (&self.config.fallback_model, overloaded && !self.fallback_active) {
                        (Some(fallback), true) => {
                            tracing::warn!(from = %model, to = %fallback, error = %e, "Switching to fallback model");
                            let variant = self
                                .provider
                                .variant(fallback, self.config.fallback_max_tokens)
                                .await;
                            self.provider.set_provider(variant).await;
                            self.fallback_active = true;
                            internals.session.metadata.model = fallback.clone();
                            internals.send_status(format!(
                                "Switched to {} due to high demand for {}",
                                fallback, model
                            ));
                        }
                        _ => return Err(e.into()),
                    }
                }
            }
        }
    }

    async fn stream_once(
        &self,
        internals: &AgentInternals,
        tools: &[ToolDefinition],
        abort: &CancellationToken,
    ) -> Result<Option<StreamedResponse>> {
        let request = self.llm.stream_with_tools_and_system(
            internals.session.history().to_vec(),
            Some(SystemPrompt::cached(&self.config.system_prompt)),
            tools.to_vec(),
            self.config.thinking.clone(),
        );
        let mut stream = tokio::select! {
            _ = abort.cancelled() => return Ok(None),
            stream = request => stream?,
        };

        let mut accumulator = StreamAccumulator::new();
        loop {
            let event = tokio::select! {
                _ = abort.cancelled() => return Ok(None),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            match accumulator.apply(event?) {
                Some(StreamDelta::Text(text)) => {
                    internals.send_text(text);
                }
                Some(StreamDelta::Thinking(text)) => {
                    internals.send_thinking(text);
                }
                None => {}
            }
        }

        let response = accumulator.finish();
        for block in &response.content {
            match block {
                ContentBlock::Text { text, .. } => {
                    internals.send(OutputChunk::TextComplete(text.clone()));
                }
                ContentBlock::Thinking { thinking, .. } => {
                    internals.send(OutputChunk::ThinkingComplete(thinking.clone()));
                }
                _ => {}
            }
        }
        Ok(Some(response))
    }

    /// Summarize the history; `auto` marks the compaction for follow-up events
    pub async fn compact(
        &mut self,
        internals: &mut AgentInternals,
        auto: bool,
    ) -> FrameworkResult<usize> {
        let count = compactor::compact_history(&mut internals.session, self.llm.as_ref()).await?;
        self.last_context_tokens = 0;
        if auto {
            self.compaction.mark_compacted();
        }
        Ok(count)
    }

    async fn auto_compact(&mut self, internals: &mut AgentInternals) {
        tracing::info!(context_tokens = self.last_context_tokens, "Auto-compacting history");
        internals.set_state(AgentState::Compacting).await;
        match self.compact(internals, true).await {
            Ok(count) => {
                internals.send_status(format!("Auto-compacted {} messages", count));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auto-compaction failed");
                internals.send_status(format!("Auto-compaction failed: {}", e));
                // Avoid retrying before the next request reports its size
                self.last_context_tokens = 0;
            }
        }
        internals.set_state(AgentState::Processing).await;
    }

    fn save_stats(&self, internals: &AgentInternals) {
        if !self.config.save_stats {
            return;
        }
        let stats = internals.session.stats().clone();
        let path = Settings::local_path(&internals.tools.cwd);
        if let Err(e) = Settings::update(&path, |settings| settings.last_session = Some(stats)) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save session statistics");
        }
    }

    /// Model currently serving requests
    pub fn model(&self) -> String {
        self.llm.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedProvider;
    use crate::llm::ApiRequestError;
    use crate::permissions::{PermissionContext, PermissionDecision};
    use crate::runtime::internals::tests::create_test_internals;
    use crate::runtime::{AgentRuntime, InputSender, OutputReceiver};
    use crate::session::{Session, SessionStorage};
    use crate::tools::{ToolContext, ToolRegistry};
    use serde_json::json;
    use tempfile::TempDir;

    fn agent(provider: &ScriptedProvider, config: AgentConfig) -> StandardAgent {
        let llm = Arc::new(SwappableLlmProvider::new(Arc::new(provider.clone())));
        StandardAgent::new(config, llm)
    }

    fn config() -> AgentConfig {
        AgentConfig::new("system")
            .with_tools(Arc::new(ToolRegistry::with_defaults()))
            .with_save_stats(false)
    }

    fn setup(dir: &TempDir) -> (AgentInternals, InputSender, OutputReceiver) {
        let (mut internals, input_tx, output_rx) = create_test_internals();
        internals.tools.cwd = dir.path().to_path_buf();
        (internals, input_tx, output_rx)
    }

    fn tool_result_ids(message: &Message) -> Vec<String> {
        message
            .blocks()
            .unwrap_or_default()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_text_reply_completes_turn() {
        let dir = TempDir::new().unwrap();
        let (mut internals, _input_tx, mut output_rx) = setup(&dir);
        let provider = ScriptedProvider::new("main");
        provider.push_text("Hello there");

        let mut agent = agent(&provider, config());
        let outcome = agent.run_turn(&mut internals, "hi").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Completed);
        let history = internals.session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text(), "Hello there");
        assert_eq!(internals.session.stats().api_calls, 1);

        let mut saw_delta = false;
        while let Ok(chunk) = output_rx.try_recv() {
            if matches!(chunk, OutputChunk::TextDelta(ref t) if t == "Hello there") {
                saw_delta = true;
            }
        }
        assert!(saw_delta);

        let request = &provider.requests()[0];
        assert!(request.tools.contains(&"Bash".to_string()));
    }

    #[tokio::test]
    async fn test_tool_round_keeps_request_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta\n").unwrap();
        let (mut internals, _input_tx, _output_rx) = setup(&dir);

        let provider = ScriptedProvider::new("main");
        provider.push_blocks(vec![
            ContentBlock::text("Reading both"),
            ContentBlock::tool_use("t1", "Read", json!({"file_path": "b.txt"})),
            ContentBlock::tool_use("t2", "Read", json!({"file_path": "a.txt"})),
        ]);
        provider.push_text("Both read");

        let mut agent = agent(&provider, config());
        let outcome = agent.run_turn(&mut internals, "read files").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        let history = internals.session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(tool_result_ids(&history[2]), vec!["t1", "t2"]);

        // Second request carries the tool results
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_queued_prompt_attached_after_tools() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        let (mut internals, input_tx, mut output_rx) = setup(&dir);
        input_tx.send(InputMessage::user_input("also check b.txt")).await.unwrap();

        let provider = ScriptedProvider::new("main");
        provider.push_blocks(vec![ContentBlock::tool_use("t1", "Read", json!({"file_path": "a.txt"}))]);
        provider.push_text("ok");

        let mut agent = agent(&provider, config());
        agent.run_turn(&mut internals, "read a").await.unwrap();

        let results = internals.session.history()[2].blocks().unwrap().to_vec();
        assert!(matches!(&results[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "t1"));
        assert_eq!(results[1].as_text(), Some("also check b.txt"));
        assert!(internals.drain_queued_inputs().is_empty());

        let mut attached = None;
        while let Ok(chunk) = output_rx.try_recv() {
            if let OutputChunk::QueuedInputsAttached(n) = chunk {
                attached = Some(n);
            }
        }
        assert_eq!(attached, Some(1));
    }

    #[tokio::test]
    async fn test_rejection_ends_turn() {
        let dir = TempDir::new().unwrap();
        let (mut internals, input_tx, mut output_rx) = setup(&dir);
        tokio::spawn(async move {
            while let Ok(chunk) = output_rx.recv().await {
                if let OutputChunk::PermissionRequest(confirm) = chunk {
                    let _ = input_tx
                        .send(InputMessage::permission(confirm.tool_use_id, PermissionDecision::Reject))
                        .await;
                }
            }
        });

        let provider = ScriptedProvider::new("main");
        provider.push_blocks(vec![ContentBlock::tool_use(
            "w1",
            "Write",
            json!({"file_path": "out.txt", "content": "x"}),
        )]);

        let mut agent = agent(&provider, config());
        let outcome = agent.run_turn(&mut internals, "write it").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Rejected);
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(tool_result_ids(&internals.session.history()[2]), vec!["w1"]);
        assert!(!dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_fallback_on_overload() {
        let dir = TempDir::new().unwrap();
        let (mut internals, _input_tx, _output_rx) = setup(&dir);
        let provider = ScriptedProvider::new("main");
        provider.push_error(ApiRequestError::new(529, "Overloaded"));
        provider.push_text("from fallback");

        let mut agent = agent(&provider, config().with_fallback_model("backup"));
        let outcome = agent.run_turn(&mut internals, "hi").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Completed);
        let models: Vec<String> = provider.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec!["main", "backup"]);
        assert_eq!(agent.model(), "backup");
        assert_eq!(internals.session.metadata.model, "backup");
    }

    #[tokio::test]
    async fn test_overload_without_fallback_fails() {
        let dir = TempDir::new().unwrap();
        let (mut internals, _input_tx, _output_rx) = setup(&dir);
        let provider = ScriptedProvider::new("main");
        provider.push_error(ApiRequestError::new(429, "Rate limited"));

        let mut agent = agent(&provider, config());
        assert!(agent.run_turn(&mut internals, "hi").await.is_err());
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        let (mut internals, _input_tx, _output_rx) = setup(&dir);
        let provider = ScriptedProvider::new("main");
        provider.push_blocks(vec![ContentBlock::tool_use("t1", "Read", json!({"file_path": "a.txt"}))]);

        let mut agent = agent(&provider, config().with_max_iterations(1));
        let outcome = agent.run_turn(&mut internals, "loop").await.unwrap();
        assert_eq!(outcome, TurnOutcome::IterationLimit);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_compaction_before_request() {
        let dir = TempDir::new().unwrap();
        let (mut internals, _input_tx, _output_rx) = setup(&dir);
        let provider = ScriptedProvider::new("main");
        provider.push_text("first answer");
        provider.push_message_reply("summary of first");
        provider.push_text("second answer");

        let mut agent = agent(&provider, config().with_auto_compact_threshold(Some(10)));
        agent.run_turn(&mut internals, "one").await.unwrap();
        agent.run_turn(&mut internals, "two").await.unwrap();

        let history = internals.session.history();
        assert!(history[0].text().contains("summary of first"));
        assert_eq!(history.last().unwrap().text(), "second answer");
        assert_eq!(internals.session.stats().compactions, 1);
        assert!(agent.compaction.is_compacted());
        assert_eq!(agent.compaction.turn_counter(), 1);
    }

    #[tokio::test]
    async fn test_auto_compaction_between_tool_rounds() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        let (mut internals, _input_tx, _output_rx) = setup(&dir);
        let provider = ScriptedProvider::new("main");
        provider.push_blocks(vec![ContentBlock::tool_use("t1", "Read", json!({"file_path": "a.txt"}))]);
        provider.push_message_reply("asked to read a.txt");
        provider.push_text("done");

        let mut agent = agent(&provider, config().with_auto_compact_threshold(Some(10)));
        let outcome = agent.run_turn(&mut internals, "read a").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(internals.session.stats().compactions, 1);

        // The request after compaction ends with the tool results
        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        let last = &requests[2].messages;
        let roles: Vec<bool> = last.iter().map(Message::is_user).collect();
        assert_eq!(roles, vec![true, false, true]);
        assert!(last[0].text().contains("asked to read a.txt"));
        assert_eq!(tool_result_ids(&last[2]), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_interrupt_while_streaming() {
        let dir = TempDir::new().unwrap();
        let storage = SessionStorage::with_dir(dir.path().join("sessions"));
        let session = Session::create(storage.clone(), "main", dir.path()).unwrap();
        let session_id = session.session_id().to_string();
        let tools = ToolContext::new(dir.path(), Arc::new(PermissionContext::default()));

        let provider = ScriptedProvider::new("main");
        provider.push_hang();
        let agent = agent(&provider, config());

        let runtime = AgentRuntime::new();
        let handle = runtime
            .spawn(session, tools, move |internals| agent.run(internals))
            .await;
        let mut rx = handle.subscribe();
        handle.send_input("long task").await.unwrap();

        loop {
            match rx.recv().await.unwrap() {
                OutputChunk::StateChange(AgentState::Processing) => handle.interrupt(),
                OutputChunk::Done => break,
                _ => {}
            }
        }
        handle.shutdown().await.unwrap();
        handle.wait_for_completion().await;

        let messages = storage.load_messages(&session_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text(), INTERRUPT_MESSAGE);
    }
}
