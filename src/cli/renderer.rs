//! Console Renderer - subscribes to an agent and renders output to the terminal
//!
//! The renderer owns stdin: it reads prompts, answers permission requests
//! and maps Ctrl-C to an interrupt of the running turn. The agent knows
//! nothing about the terminal.

use std::io;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;

use crate::core::OutputChunk;
use crate::permissions::{PermissionDecision, ToolUseConfirm};
use crate::runtime::{AgentHandle, OutputReceiver};

use super::console::{Console, SlashCommand};
use super::prompt::{parse_decision, render_permission_prompt};

/// Interactive terminal front end for one agent
///
/// ```ignore
/// let handle = runtime.spawn(session, tools, |internals| agent.run(internals)).await;
/// ConsoleRenderer::new(handle).run(&model, &cwd).await?;
/// ```
pub struct ConsoleRenderer {
    handle: AgentHandle,
    console: Console,
    lines: Lines<BufReader<Stdin>>,
    show_thinking: bool,
}

impl ConsoleRenderer {
    pub fn new(handle: AgentHandle) -> Self {
        Self {
            handle,
            console: Console::new(),
            lines: BufReader::new(tokio::io::stdin()).lines(),
            show_thinking: true,
        }
    }

    pub fn show_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    /// Read prompts until `/exit`, end of input or Ctrl-C at the prompt
    pub async fn run(&mut self, model: &str, cwd: &str) -> io::Result<()> {
        self.console.print_banner(model, cwd);

        loop {
            self.console.print_prompt();
            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => None,
                line = self.lines.next_line() => line?,
            };
            let Some(line) = line else {
                self.console.println();
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            match SlashCommand::parse(input) {
                Some(SlashCommand::Exit) => break,
                Some(SlashCommand::Help) => self.console.print_help(),
                Some(SlashCommand::Permissions) => {
                    let permissions = self.handle.permissions();
                    self.console.print_rules(permissions.mode(), &permissions.rules());
                }
                Some(SlashCommand::Compact) => {
                    let rx = self.handle.subscribe();
                    if let Err(e) = self.handle.compact().await {
                        self.console.print_error(&e.to_string());
                        break;
                    }
                    self.render_response(rx).await?;
                }
                Some(SlashCommand::Unknown(name)) => {
                    self.console.print_error(&format!("Unknown command: /{}", name));
                }
                None => self.run_turn(input).await?,
            }
            self.console.println();
        }

        self.console.print_status("Shutting down...");
        if let Err(e) = self.handle.shutdown().await {
            tracing::debug!(error = %e, "Agent already stopped");
        }
        Ok(())
    }

    /// Send one prompt and render the reply
    pub async fn run_turn(&mut self, input: &str) -> io::Result<()> {
        // Subscribe first so no chunk is missed
        let rx = self.handle.subscribe();
        if let Err(e) = self.handle.send_input(input).await {
            self.console.print_error(&format!("Failed to send input: {}", e));
            return Ok(());
        }
        self.render_response(rx).await
    }

    /// Render output until the turn is done
    ///
    /// Lines typed meanwhile are sent as queued prompts. Each one is either
    /// attached to the running turn or answered by a turn of its own, which
    /// is rendered before returning.
    async fn render_response(&mut self, mut rx: OutputReceiver) -> io::Result<()> {
        let mut in_text = false;
        let mut in_thinking = false;
        let mut stdin_open = true;
        let mut pending_inputs = 0usize;

        loop {
            let chunk = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.handle.interrupt();
                    continue;
                }
                line = self.lines.next_line(), if stdin_open => {
                    match line? {
                        Some(line) => {
                            if self.queue_input(line.trim()).await {
                                pending_inputs += 1;
                            }
                        }
                        None => stdin_open = false,
                    }
                    continue;
                }
                chunk = rx.recv() => chunk,
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Renderer fell behind the output stream");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match chunk {
                OutputChunk::TextDelta(text) => {
                    if in_thinking {
                        self.console.println();
                        in_thinking = false;
                    }
                    in_text = true;
                    self.console.print_assistant_chunk(&text);
                }
                OutputChunk::ThinkingDelta(text) => {
                    if self.show_thinking {
                        in_thinking = true;
                        self.console.print_thinking_chunk(&text);
                    }
                }
                OutputChunk::TextComplete(_) | OutputChunk::ThinkingComplete(_) => {
                    if in_text || in_thinking {
                        self.console.println();
                        in_text = false;
                        in_thinking = false;
                    }
                }
                OutputChunk::ToolStart { name, input, .. } => {
                    self.console.print_tool_start(&name, &input);
                }
                OutputChunk::ToolEnd { result, .. } => {
                    self.console.print_tool_result(&result);
                }
                OutputChunk::PermissionRequest(confirm) => {
                    let decision = self.ask_permission(&confirm).await?;
                    if let Err(e) = self
                        .handle
                        .respond_permission(confirm.tool_use_id.clone(), decision)
                        .await
                    {
                        self.console.print_error(&e.to_string());
                        break;
                    }
                }
                OutputChunk::Status(status) => self.console.print_status(&status),
                OutputChunk::QueuedInputsAttached(count) => {
                    pending_inputs = pending_inputs.saturating_sub(count);
                    self.console.print_status(&format!("Added {} queued prompt(s)", count));
                }
                OutputChunk::StateChange(state) => tracing::debug!(%state, "Agent state"),
                OutputChunk::Error(e) => {
                    if in_text {
                        self.console.println();
                        in_text = false;
                    }
                    self.console.print_error(&e);
                }
                OutputChunk::Done => {
                    if in_text {
                        self.console.println();
                        in_text = false;
                    }
                    if pending_inputs == 0 {
                        break;
                    }
                    // The next turn answers a queued prompt
                    pending_inputs -= 1;
                }
            }
        }
        Ok(())
    }

    /// Forward a line typed during a turn; returns whether it was queued
    async fn queue_input(&self, input: &str) -> bool {
        if input.is_empty() {
            return false;
        }
        if input.starts_with('/') {
            self.console
                .print_status("Commands are available once the reply finishes");
            return false;
        }
        match self.handle.send_input(input).await {
            Ok(()) => {
                self.console.print_status("Queued");
                true
            }
            Err(e) => {
                self.console.print_error(&format!("Failed to send input: {}", e));
                false
            }
        }
    }

    /// Show the prompt and read an answer; Ctrl-C or end of input rejects
    async fn ask_permission(&mut self, confirm: &ToolUseConfirm) -> io::Result<PermissionDecision> {
        self.console.println();
        self.console.print_block(&render_permission_prompt(confirm));

        loop {
            self.console.print_answer_prompt();
            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.handle.interrupt();
                    self.console.println();
                    return Ok(PermissionDecision::Reject);
                }
                line = self.lines.next_line() => line?,
            };
            let Some(line) = line else {
                return Ok(PermissionDecision::Reject);
            };
            match parse_decision(&line) {
                Some(decision) => return Ok(decision),
                None => self.console.print_status("Please answer y, s, a or n"),
            }
        }
    }
}

/// Print mode: send one prompt, write the reply to stdout and return
/// whether the turn finished without errors
pub async fn run_print(handle: &AgentHandle, prompt: &str) -> io::Result<bool> {
    let console = Console::new();
    let mut rx = handle.subscribe();
    if let Err(e) = handle.send_input(prompt).await {
        console.print_error(&e.to_string());
        return Ok(false);
    }

    let mut ok = true;
    loop {
        let chunk = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.interrupt();
                ok = false;
                continue;
            }
            chunk = rx.recv() => chunk,
        };
        match chunk {
            Ok(OutputChunk::TextDelta(text)) => console.print_assistant_chunk(&text),
            Ok(OutputChunk::Error(e)) => {
                console.print_error(&e);
                ok = false;
            }
            Ok(OutputChunk::Done) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
    console.println();
    Ok(ok)
}
