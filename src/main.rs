use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use codewright::agent::{default_system_prompt, AgentConfig, StandardAgent};
use codewright::cli::{run_print, ConsoleRenderer};
use codewright::config::Settings;
use codewright::llm::{AnthropicProvider, LlmProvider, SwappableLlmProvider, DEFAULT_MAX_TOKENS};
use codewright::logging::{self, LogOptions};
use codewright::permissions::{ModelPrefixDetector, PermissionContext, PermissionMode};
use codewright::runtime::AgentRuntime;
use codewright::session::{Session, SessionStorage};
use codewright::tools::{ToolContext, ToolRegistry};

/// Terminal coding assistant
#[derive(Parser, Debug)]
#[command(name = "codewright", version, about)]
struct Args {
    /// Run a single prompt, print the reply and exit
    prompt: Option<String>,

    /// Model for the main conversation
    #[arg(long)]
    model: Option<String>,

    /// Model to switch to when the main model is overloaded
    #[arg(long)]
    fallback_model: Option<String>,

    /// default, acceptEdits or bypassPermissions
    #[arg(long, default_value = "default")]
    permission_mode: PermissionMode,

    /// Allow every tool call that no deny rule blocks
    #[arg(long)]
    dangerously_skip_permissions: bool,

    /// Continue a previous session by id
    #[arg(long, value_name = "SESSION_ID")]
    resume: Option<String>,

    /// Working directory for tools
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Mirror warnings to stderr and log at debug level
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_guard = logging::init_logging(&LogOptions::from_env(args.verbose))?;

    tracing::info!("=== codewright starting ===");

    let cwd = match &args.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let cwd = cwd
        .canonicalize()
        .with_context(|| format!("Working directory {} does not exist", cwd.display()))?;

    let mut anthropic = AnthropicProvider::from_env()?;
    if let Some(model) = &args.model {
        anthropic = anthropic.with_model(model);
    }
    let model = anthropic.model();
    let small_fast = anthropic.create_variant(
        &AnthropicProvider::small_fast_model_from_env(),
        DEFAULT_MAX_TOKENS,
    );
    let llm = Arc::new(SwappableLlmProvider::new(Arc::new(anthropic)));

    let mode = if args.dangerously_skip_permissions {
        PermissionMode::BypassPermissions
    } else {
        args.permission_mode
    };
    let interactive = args.prompt.is_none();
    let permissions = Arc::new(
        PermissionContext::load(Settings::local_path(&cwd), mode)?.with_interactive(interactive),
    );
    let tools = ToolContext::new(cwd.clone(), permissions)
        .with_prefix_detector(Arc::new(ModelPrefixDetector::new(small_fast)));

    let storage = SessionStorage::new();
    let session = match &args.resume {
        Some(id) => Session::resume(storage, id)?,
        None => Session::create(storage, model.clone(), cwd.clone())?,
    };
    tracing::info!(session_id = %session.session_id(), %model, ?mode, "Session ready");

    let mut config = AgentConfig::new(default_system_prompt(&cwd, &model))
        .with_tools(Arc::new(ToolRegistry::with_defaults()));
    if let Some(fallback) = &args.fallback_model {
        config = config.with_fallback_model(fallback);
    }
    let agent = StandardAgent::new(config, llm);

    let runtime = AgentRuntime::new();
    let handle = runtime
        .spawn(session, tools, |internals| agent.run(internals))
        .await;

    let ok = match &args.prompt {
        Some(prompt) => {
            let ok = run_print(&handle, prompt).await?;
            if let Err(e) = handle.shutdown().await {
                tracing::debug!(error = %e, "Agent already stopped");
            }
            ok
        }
        None => {
            ConsoleRenderer::new(handle.clone())
                .run(&model, &cwd.display().to_string())
                .await?;
            true
        }
    };
    handle.wait_for_completion().await;

    tracing::info!("=== codewright shutting down ===");
    drop(log_guard);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
