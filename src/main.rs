// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, RunArgs};
use tunacode_core::{
    AuthorizationPolicy, AuthorizationState, AutoApprove, ConfirmationChannel, ModelPricing,
    OrchestratorConfig, State,
};
use tunacode_model::{ModelProvider, ScriptedMockProvider};
use tunacode_tools::{
    GlobTool, GrepTool, ListDirTool, ReadFileTool, RunCommandTool, SubmitTool, ToolRegistry,
    UpdateFileTool, WriteFileTool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.setup {
        let path = tunacode_config::config_path().context("resolving config path")?;
        let _ = tunacode_config::load().context("writing default config")?;
        println!("{}", path.display());
        return Ok(());
    }

    let config = tunacode_config::load().context("loading config")?;

    let exit_code = match cli.command {
        Some(Commands::Run(args)) => run_command(config, cli.model, args).await,
        None => {
            eprintln!("tunacode: no subcommand given. Try `tunacode run \"<prompt>\"`.");
            Ok(1)
        }
    };

    match exit_code {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("tunacode: {error:#}");
            std::process::exit(1);
        }
    }
}

/// Runs one headless request to completion and returns the process exit
/// code (0 success, 1 model/network/tool error, 130 user-aborted) per §6.
async fn run_command(
    config: tunacode_config::Config,
    top_model: Option<String>,
    args: RunArgs,
) -> anyhow::Result<i32> {
    if let Some(dir) = &args.cwd {
        std::env::set_current_dir(dir)
            .with_context(|| format!("changing into {}", dir.display()))?;
    }

    let model_spec = args
        .model
        .or(top_model)
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| "mock:echo".to_string());

    let provider = resolve_provider(&model_spec)?;

    let mut tools = ToolRegistry::new();
    tools.register(ReadFileTool);
    tools.register(WriteFileTool);
    tools.register(UpdateFileTool);
    tools.register(GrepTool);
    tools.register(ListDirTool);
    tools.register(GlobTool);
    tools.register(RunCommandTool::default());
    tools.register(SubmitTool);

    let policy = AuthorizationPolicy::default();
    let mut auth_state = AuthorizationState { yolo: args.auto_approve, ..Default::default() };
    let confirm: Box<dyn ConfirmationChannel> =
        if args.auto_approve { Box::new(AutoApprove) } else { Box::new(RejectAll) };

    let cancelled = Arc::new(AtomicBool::new(false));
    spawn_cancel_listener(cancelled.clone());

    let session_id = uuid::Uuid::new_v4().to_string();
    let max_tokens = config.settings.context_window_size as usize;
    let mut state = State::new(session_id, max_tokens);

    let orchestrator_config = OrchestratorConfig { max_iterations: config.settings.max_iterations as usize };
    let pricing = ModelPricing::default();

    let agent = tunacode_core::get_or_build_agent(&mut state, &model_spec, || provider);

    let run = tunacode_core::run_request(
        &mut state,
        &model_spec,
        agent.as_ref(),
        &tools,
        &policy,
        &mut auth_state,
        confirm.as_ref(),
        &cancelled,
        &pricing,
        &orchestrator_config,
        &args.prompt,
    );

    let response_state = if args.timeout > 0 {
        match tokio::time::timeout(std::time::Duration::from_secs(args.timeout), run).await {
            Ok(response_state) => response_state,
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                eprintln!("tunacode: timed out after {}s", args.timeout);
                return Ok(1);
            }
        }
    } else {
        run.await
    };

    if state.runtime.operation_cancelled {
        return Ok(130);
    }

    let final_text = state
        .conversation
        .messages
        .iter()
        .rev()
        .find_map(|m| {
            let text = m.content();
            if text.is_empty() { None } else { Some(text) }
        })
        .unwrap_or_default();

    if args.output_json {
        let output = serde_json::json!({
            "text": final_text,
            "task_completed": response_state.task_completed,
            "awaiting_user_guidance": response_state.awaiting_user_guidance,
            "iterations": state.runtime.current_iteration,
            "usage": {
                "prompt_tokens": state.usage.session_total_usage.prompt_tokens,
                "completion_tokens": state.usage.session_total_usage.completion_tokens,
                "cost": state.usage.session_total_usage.cost,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{final_text}");
    }

    Ok(0)
}

/// Resolves `provider:model` into a live provider instance. No concrete
/// model SDK ships in this build (§1 Non-goals) — only the deterministic
/// `mock:` scheme is recognized; anything else is a `ChatProviderError`.
fn resolve_provider(spec: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match spec.split_once(':') {
        Some(("mock", "echo")) | Some(("mock", "")) => Ok(Arc::new(ScriptedMockProvider::always_text(
            "[no scripted provider wired for this run]",
        ))),
        Some(("mock", other)) => anyhow::bail!("unknown mock fixture '{other}' for model spec '{spec}'"),
        _ => anyhow::bail!(
            "no model SDK is wired into this build for '{spec}'; use a 'mock:' model spec \
             (e.g. --model mock:echo) to exercise the agent loop deterministically"
        ),
    }
}

/// Headless confirmation channel used when `--auto-approve` is not set:
/// there is no interactive UI to ask, so any tool needing confirmation is
/// declined.
struct RejectAll;

#[async_trait::async_trait]
impl ConfirmationChannel for RejectAll {
    async fn confirm(
        &self,
        _tool_name: &str,
        _preview: &tunacode_core::authorization::Preview,
    ) -> tunacode_core::dispatcher::ConfirmationResponse {
        tunacode_core::dispatcher::ConfirmationResponse { approved: false, skip_future: false }
    }
}

/// Spawns a task that flips `cancelled` on the first Ctrl+C. A second
/// Ctrl+C after that falls through to the process default (force-kill) —
/// this task only ever sets the flag once.
fn spawn_cancel_listener(cancelled: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancelled.store(true, Ordering::SeqCst);
        }
    });
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
