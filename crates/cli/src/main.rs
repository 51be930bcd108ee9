mod cli;
mod commands;
mod config;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use agentloop_llm::{create_model_client, ModelConfig};
use agentloop_mcp::McpSession;
use agentloop_runtime::{
    build_descriptors, AgenticLoop, AgenticLoopError, Conversation, ModelClient, ToolCallError,
};

use crate::cli::CliArgs;
use crate::commands::{bind_prompt_arguments, Command};
use crate::config::CliConfig;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the REPL on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let terminal = Terminal::new();

    let config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;

    let model_config = config
        .model_config(&args)
        .context("invalid model settings")?;
    let model = create_model_client(&model_config).context("failed to create model client")?;

    let server = config.server_command(&args);
    info!(program = %server.program, args = ?server.args, "Starting tool server");
    let mut session = McpSession::spawn(&server)
        .await
        .with_context(|| format!("failed to start tool server '{}'", server.program))?;

    let result = run_repl(&terminal, &mut session, model, &model_config, &config, &args).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to shut down tool server cleanly");
    }
    result
}

async fn run_repl(
    terminal: &Terminal,
    session: &mut McpSession,
    model: Arc<dyn ModelClient>,
    model_config: &ModelConfig,
    config: &CliConfig,
    args: &CliArgs,
) -> Result<()> {
    let descriptors = session
        .list_tools()
        .await
        .context("failed to list tools")?;
    let tool_names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
    info!(server = %session.server_info().name, tools = ?tool_names, "Tools discovered");

    let agentic_loop = AgenticLoop::new(model, build_descriptors(&descriptors))
        .with_max_iterations(config.max_iterations(args));
    let mut conversation = Conversation::new().with_system_prompt(config.system_prompt(args));

    terminal.print_banner(
        &model_config.provider.to_string(),
        &model_config.model,
        &tool_names,
    )?;

    loop {
        let Some(line) = terminal.read_input()? else {
            terminal.print_info("Bye Bye!")?;
            break;
        };

        let message = match Command::parse(&line) {
            Ok(Command::Empty) => continue,
            Ok(Command::Exit) => {
                terminal.print_info("Bye Bye!")?;
                break;
            }
            Ok(Command::ListPrompts) => {
                match session.list_prompts().await {
                    Ok(prompts) => terminal.print_prompts(&prompts)?,
                    Err(ToolCallError::Transport(e)) => {
                        return Err(e).context("tool server connection lost");
                    }
                    Err(e) => terminal.print_error(&format!("Error listing prompts: {}", e))?,
                }
                continue;
            }
            Ok(Command::Prompt { name, args: values }) => match load_prompt(session, &name, &values).await {
                Ok(text) => {
                    terminal.print_info("--- Prompt loaded successfully. Preparing to execute... ---")?;
                    text
                }
                Err(PromptError::Fatal(e)) => {
                    return Err(e).context("tool server connection lost");
                }
                Err(PromptError::Usage(e)) => {
                    terminal.print_error(&format!("Error: {:#}", e))?;
                    continue;
                }
            },
            Ok(Command::Message(text)) => text,
            Err(e) => {
                terminal.print_error(&format!("Error: {:#}", e))?;
                continue;
            }
        };

        match agentic_loop.run(&mut conversation, &mut *session, message).await {
            Ok(report) => {
                for event in &report.events {
                    terminal.display_event(event)?;
                }
            }
            Err(AgenticLoopError::Model { source, events }) if !source.is_fatal() => {
                for event in &events {
                    terminal.display_event(event)?;
                }
                warn!(error = %source, tool_events = events.len(), "Model call failed, turn abandoned");
                terminal.print_error(&format!("LLM Error: {}", source))?;
            }
            Err(e) => {
                error!(error = %e, "Agentic loop failed");
                return Err(e).context("agent session ended");
            }
        }
    }

    Ok(())
}

enum PromptError {
    /// The REPL reports it and keeps going
    Usage(anyhow::Error),
    Fatal(agentloop_runtime::TransportError),
}

impl From<ToolCallError> for PromptError {
    fn from(e: ToolCallError) -> Self {
        match e {
            ToolCallError::Transport(e) => PromptError::Fatal(e),
            other => PromptError::Usage(other.into()),
        }
    }
}

/// Look up a server prompt, bind positional arguments and render its text.
async fn load_prompt(
    session: &mut McpSession,
    name: &str,
    values: &[String],
) -> Result<String, PromptError> {
    let prompts = session.list_prompts().await?;
    let prompt = prompts
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| PromptError::Usage(anyhow::anyhow!("prompt '{}' not found", name)))?;
    let arguments = bind_prompt_arguments(prompt, values).map_err(PromptError::Usage)?;

    let rendered = session.get_prompt(name, arguments).await?;
    let text = rendered.text();
    if text.trim().is_empty() {
        return Err(PromptError::Usage(anyhow::anyhow!(
            "prompt '{}' rendered no text",
            name
        )));
    }
    Ok(text)
}
