use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, BufRead, Write};

use agentloop_mcp::PromptDescriptor;
use agentloop_runtime::LoopEvent;
use tracing::debug;

use crate::commands::{argument_names, PROMPT_USAGE};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_CALL: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Manages terminal I/O for the interactive REPL.
#[derive(Default)]
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, provider: &str, model: &str, tools: &[String]) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("--- Weather Agent Ready ---\n"),
            ResetColor,
            SetForegroundColor(Colors::DIM),
            Print(format!("Provider: {} | Model: {}\n", provider, model)),
            Print(format!("Tools: {}\n", tools.join(", "))),
            Print("Type 'exit' to end.\n"),
            Print("  /prompts                      list the server's prompt templates\n"),
            Print("  /prompt <name> \"arg1\" ...     run a prompt template\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt.
    /// Returns None on end of input.
    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("User: "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input))
    }

    /// Show what happened during a turn, in order.
    pub fn display_event(&self, event: &LoopEvent) -> Result<()> {
        let mut stdout = io::stdout();
        match event {
            LoopEvent::ToolCallIssued { name, arguments, .. } => {
                debug!(tool = %name, %arguments, "Tool call");
                execute!(
                    stdout,
                    SetForegroundColor(Colors::TOOL_CALL),
                    Print(format!("[Agent uses tool: {}]\n", name)),
                    ResetColor,
                )?;
            }
            LoopEvent::ToolResultReceived { name, content, is_error, .. } => {
                if *is_error {
                    execute!(
                        stdout,
                        SetForegroundColor(Colors::DIM),
                        Print(format!("  [{} failed: {}]\n", name, content)),
                        ResetColor,
                    )?;
                }
            }
            LoopEvent::DiscardedToolCalls { names } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("  [ignored extra tool calls: {}]\n", names.join(", "))),
                    ResetColor,
                )?;
            }
            LoopEvent::IterationLimitReached { max_iterations } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("  [stopped after {} tool calls]\n", max_iterations)),
                    ResetColor,
                )?;
            }
            LoopEvent::FinalAnswer { text } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::ASSISTANT_TEXT),
                    Print("AI: "),
                    ResetColor,
                    Print(format!("{}\n", text)),
                )?;
            }
        }
        stdout.flush()?;
        Ok(())
    }

    /// List prompt templates with their argument names.
    pub fn print_prompts(&self, prompts: &[PromptDescriptor]) -> Result<()> {
        let mut stdout = io::stdout();
        if prompts.is_empty() {
            return self.print_info("The server offers no prompts.");
        }
        for prompt in prompts {
            execute!(
                stdout,
                SetForegroundColor(Colors::HEADER),
                Print(format!("Prompt: {}\n", prompt.name)),
                ResetColor,
                Print(format!(
                    "Arguments for prompt: {} : {}\n",
                    prompt.name,
                    argument_names(prompt)
                )),
            )?;
            if let Some(description) = &prompt.description {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("  {}\n", description)),
                    ResetColor,
                )?;
            }
        }
        execute!(stdout, Print(format!("{}\n", PROMPT_USAGE)))?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}
