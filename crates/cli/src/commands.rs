//! Reserved REPL commands. Anything else the user types goes to the model.

use anyhow::{bail, Result};
use std::collections::BTreeMap;

use agentloop_mcp::PromptDescriptor;

pub const PROMPT_USAGE: &str = "Usage: /prompt <prompt_name> \"arg1\" \"arg2\" ...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    /// `/prompts`: list the server's prompt templates
    ListPrompts,
    /// `/prompt <name> args...`
    Prompt { name: String, args: Vec<String> },
    Message(String),
    Empty,
}

impl Command {
    /// Classify one line of user input.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Command::Empty);
        }
        if trimmed.eq_ignore_ascii_case("exit") {
            return Ok(Command::Exit);
        }
        if trimmed == "/prompts" {
            return Ok(Command::ListPrompts);
        }
        if let Some(rest) = trimmed.strip_prefix("/prompt") {
            // `/promptx` is an ordinary message
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return parse_prompt(rest);
            }
        }
        Ok(Command::Message(trimmed.to_string()))
    }
}

fn parse_prompt(rest: &str) -> Result<Command> {
    let Some(mut words) = shlex::split(rest) else {
        bail!("unbalanced quotes in prompt arguments. {}", PROMPT_USAGE);
    };
    if words.is_empty() {
        bail!("missing prompt name. {}", PROMPT_USAGE);
    }
    let name = words.remove(0);
    Ok(Command::Prompt { name, args: words })
}

/// Bind positional values to the prompt's declared arguments, in order.
///
/// Every declared argument needs a value; surplus values are ignored.
pub fn bind_prompt_arguments(
    prompt: &PromptDescriptor,
    values: &[String],
) -> Result<BTreeMap<String, String>> {
    if values.len() < prompt.arguments.len() {
        bail!(
            "prompt '{}' expects {} argument(s) ({}), got {}",
            prompt.name,
            prompt.arguments.len(),
            argument_names(prompt),
            values.len()
        );
    }
    Ok(prompt
        .arguments
        .iter()
        .zip(values)
        .map(|(arg, value)| (arg.name.clone(), value.clone()))
        .collect())
}

/// Comma-separated argument names, or `None`.
pub fn argument_names(prompt: &PromptDescriptor) -> String {
    if prompt.arguments.is_empty() {
        return "None".to_string();
    }
    prompt
        .arguments
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
