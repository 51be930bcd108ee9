use clap::Parser;

/// Terminal agent that answers questions with the help of an MCP tool server.
///
/// Launches the tool server as a child process, discovers its tools and
/// hands them to the model for function calling.
#[derive(Parser, Debug)]
#[command(name = "agentloop", about = "Tool-calling agent over an MCP server")]
pub struct CliArgs {
    /// Model provider: gemini or openai (config file default if not set)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name override (uses provider default if not set)
    #[arg(long)]
    pub model: Option<String>,

    /// API key (overrides env var and config file)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Base URL of the model API (OpenAI-compatible proxies, local servers)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Path to config file (default: ~/.config/agentloop/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// System prompt override
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Maximum tool calls per user turn
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Output token budget per model call
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Tool server executable (default: ./bin/weather_server)
    #[arg(long)]
    pub server: Option<String>,

    /// Arguments passed to the tool server, after `--`
    #[arg(last = true)]
    pub server_args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unset() {
        let args = CliArgs::parse_from(["agentloop"]);
        assert!(args.provider.is_none());
        assert!(args.max_iterations.is_none());
        assert!(args.server.is_none());
        assert!(args.server_args.is_empty());
    }

    #[test]
    fn test_server_command_with_trailing_args() {
        let args = CliArgs::parse_from([
            "agentloop",
            "--provider",
            "openai",
            "--max-iterations",
            "3",
            "--server",
            "python3",
            "--",
            "weather.py",
            "--units",
            "metric",
        ]);
        assert_eq!(args.provider.as_deref(), Some("openai"));
        assert_eq!(args.max_iterations, Some(3));
        assert_eq!(args.server.as_deref(), Some("python3"));
        assert_eq!(args.server_args, vec!["weather.py", "--units", "metric"]);
    }
}
