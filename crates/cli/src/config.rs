use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use agentloop_llm::{ModelConfig, ProviderKind, DEFAULT_MAX_TOKENS};
use agentloop_mcp::ServerCommand;
use agentloop_runtime::DEFAULT_MAX_ITERATIONS;

use crate::cli::CliArgs;

pub const DEFAULT_SERVER_PROGRAM: &str = "./bin/weather_server";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant using tools for weather.";

/// CLI configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub default_provider: ProviderKind,

    /// Default model per provider name
    #[serde(default)]
    pub default_models: HashMap<String, String>,

    /// API keys keyed by provider name
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    /// API root overrides keyed by provider name
    #[serde(default)]
    pub base_urls: HashMap<String, String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Tool server to launch
    #[serde(default = "default_server")]
    pub server: ServerCommand,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_server() -> ServerCommand {
    ServerCommand::new(DEFAULT_SERVER_PROGRAM)
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::default(),
            default_models: HashMap::new(),
            api_keys: HashMap::new(),
            base_urls: HashMap::new(),
            max_tokens: default_max_tokens(),
            temperature: None,
            max_iterations: default_max_iterations(),
            system_prompt: None,
            server: default_server(),
        }
    }
}

impl CliConfig {
    /// Return the default config file path: ~/.config/agentloop/config.toml
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("agentloop");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };
        Self::load_from(&config_path)
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(?config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))
    }

    /// Resolve an API key for the given provider.
    /// Priority: cli_override > env var > config file.
    pub fn resolve_api_key(&self, provider: ProviderKind, cli_override: Option<&str>) -> Option<String> {
        self.resolve_api_key_with(provider, cli_override, |var| std::env::var(var).ok())
    }

    fn resolve_api_key_with(
        &self,
        provider: ProviderKind,
        cli_override: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        if let Some(key) = cli_override {
            return Some(key.to_string());
        }
        if let Some(key) = env(provider.api_key_env()).filter(|k| !k.is_empty()) {
            return Some(key);
        }
        self.api_keys.get(&provider.to_string()).cloned()
    }

    /// Resolve the model name for a provider.
    /// Priority: cli_override > config file > provider default.
    pub fn resolve_model(&self, provider: ProviderKind, cli_override: Option<&str>) -> String {
        if let Some(model) = cli_override {
            return model.to_string();
        }
        self.default_models
            .get(&provider.to_string())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    /// Combine config and command line into the model client settings.
    pub fn model_config(&self, args: &CliArgs) -> Result<ModelConfig> {
        let provider = match args.provider.as_deref() {
            Some(name) => name.parse::<ProviderKind>()?,
            None => self.default_provider,
        };

        let mut config = ModelConfig::new(provider)
            .with_model(self.resolve_model(provider, args.model.as_deref()));
        config.api_key = self.resolve_api_key(provider, args.api_key.as_deref());
        config.base_url = args
            .base_url
            .clone()
            .or_else(|| self.base_urls.get(&provider.to_string()).cloned());
        config.max_tokens = args.max_tokens.unwrap_or(self.max_tokens);
        config.temperature = self.temperature;
        Ok(config)
    }

    /// The tool server to launch; `--server` replaces the configured command.
    pub fn server_command(&self, args: &CliArgs) -> ServerCommand {
        match &args.server {
            Some(program) => ServerCommand {
                program: program.clone(),
                args: args.server_args.clone(),
                env: Vec::new(),
            },
            None => self.server.clone(),
        }
    }

    pub fn system_prompt(&self, args: &CliArgs) -> String {
        args.system_prompt
            .clone()
            .or_else(|| self.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub fn max_iterations(&self, args: &CliArgs) -> usize {
        args.max_iterations.unwrap_or(self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.default_provider, ProviderKind::Gemini);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.server.program, "./bin/weather_server");
    }

    #[test]
    fn test_missing_file_gives_defaults_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.default_provider, ProviderKind::Gemini);
        assert!(!path.exists());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "openai"
max_iterations = 4

[default_models]
openai = "gpt-4.1-mini"

[base_urls]
openai = "http://localhost:11434"

[server]
program = "python3"
args = ["weather_server.py"]
"#
        )
        .unwrap();

        let config = CliConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.default_provider, ProviderKind::OpenAi);
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.server.args, vec!["weather_server.py"]);
        assert_eq!(config.resolve_model(ProviderKind::OpenAi, None), "gpt-4.1-mini");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = [").unwrap();
        let err = CliConfig::load(file.path().to_str()).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse config"));
    }

    #[test]
    fn test_resolve_model_defaults_and_override() {
        let config = CliConfig::default();
        assert_eq!(config.resolve_model(ProviderKind::Gemini, None), "gemini-2.5-flash-lite");
        assert_eq!(
            config.resolve_model(ProviderKind::Gemini, Some("gemini-2.5-pro")),
            "gemini-2.5-pro"
        );
    }

    #[test]
    fn test_api_key_priority() {
        let mut config = CliConfig::default();
        config.api_keys.insert("gemini".to_string(), "from-file".to_string());
        let env = |var: &str| (var == "GEMINI_API_KEY").then(|| "from-env".to_string());

        assert_eq!(
            config.resolve_api_key_with(ProviderKind::Gemini, Some("from-cli"), env),
            Some("from-cli".to_string())
        );
        assert_eq!(
            config.resolve_api_key_with(ProviderKind::Gemini, None, env),
            Some("from-env".to_string())
        );
        assert_eq!(
            config.resolve_api_key_with(ProviderKind::Gemini, None, no_env),
            Some("from-file".to_string())
        );
        assert_eq!(config.resolve_api_key_with(ProviderKind::OpenAi, None, no_env), None);
    }

    #[test]
    fn test_empty_env_key_falls_through() {
        let mut config = CliConfig::default();
        config.api_keys.insert("openai".to_string(), "sk-file".to_string());
        let env = |_: &str| Some(String::new());
        assert_eq!(
            config.resolve_api_key_with(ProviderKind::OpenAi, None, env),
            Some("sk-file".to_string())
        );
    }

    #[test]
    fn test_command_line_overrides() {
        let config = CliConfig::default();
        let args = CliArgs::parse_from([
            "agentloop",
            "--provider",
            "openai",
            "--model",
            "local-model",
            "--base-url",
            "http://127.0.0.1:8080",
            "--max-tokens",
            "256",
            "--server",
            "node",
            "--",
            "server.js",
        ]);

        let model = config.model_config(&args).unwrap();
        assert_eq!(model.provider, ProviderKind::OpenAi);
        assert_eq!(model.model, "local-model");
        assert_eq!(model.base_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(model.max_tokens, 256);

        let server = config.server_command(&args);
        assert_eq!(server.program, "node");
        assert_eq!(server.args, vec!["server.js"]);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let args = CliArgs::parse_from(["agentloop", "--provider", "claude"]);
        assert!(CliConfig::default().model_config(&args).is_err());
    }

    #[test]
    fn test_system_prompt_fallback() {
        let args = CliArgs::parse_from(["agentloop"]);
        let mut config = CliConfig::default();
        assert_eq!(config.system_prompt(&args), DEFAULT_SYSTEM_PROMPT);
        config.system_prompt = Some("Be brief.".to_string());
        assert_eq!(config.system_prompt(&args), "Be brief.");
        assert_eq!(config.max_iterations(&args), 10);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CliConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.server, config.server);
    }
}
