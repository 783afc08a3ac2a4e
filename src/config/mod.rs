mod api;
mod defaults;
mod storage;
mod tools;
mod validation;

use crate::cli::Args;
use crate::error::LedgerChatError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use colored::*;

pub use api::{normalize_endpoint, ApiConfig};
pub use defaults::{DEFAULT_API_ENDPOINT, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
pub use storage::{default_ledger_path, default_store_dir, StorageConfig};
pub use tools::{ToolsConfig, WebSearchConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub default_model: Option<String>,
    /// Model used for the spending-wrapped deck; falls back to the chat model.
    #[serde(default)]
    pub artifact_model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_endpoint: String,
    pub model: String,
    pub artifact_model: String,
    pub system_prompt: String,
    pub stream_timeout: u64,
    pub max_turns: usize,
    pub verbose: bool,
    pub web_search: WebSearchConfig,
    pub ledger_path: PathBuf,
    pub store_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JsonConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_env_and_args(args: &Args) -> Self {
        // Logging is not set up yet; this runs first.
        let json_config = JsonConfig::load().unwrap_or_else(|e| {
            eprintln!("{} {:#}", "Warning: ignoring config file:".yellow(), e);
            JsonConfig::default()
        });

        Self::resolve(args, json_config, |name| env::var(name).ok())
    }

    /// Layer CLI args > environment > config file > defaults.
    pub fn resolve(args: &Args, json_config: JsonConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let chat = args.chat();

        let api_key = env("LEDGERCHAT_API_KEY").filter(|k| !k.trim().is_empty());

        let api_endpoint = chat
            .and_then(|c| c.api_endpoint.clone())
            .or_else(|| env("AI_API_ENDPOINT"))
            .or(json_config.api.endpoint)
            .map(normalize_endpoint)
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());

        let model = env("AI_MODEL")
            .or(json_config.model.default_model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let artifact_model = env("AI_ARTIFACT_MODEL")
            .or(json_config.model.artifact_model)
            .unwrap_or_else(|| model.clone());

        let system_prompt = env("AI_SYSTEM_PROMPT")
            .or(json_config.model.system_prompt)
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let stream_timeout = env("AI_STREAM_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .or(json_config.api.stream_timeout)
            .unwrap_or_else(defaults::default_stream_timeout);

        let max_turns = chat
            .and_then(|c| c.max_turns)
            .or_else(|| env("AI_MAX_TURNS").and_then(|s| s.parse::<usize>().ok()))
            .or(json_config.agent.max_turns)
            .filter(|n| *n >= 1)
            .unwrap_or_else(defaults::default_max_turns);

        let verbose = args.verbose
            || env("AI_VERBOSE")
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .or(json_config.session.verbose)
                .unwrap_or(false);

        let mut web_search = json_config.tools.web_search;
        if let Some(key) = env("EXA_API_KEY").filter(|k| !k.trim().is_empty()) {
            web_search.api_key = Some(key);
        }
        web_search.api_key = web_search
            .api_key
            .map(|k| validation::expand_with(&k, &env))
            .filter(|k| !k.contains("${"));

        let ledger_path = env("LEDGERCHAT_LEDGER")
            .or(json_config.storage.ledger_path)
            .map(|p| PathBuf::from(validation::expand_with(&p, &env)))
            .unwrap_or_else(default_ledger_path);

        let store_dir = env("LEDGERCHAT_STORE_DIR")
            .or(json_config.storage.store_dir)
            .map(|p| PathBuf::from(validation::expand_with(&p, &env)))
            .unwrap_or_else(default_store_dir);

        Config {
            api_key,
            api_endpoint,
            model,
            artifact_model,
            system_prompt,
            stream_timeout,
            max_turns,
            verbose,
            web_search,
            ledger_path,
            store_dir,
        }
    }

    pub fn require_api_key(&self) -> std::result::Result<&str, LedgerChatError> {
        self.api_key.as_deref().ok_or_else(|| {
            LedgerChatError::ConfigError("LEDGERCHAT_API_KEY environment variable not set".to_string())
        })
    }

    pub fn get_current_date() -> String {
        chrono::Local::now().format("%A, %B %d, %Y").to_string()
    }
}

impl JsonConfig {
    pub fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(JsonConfig::default())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );

        let config = if is_yaml {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))?
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config file: {}", path.display()))?
        };

        Ok(config)
    }

    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".ledgerchat.yaml"),
            PathBuf::from(".ledgerchat.yml"),
            PathBuf::from(".ledgerchat.json"),
        ];

        if let Some(home_dir) = dirs::home_dir() {
            let config_dir = home_dir.join(".config").join("ledgerchat");
            paths.push(config_dir.join("ledgerchat.yaml"));
            paths.push(config_dir.join("ledgerchat.yml"));
            paths.push(config_dir.join("ledgerchat.json"));
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn chat_args(extra: &[&str]) -> Args {
        let mut argv = vec!["ledgerchat", "chat"];
        argv.extend_from_slice(extra);
        argv.push("hello");
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::resolve(&chat_args(&[]), JsonConfig::default(), env_of(&[]));

        assert!(config.api_key.is_none());
        assert!(config.require_api_key().is_err());
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.artifact_model, DEFAULT_MODEL);
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.stream_timeout, 30);
        assert_eq!(config.web_search.num_results, 3);
        assert!(config.web_search.api_key.is_none());
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let mut file = JsonConfig::default();
        file.agent.max_turns = Some(4);
        file.api.endpoint = Some("http://file.test/v1".to_string());
        file.model.default_model = Some("file-model".to_string());

        let env = env_of(&[
            ("AI_MAX_TURNS", "6"),
            ("AI_MODEL", "env-model"),
            ("LEDGERCHAT_API_KEY", "sk-test"),
        ]);
        let config = Config::resolve(
            &chat_args(&["--max-turns", "2", "--api-endpoint", "http://cli.test/v1"]),
            file.clone(),
            env,
        );
        assert_eq!(config.max_turns, 2);
        assert_eq!(config.api_endpoint, "http://cli.test/v1/chat/completions");
        assert_eq!(config.model, "env-model");
        assert_eq!(config.require_api_key().unwrap(), "sk-test");

        let config = Config::resolve(&chat_args(&[]), file, env_of(&[]));
        assert_eq!(config.max_turns, 4);
        assert_eq!(config.api_endpoint, "http://file.test/v1/chat/completions");
        assert_eq!(config.model, "file-model");
    }

    #[test]
    fn zero_turns_falls_back_to_default() {
        let mut file = JsonConfig::default();
        file.agent.max_turns = Some(0);
        let config = Config::resolve(&chat_args(&[]), file, env_of(&[]));
        assert_eq!(config.max_turns, 10);

        let config = Config::resolve(&chat_args(&[]), JsonConfig::default(), env_of(&[("AI_MAX_TURNS", "0")]));
        assert_eq!(config.max_turns, 10);
    }

    #[test]
    fn paths_expand_env_references() {
        let mut file = JsonConfig::default();
        file.storage.ledger_path = Some("${BOOKS}/tx.csv".to_string());
        file.tools.web_search.api_key = Some("${MISSING_KEY}".to_string());

        let config = Config::resolve(&chat_args(&[]), file, env_of(&[("BOOKS", "/srv/books")]));
        assert_eq!(config.ledger_path, PathBuf::from("/srv/books/tx.csv"));
        assert!(config.web_search.api_key.is_none());
    }

    #[test]
    fn loads_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledgerchat.yaml");
        fs::write(
            &path,
            "model:\n  default_model: openai/gpt-4o\nagent:\n  max_turns: 3\ntools:\n  web_search:\n    num_results: 5\n",
        )
        .unwrap();

        let config = JsonConfig::load_from(&path).unwrap();
        assert_eq!(config.model.default_model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(config.agent.max_turns, Some(3));
        assert_eq!(config.tools.web_search.num_results, 5);
        assert_eq!(config.tools.web_search.endpoint, "https://api.exa.ai/search");
    }
}
