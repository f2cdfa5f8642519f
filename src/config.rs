use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Public global ban list the bot checks every sender against.
const DEFAULT_GBAN_URL: &str = "https://raw.githubusercontent.com/notsopreety/Uselessrepo/main/gban.json";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    #[serde(default = "default_prefix")]
    prefix: String,
    /// Bot admins; may be empty.
    #[serde(default)]
    admin_ids: Vec<i64>,
    #[serde(default = "default_bot_name")]
    bot_name: String,
    #[serde(default = "default_cooldown_secs")]
    default_cooldown_secs: u64,
    /// Per-command cooldown overrides in seconds, keyed by command name.
    #[serde(default)]
    cooldown_overrides: HashMap<String, u64>,
    /// Base URL of the content API used by commands.
    #[serde(default)]
    global_api: String,
    gban_url: Option<String>,
    database_path: Option<String>,
    /// Directory for state files (logs, media cache). Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_prefix() -> String {
    "/".to_string()
}

fn default_bot_name() -> String {
    "cmdgate".to_string()
}

fn default_cooldown_secs() -> u64 {
    3
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub prefix: String,
    pub admin_ids: HashSet<i64>,
    pub bot_name: String,
    pub default_cooldown: Duration,
    /// Lowercased command name → cooldown.
    pub cooldown_overrides: HashMap<String, Duration>,
    pub global_api: String,
    pub gban_url: String,
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.prefix.is_empty() || file.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(
                "prefix must be non-empty and contain no whitespace".into()
            ));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let database_path = file
            .database_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("cmdgate.db"));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            prefix: file.prefix,
            admin_ids: file.admin_ids.into_iter().collect(),
            bot_name: file.bot_name,
            default_cooldown: Duration::from_secs(file.default_cooldown_secs),
            cooldown_overrides: file
                .cooldown_overrides
                .into_iter()
                .map(|(name, secs)| (name.to_lowercase(), Duration::from_secs(secs)))
                .collect(),
            global_api: file.global_api.trim_end_matches('/').to_string(),
            gban_url: file.gban_url.unwrap_or_else(|| DEFAULT_GBAN_URL.to_string()),
            database_path,
            data_dir,
            port: file.port,
        })
    }

    /// Settings for tests: `/` prefix, no admins, no network endpoints.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            telegram_bot_token: "123456789:TEST".to_string(),
            prefix: "/".to_string(),
            admin_ids: HashSet::new(),
            bot_name: "cmdgate".to_string(),
            default_cooldown: Duration::from_secs(3),
            cooldown_overrides: HashMap::new(),
            global_api: "http://127.0.0.1:9".to_string(),
            gban_url: "http://127.0.0.1:9/gban.json".to_string(),
            database_path: PathBuf::from(":memory:"),
            data_dir: std::env::temp_dir().join("cmdgate-tests"),
            port: 0,
        }
    }
}
