//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default location of the step definitions file.
pub const DEFAULT_STEPS_PATH: &str = "./data/survey_steps.json";
/// Default location of the per-model generation parameters.
pub const DEFAULT_MODEL_PARAMS_PATH: &str = "./data/model_params.json";
/// Default hosted inference endpoint.
pub const DEFAULT_INFERENCE_URL: &str = "https://api-inference.huggingface.co";
/// Notice shown in place of generated text when a backend call fails.
pub const DEFAULT_FALLBACK_NOTICE: &str =
    "(The text generator is unavailable right now, here is the standard question.)";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token. `None` runs the CLI channel only.
    pub telegram_token: Option<String>,
    /// Telegram usernames or numeric ids allowed to talk to the bot (`*` = everyone).
    pub telegram_allowed_users: Vec<String>,
    /// Path of the step definitions JSON.
    pub steps_path: PathBuf,
    /// Path of the per-model generation parameters JSON.
    pub model_params_path: PathBuf,
    /// Backend active at startup.
    pub default_backend: String,
    /// Upper bound of a single `generate` call.
    pub generation_timeout: Duration,
    /// Upper bound of loading a backend during a swap.
    pub backend_load_timeout: Duration,
    /// Base URL of the hosted text-generation endpoint.
    pub inference_url: String,
    /// Bearer token for the hosted endpoint.
    pub inference_token: Option<SecretString>,
    pub anthropic: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    /// Port of the status HTTP server, if enabled.
    pub status_port: Option<u16>,
    /// JSON-lines file receiving completed surveys.
    pub results_path: Option<PathBuf>,
    /// Directory for rolling log files.
    pub log_dir: Option<PathBuf>,
    pub fallback_notice: String,
}

/// API credentials for a hosted chat-model provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            telegram_allowed_users: vec!["*".to_string()],
            steps_path: PathBuf::from(DEFAULT_STEPS_PATH),
            model_params_path: PathBuf::from(DEFAULT_MODEL_PARAMS_PATH),
            default_backend: crate::llm::STATIC_BACKEND.to_string(),
            generation_timeout: Duration::from_secs(30),
            backend_load_timeout: Duration::from_secs(120),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            inference_token: None,
            anthropic: None,
            openai: None,
            status_port: None,
            results_path: None,
            log_dir: None,
            fallback_notice: DEFAULT_FALLBACK_NOTICE.to_string(),
        }
    }
}

impl BotConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let telegram_allowed_users = get("TELEGRAM_ALLOWED_USERS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.telegram_allowed_users);

        let generation_timeout = match get("SURVEY_GENERATION_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("SURVEY_GENERATION_TIMEOUT_SECS", &raw)?),
            None => defaults.generation_timeout,
        };
        let backend_load_timeout = match get("SURVEY_BACKEND_LOAD_TIMEOUT_SECS") {
            Some(raw) => {
                Duration::from_secs(parse_number("SURVEY_BACKEND_LOAD_TIMEOUT_SECS", &raw)?)
            }
            None => defaults.backend_load_timeout,
        };
        let status_port = get("SURVEY_STATUS_PORT")
            .map(|raw| parse_number::<u16>("SURVEY_STATUS_PORT", &raw))
            .transpose()?;

        let anthropic = get("ANTHROPIC_API_KEY").map(|key| ProviderConfig {
            api_key: SecretString::from(key),
            model: get("SURVEY_ANTHROPIC_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
        });
        let openai = get("OPENAI_API_KEY").map(|key| ProviderConfig {
            api_key: SecretString::from(key),
            model: get("SURVEY_OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
        });

        Ok(Self {
            telegram_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_allowed_users,
            steps_path: get("SURVEY_STEPS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.steps_path),
            model_params_path: get("SURVEY_MODEL_PARAMS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_params_path),
            default_backend: get("SURVEY_DEFAULT_BACKEND").unwrap_or(defaults.default_backend),
            generation_timeout,
            backend_load_timeout,
            inference_url: get("SURVEY_INFERENCE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.inference_url),
            inference_token: get("SURVEY_INFERENCE_TOKEN").map(SecretString::from),
            anthropic,
            openai,
            status_port,
            results_path: get("SURVEY_RESULTS_PATH").map(PathBuf::from),
            log_dir: get("SURVEY_LOG_DIR").map(PathBuf::from),
            fallback_notice: get("SURVEY_FALLBACK_NOTICE").unwrap_or(defaults.fallback_notice),
        })
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = BotConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.telegram_token.is_none());
        assert_eq!(config.telegram_allowed_users, vec!["*"]);
        assert_eq!(config.default_backend, "static");
        assert_eq!(config.generation_timeout, Duration::from_secs(30));
        assert_eq!(config.steps_path, PathBuf::from(DEFAULT_STEPS_PATH));
        assert!(config.anthropic.is_none());
        assert!(config.status_port.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:ABC"),
            ("TELEGRAM_ALLOWED_USERS", "alice, 42 ,"),
            ("SURVEY_GENERATION_TIMEOUT_SECS", "5"),
            ("SURVEY_STATUS_PORT", "8081"),
            ("SURVEY_INFERENCE_URL", "http://localhost:9000/"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]))
        .unwrap();
        assert_eq!(config.telegram_token.as_deref(), Some("123:ABC"));
        assert_eq!(config.telegram_allowed_users, vec!["alice", "42"]);
        assert_eq!(config.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.status_port, Some(8081));
        assert_eq!(config.inference_url, "http://localhost:9000");
        let anthropic = config.anthropic.unwrap();
        assert_eq!(anthropic.api_key.expose_secret(), "sk-ant");
        assert_eq!(anthropic.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = BotConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap();
        assert!(config.telegram_token.is_none());
    }

    #[test]
    fn invalid_number_is_a_config_error() {
        let err = BotConfig::from_lookup(lookup(&[("SURVEY_GENERATION_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SURVEY_GENERATION_TIMEOUT_SECS"));
    }
}
