//! Configuration loading and config file resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `GREETLINE_CONFIG` environment variable
//! 3. User config file (`~/.config/greetline/config.toml`)
//! 4. System config file (`/etc/greetline/config.toml`)
//!
//! Secrets may additionally be overridden from the environment so they never
//! have to be written to disk.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "GREETLINE_CONFIG";

/// Environment overrides for secrets
pub const TWILIO_ACCOUNT_SID_ENV: &str = "GREETLINE_TWILIO_ACCOUNT_SID";
pub const TWILIO_AUTH_TOKEN_ENV: &str = "GREETLINE_TWILIO_AUTH_TOKEN";
pub const SEARCH_API_KEY_ENV: &str = "GREETLINE_SEARCH_API_KEY";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GreetlineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
}

/// HTTP listener and public addressing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Absolute base URL the telephony provider uses to reach this service
    #[serde(default)]
    pub public_base_url: String,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Idle lifetime of a confirmation-flow session
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_base_url: String::new(),
            database_path: None,
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Phone numbers and call forwarding
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhoneConfig {
    /// Number inbound calls are forwarded to before voicemail
    #[serde(default)]
    pub real_phone_number: String,
    /// Ring timeout for the forwarded call, in seconds
    #[serde(default = "default_real_phone_timeout")]
    pub real_phone_timeout: u32,
    /// The service line whose greeting is managed
    #[serde(default)]
    pub service_phone_number: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            real_phone_number: String::new(),
            real_phone_timeout: default_real_phone_timeout(),
            service_phone_number: String::new(),
        }
    }
}

/// Messages spoken (or played, when a message is a URI) around the greeting track
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MessagesConfig {
    #[serde(default)]
    pub no_song: Vec<String>,
    #[serde(default)]
    pub pre_song: Vec<String>,
    #[serde(default)]
    pub post_song: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmsConfig {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
        }
    }
}

/// Music-search provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    /// Upper bound on candidates requested per search
    #[serde(default = "default_song_results")]
    pub song_results: u32,
    /// Preview-audio catalog candidates must be available through
    #[serde(default = "default_catalog")]
    pub catalog: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_search_base_url(),
            song_results: default_song_results(),
            catalog: default_catalog(),
        }
    }
}

/// Telephony provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_twilio_api_base_url")]
    pub api_base_url: String,
    /// Reject webhooks without a valid X-Twilio-Signature
    #[serde(default)]
    pub validate_signatures: bool,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            api_base_url: default_twilio_api_base_url(),
            validate_signatures: false,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:5740".to_string()
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_real_phone_timeout() -> u32 {
    20
}

fn default_command_prefix() -> String {
    "GREET".to_string()
}

fn default_search_base_url() -> String {
    "https://developer.echonest.com/api/v4".to_string()
}

fn default_song_results() -> u32 {
    15
}

fn default_catalog() -> String {
    "7digital-US".to_string()
}

fn default_twilio_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

impl GreetlineConfig {
    /// Load, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration without validating it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace secrets with values from the environment when present
    pub fn apply_env_overrides(&mut self) {
        if let Some(sid) = non_blank_env(TWILIO_ACCOUNT_SID_ENV) {
            self.twilio.account_sid = sid;
        }
        if let Some(token) = non_blank_env(TWILIO_AUTH_TOKEN_ENV) {
            self.twilio.auth_token = token;
        }
        if let Some(key) = non_blank_env(SEARCH_API_KEY_ENV) {
            self.search.api_key = key;
        }
    }

    /// Check every required key, reporting all problems at once
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        let required = [
            ("phone.real_phone_number", &self.phone.real_phone_number),
            ("phone.service_phone_number", &self.phone.service_phone_number),
            ("search.api_key", &self.search.api_key),
            ("twilio.account_sid", &self.twilio.account_sid),
            ("twilio.auth_token", &self.twilio.auth_token),
            ("sms.command_prefix", &self.sms.command_prefix),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                missing.push(key.to_string());
            }
        }

        match url::Url::parse(&self.server.public_base_url) {
            Ok(url) if url.has_host() => {}
            _ => missing.push("server.public_base_url (absolute URL)".to_string()),
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Missing or invalid settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Database file location, falling back to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.server
            .database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("greetline.db"))
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the config file to load
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(path) = non_blank_env(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3/4: user then system config file
    let user_config = dirs::config_dir().map(|d| d.join("greetline").join("config.toml"));
    let system_config = PathBuf::from("/etc/greetline/config.toml");

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    if system_config.exists() {
        return Some(system_config);
    }

    warn!("No greetline config file found");
    None
}

/// Get OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("greetline"))
        .unwrap_or_else(|| PathBuf::from("./greetline_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = GreetlineConfig::from_toml_str("").unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:5740");
        assert_eq!(config.server.session_ttl_secs, 3600);
        assert_eq!(config.phone.real_phone_timeout, 20);
        assert_eq!(config.sms.command_prefix, "GREET");
        assert_eq!(config.search.song_results, 15);
        assert_eq!(config.search.catalog, "7digital-US");
        assert!(config.messages.no_song.is_empty());
        assert!(!config.twilio.validate_signatures);
    }

    #[test]
    fn test_validate_reports_every_missing_key() {
        let config = GreetlineConfig::from_toml_str("").unwrap();
        let err = config.validate().unwrap_err().to_string();

        assert!(err.contains("phone.real_phone_number"));
        assert!(err.contains("phone.service_phone_number"));
        assert!(err.contains("search.api_key"));
        assert!(err.contains("twilio.auth_token"));
        assert!(err.contains("server.public_base_url"));
    }

    #[test]
    fn test_relative_public_base_url_rejected() {
        let config = GreetlineConfig::from_toml_str(
            r#"
            [server]
            public_base_url = "/relative"
            "#,
        )
        .unwrap();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.public_base_url"));
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let config = GreetlineConfig::from_toml_str(
            r#"
            [server]
            database_path = "/tmp/greetline-test.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/greetline-test.db"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = GreetlineConfig::from_toml_str("[phone\nreal_phone_number = 1");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }
}
