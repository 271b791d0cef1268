//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.relay/config.json`) and then
//! overridden from the environment. Built once at startup and handed to each collaborator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// WhatsApp Cloud API credentials and webhook verify token.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Completion service (Gemini) settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Remote conversation history store.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Scheduling link substitution.
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8000). Overridden by RELAY_PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the provider must reach the webhook). Overridden by RELAY_BIND env.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Name reported by `GET /`.
    #[serde(default = "default_assistant_name")]
    pub name: String,
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_assistant_name() -> String {
    "Sofia - Assistente IA Cognox.ai".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            name: default_assistant_name(),
        }
    }
}

/// WhatsApp Cloud API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    /// Bearer token for the send API. Overridden by META_ACCESS_TOKEN env.
    pub access_token: Option<String>,
    /// Business phone number id used in the send URL. Overridden by PHONE_NUMBER_ID env.
    pub phone_number_id: Option<String>,
    /// Shared secret for the webhook handshake. Overridden by META_VERIFY_TOKEN env.
    pub verify_token: Option<String>,
    /// Graph API base (default https://graph.facebook.com).
    pub api_base: Option<String>,
    /// Graph API version segment (default v20.0).
    pub api_version: Option<String>,
}

/// Completion service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Gemini API key. Overridden by GEMINI_API_KEY env.
    pub api_key: Option<String>,
    /// Model id (default gemini-1.5-flash).
    pub model: Option<String>,
    /// API base URL (default https://generativelanguage.googleapis.com).
    pub base_url: Option<String>,
    /// Sampling temperature (default 0.7).
    pub temperature: Option<f32>,
    /// File with the system instructions. When absent or empty the built-in prompt is used.
    pub prompt_file: Option<PathBuf>,
}

/// History store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Redis URL (redis:// or rediss://). Overridden by UPSTASH_REDIS_URL env.
    /// When unset, history is kept in process memory only.
    pub url: Option<String>,
    /// Key prefix for per-sender lists (default "message_store:").
    pub key_prefix: Option<String>,
    /// When set, the key's expiry is refreshed on every append.
    pub ttl_secs: Option<u64>,
}

/// Scheduling link settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    /// Public booking page base (default https://calendly.com/cognoxai).
    pub base_url: Option<String>,
    /// Event type identifier appended to the base. Overridden by CALENDLY_EVENT_TYPE_UUID env.
    pub event_type: Option<String>,
    /// Scheduling API token. Overridden by CALENDLY_API_TOKEN env.
    pub api_token: Option<String>,
    /// Scheduling API base (default https://api.calendly.com).
    pub api_base: Option<String>,
    /// Create a single-use booking link per reply (requires api_token). Default: false.
    #[serde(default)]
    pub single_use_links: bool,
}

pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com";
pub const DEFAULT_WHATSAPP_API_VERSION: &str = "v20.0";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_HISTORY_KEY_PREFIX: &str = "message_store:";
pub const DEFAULT_SCHEDULING_BASE_URL: &str = "https://calendly.com/cognoxai";
pub const DEFAULT_SCHEDULING_API_BASE: &str = "https://api.calendly.com";
pub const DEFAULT_EVENT_TYPE: &str = "15min";

/// Trimmed, non-empty value or None.
fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn non_blank_opt(s: Option<&String>) -> Option<String> {
    s.and_then(|v| non_blank(v))
}

impl Config {
    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply environment overrides using `lookup` (blank values count as unset).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).and_then(|v| non_blank(&v));

        if let Some(v) = get("GEMINI_API_KEY") {
            self.agent.api_key = Some(v);
        }
        if let Some(v) = get("META_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(v);
        }
        if let Some(v) = get("PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(v);
        }
        if let Some(v) = get("META_VERIFY_TOKEN") {
            self.whatsapp.verify_token = Some(v);
        }
        if let Some(v) = get("UPSTASH_REDIS_URL") {
            self.history.url = Some(v);
        }
        if let Some(v) = get("CALENDLY_API_TOKEN") {
            self.scheduling.api_token = Some(v);
        }
        if let Some(v) = get("CALENDLY_EVENT_TYPE_UUID") {
            self.scheduling.event_type = Some(v);
        }
        if let Some(v) = get("RELAY_BIND") {
            self.gateway.bind = v;
        }
        if let Some(v) = get("RELAY_PORT") {
            self.gateway.port = v
                .parse()
                .with_context(|| format!("invalid RELAY_PORT: {}", v))?;
        }
        Ok(())
    }

    /// Log what is missing for a working relay. Nothing here is fatal: each gap surfaces per message.
    pub fn warn_missing(&self) {
        if resolve_verify_token(self).is_none() {
            log::warn!("no webhook verify token configured (META_VERIFY_TOKEN); every handshake will be rejected");
        }
        if non_blank_opt(self.whatsapp.access_token.as_ref()).is_none()
            || non_blank_opt(self.whatsapp.phone_number_id.as_ref()).is_none()
        {
            log::warn!("whatsapp access token or phone number id missing; replies cannot be sent");
        }
        if non_blank_opt(self.agent.api_key.as_ref()).is_none() {
            log::warn!("no completion api key configured (GEMINI_API_KEY); every reply will be the apology");
        }
        if resolve_history_url(self).is_none() {
            log::warn!("no history store url configured (UPSTASH_REDIS_URL); history is kept in memory only");
        }
    }
}

/// Webhook verify token, if configured.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    non_blank_opt(config.whatsapp.verify_token.as_ref())
}

/// Graph API base URL without trailing slash.
pub fn resolve_whatsapp_api_base(config: &Config) -> String {
    non_blank_opt(config.whatsapp.api_base.as_ref())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string())
}

pub fn resolve_whatsapp_api_version(config: &Config) -> String {
    non_blank_opt(config.whatsapp.api_version.as_ref())
        .unwrap_or_else(|| DEFAULT_WHATSAPP_API_VERSION.to_string())
}

pub fn resolve_model(config: &Config) -> String {
    non_blank_opt(config.agent.model.as_ref()).unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

pub fn resolve_gemini_base_url(config: &Config) -> String {
    non_blank_opt(config.agent.base_url.as_ref())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
}

pub fn resolve_temperature(config: &Config) -> f32 {
    config.agent.temperature.unwrap_or(DEFAULT_TEMPERATURE)
}

pub fn resolve_history_url(config: &Config) -> Option<String> {
    non_blank_opt(config.history.url.as_ref())
}

pub fn resolve_history_key_prefix(config: &Config) -> String {
    config
        .history
        .key_prefix
        .clone()
        .unwrap_or_else(|| DEFAULT_HISTORY_KEY_PREFIX.to_string())
}

/// Event type segment for the booking URL; "15min" when unset or blank.
pub fn resolve_event_type(config: &Config) -> String {
    non_blank_opt(config.scheduling.event_type.as_ref())
        .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string())
}

pub fn resolve_scheduling_base_url(config: &Config) -> String {
    non_blank_opt(config.scheduling.base_url.as_ref())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_SCHEDULING_BASE_URL.to_string())
}

pub fn resolve_scheduling_api_base(config: &Config) -> String {
    non_blank_opt(config.scheduling.api_base.as_ref())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_SCHEDULING_API_BASE.to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default path) and apply environment overrides.
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    config.apply_env()?;
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 8000);
        assert_eq!(g.bind, "0.0.0.0");
    }

    #[test]
    fn empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(resolve_model(&config), DEFAULT_MODEL);
        assert_eq!(resolve_event_type(&config), "15min");
        assert_eq!(resolve_history_key_prefix(&config), "message_store:");
        assert!(!config.scheduling.single_use_links);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = serde_json::from_str(
            r#"{"whatsapp": {"verifyToken": "from-file", "phoneNumberId": "1"}}"#,
        )
        .unwrap();
        config
            .apply_env_with(lookup(&[
                ("META_VERIFY_TOKEN", "from-env"),
                ("GEMINI_API_KEY", "key"),
                ("CALENDLY_EVENT_TYPE_UUID", "abc-123"),
                ("RELAY_PORT", "9090"),
            ]))
            .unwrap();
        assert_eq!(resolve_verify_token(&config).as_deref(), Some("from-env"));
        assert_eq!(config.whatsapp.phone_number_id.as_deref(), Some("1"));
        assert_eq!(config.agent.api_key.as_deref(), Some("key"));
        assert_eq!(resolve_event_type(&config), "abc-123");
        assert_eq!(config.gateway.port, 9090);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.whatsapp.verify_token = Some("kept".to_string());
        config
            .apply_env_with(lookup(&[("META_VERIFY_TOKEN", "   "), ("CALENDLY_EVENT_TYPE_UUID", "")]))
            .unwrap();
        assert_eq!(resolve_verify_token(&config).as_deref(), Some("kept"));
        assert_eq!(resolve_event_type(&config), "15min");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let mut config = Config::default();
        assert!(config
            .apply_env_with(lookup(&[("RELAY_PORT", "eighty")]))
            .is_err());
    }

    #[test]
    fn urls_lose_trailing_slash() {
        let mut config = Config::default();
        config.whatsapp.api_base = Some("http://127.0.0.1:9999/".to_string());
        config.scheduling.base_url = Some("https://book.example.com/team/".to_string());
        assert_eq!(resolve_whatsapp_api_base(&config), "http://127.0.0.1:9999");
        assert_eq!(resolve_scheduling_base_url(&config), "https://book.example.com/team");
        assert_eq!(resolve_whatsapp_api_version(&config), "v20.0");
    }
}
