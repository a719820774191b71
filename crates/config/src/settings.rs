//! Main settings module (§6)

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    Memory,
    Scylla,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_media_encoding")]
    pub media_encoding: String,
    #[serde(default)]
    pub vocabulary_name: Option<String>,
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            language_code: default_language_code(),
            sample_rate_hz: default_sample_rate_hz(),
            media_encoding: default_media_encoding(),
            vocabulary_name: None,
            max_concurrent_sessions: default_max_concurrent_sessions(),
        }
    }
}

fn default_language_code() -> String {
    "ja-JP".to_string()
}
fn default_sample_rate_hz() -> u32 {
    16_000
}
fn default_media_encoding() -> String {
    "pcm".to_string()
}
fn default_max_concurrent_sessions() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_llm_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_id: None,
            api_key: None,
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_ms: default_llm_timeout_ms(),
            max_concurrent: default_llm_max_concurrent(),
        }
    }
}

fn default_llm_max_tokens() -> usize {
    300
}
fn default_llm_temperature() -> f32 {
    0.3
}
fn default_llm_timeout_ms() -> u64 {
    5_000
}
fn default_llm_max_concurrent() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_inactivity_health_seconds")]
    pub inactivity_health_seconds: i64,
    #[serde(default = "default_connection_ttl_seconds")]
    pub ttl_seconds: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            inactivity_health_seconds: default_inactivity_health_seconds(),
            ttl_seconds: default_connection_ttl_seconds(),
        }
    }
}

fn default_inactivity_health_seconds() -> i64 {
    300
}
fn default_connection_ttl_seconds() -> i64 {
    86_400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_item_ttl_days")]
    pub item_ttl_days: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            item_ttl_days: default_item_ttl_days(),
        }
    }
}

fn default_item_ttl_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_format: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: None,
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ObservabilityConfig {
    /// `log_format` falls back to `pretty` in development, `json` in
    /// production, unless explicitly set (§6).
    pub fn resolved_log_format(&self, environment: RuntimeEnvironment) -> &str {
        self.log_format.as_deref().unwrap_or(if environment.is_production() { "json" } else { "pretty" })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub keyspace: Option<String>,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: None,
            replication_factor: default_replication_factor(),
        }
    }
}

fn default_replication_factor() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub asr: AsrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub save_audio_to_storage: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict validation only applies in staging/production (§6).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.backend == PersistenceBackend::Scylla {
            if self.persistence.hosts.is_empty() {
                return Err(ConfigError::MissingField("persistence.hosts".to_string()));
            }
            if self.persistence.keyspace.is_none() {
                return Err(ConfigError::MissingField("persistence.keyspace".to_string()));
            }
        }

        if self.runtime.environment.is_strict() && self.llm.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(ConfigError::MissingField("llm.apiKey".to_string()));
        }

        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", self.llm.temperature),
            });
        }

        Ok(())
    }
}

/// Load settings from layered files and environment variables.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`VTS_GATEWAY__` prefix, `__` nesting separator)
/// 2. `config/{env}.{toml,yaml}`
/// 3. `config/default.{toml,yaml}`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(Environment::with_prefix("VTS_GATEWAY").separator("__").try_parsing(true));

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.asr.language_code, "ja-JP");
        assert_eq!(settings.asr.sample_rate_hz, 16_000);
        assert_eq!(settings.llm.max_tokens, 300);
        assert_eq!(settings.llm.max_concurrent, 10);
        assert_eq!(settings.connection.ttl_seconds, 86_400);
        assert_eq!(settings.conversation.item_ttl_days, 30);
        assert_eq!(settings.server.port, 8080);
        assert!(!settings.save_audio_to_storage);
    }

    #[test]
    fn production_requires_llm_api_key() {
        let mut settings = Settings::default();
        settings.runtime.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());

        settings.llm.api_key = Some("secret".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn scylla_backend_requires_keyspace() {
        let mut settings = Settings::default();
        settings.persistence.backend = PersistenceBackend::Scylla;
        assert!(settings.validate().is_err());

        settings.persistence.keyspace = Some("vts_gateway".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn log_format_defaults_by_environment() {
        let observability = ObservabilityConfig::default();
        assert_eq!(observability.resolved_log_format(RuntimeEnvironment::Development), "pretty");
        assert_eq!(observability.resolved_log_format(RuntimeEnvironment::Production), "json");
    }
}
