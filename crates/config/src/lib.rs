//! Layered configuration for the VTS voice gateway (§6)
//!
//! Settings are assembled from, in increasing priority:
//! - `config/default.{toml,yaml}`
//! - `config/{environment}.{toml,yaml}`
//! - environment variables under the `VTS_GATEWAY__` prefix

pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    load_settings, AsrConfig, ConnectionConfig, ConversationConfig, LlmConfig,
    ObservabilityConfig, PersistenceBackend, PersistenceConfig, RuntimeConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};
