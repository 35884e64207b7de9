use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use roundtable_types::{EngineConfig, TimeoutPolicy};

/// Runtime settings of the engine.
///
/// Every section is optional; missing values fall back to the engine defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub policy: PolicySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    pub channel_capacity: usize,
    pub stream_poll_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            channel_capacity: 1_000,
            stream_poll_interval_ms: 500,
        }
    }
}

/// Timeout table, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub config_change_timeout: u64,
    pub synthesis_streaming_override: u64,
    pub placeholder_override: u64,
    /// `0` disables the ready-synthesis override
    pub ready_synthesis_override: u64,
    pub active_stream_wait: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            config_change_timeout: 30,
            synthesis_streaming_override: 60,
            placeholder_override: 15,
            ready_synthesis_override: 60,
            active_stream_wait: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. ROUNDTABLE_* environment variables, e.g. `ROUNDTABLE_POLICY__PLACEHOLDER_OVERRIDE=20`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("ROUNDTABLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::from(self.clone())
    }
}

impl From<PolicySettings> for TimeoutPolicy {
    fn from(settings: PolicySettings) -> Self {
        let ready = (settings.ready_synthesis_override > 0)
            .then(|| Duration::from_secs(settings.ready_synthesis_override));

        TimeoutPolicy::new()
            .with_config_change_timeout(Duration::from_secs(settings.config_change_timeout))
            .with_synthesis_streaming_override(Duration::from_secs(
                settings.synthesis_streaming_override,
            ))
            .with_placeholder_override(Duration::from_secs(settings.placeholder_override))
            .with_ready_synthesis_override(ready)
            .with_active_stream_wait(Duration::from_secs(settings.active_stream_wait))
    }
}

impl From<Settings> for EngineConfig {
    fn from(settings: Settings) -> Self {
        EngineConfig::new()
            .with_policy(settings.policy.into())
            .with_tick_interval(Duration::from_millis(settings.engine.tick_interval_ms))
            .with_channel_capacity(settings.engine.channel_capacity)
            .with_stream_poll_interval(Duration::from_millis(
                settings.engine.stream_poll_interval_ms,
            ))
    }
}
