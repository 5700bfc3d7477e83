use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

/// Top-level config (herald.toml + HERALD_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            dispatch: DispatchConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

impl HeraldConfig {
    /// Load from `config_path`, falling back to `~/.herald/herald.toml`,
    /// with `HERALD_*` environment overrides applied on top.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HeraldConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HERALD_").split("_"))
            .extract()
            .map_err(|e| ConfigError(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Control-plane SQLite file: announcements, triggers, sagas, platforms.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Directory holding one SQLite file per connected tenant
    /// (`<tenant_root>/<guild_id>.db`).
    #[serde(default = "default_tenant_root")]
    pub tenant_root: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            tenant_root: default_tenant_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Trigger polling cadence in seconds.
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_secs(),
        }
    }
}

/// Bounds for the Dispatching step of a saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of concurrently in-flight platform sends per saga.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Attempt ceiling per dispatch unit before a transient failure is
    /// reclassified as permanent.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token. Override with env var: HERALD_DISCORD_TOKEN
    pub token: Option<String>,
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.db", home)
}

fn default_tenant_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/tenants", home)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.toml", home)
}

fn default_poll_secs() -> u64 {
    1
}

fn default_max_in_flight() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_base_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = HeraldConfig::default();
        assert_eq!(cfg.scheduler.poll_interval_secs, 1);
        assert!(cfg.dispatch.max_in_flight > 0);
        assert!(cfg.dispatch.max_attempts > 0);
        assert!(cfg.discord.token.is_none());
    }

    #[test]
    fn dispatch_config_roundtrips_through_toml() {
        let cfg: HeraldConfig = Figment::new()
            .merge(Toml::string(
                "[dispatch]\nmax_in_flight = 2\nmax_attempts = 7\n",
            ))
            .extract()
            .unwrap();
        assert_eq!(cfg.dispatch.max_in_flight, 2);
        assert_eq!(cfg.dispatch.max_attempts, 7);
        // unspecified field keeps its default
        assert_eq!(cfg.dispatch.backoff_base_ms, 500);
    }
}
