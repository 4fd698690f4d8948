use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::RelayConfig;

/// Loads the relay configuration from disk and the environment.
pub struct ConfigLoader {
    config: RelayConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > RELAY_CONFIG env > ./relay.toml > ~/.relay/relay.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("RELAY_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from("relay.toml");
        if local.exists() {
            return local;
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relay")
            .join("relay.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> relay_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            RelayConfig::default()
        };

        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(relay_core::RelayError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Parse TOML text into a config.
    pub fn parse(raw: &str, origin: &Path) -> relay_core::Result<RelayConfig> {
        toml::from_str::<RelayConfig>(raw).map_err(|e| {
            relay_core::RelayError::Config(format!("failed to parse {}: {}", origin.display(), e))
        })
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> RelayConfig {
        self.config.clone()
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (RELAY_LISTEN, RELAY_LOG_LEVEL, etc.).
    /// `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides(
        mut config: RelayConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> RelayConfig {
        if let Some(v) = lookup("RELAY_LISTEN") {
            config.server.listen = v;
        }
        if let Some(v) = lookup("RELAY_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("RELAY_REQUEST_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(secs) => config.bridge.request_timeout_secs = secs,
                Err(_) => warn!(value = %v, "ignoring non-numeric RELAY_REQUEST_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = lookup("RELAY_TICK_INTERVAL_MS") {
            match v.parse::<u64>() {
                Ok(ms) => config.dispatch.tick_interval_ms = ms,
                Err(_) => warn!(value = %v, "ignoring non-numeric RELAY_TICK_INTERVAL_MS"),
            }
        }
        config
    }
}
