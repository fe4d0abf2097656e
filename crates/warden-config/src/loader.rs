use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads the Warden configuration from disk plus environment overrides.
pub struct ConfigLoader {
    config: WardenConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<WardenConfig>(&raw).map_err(|e| {
                warden_core::WardenError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(warden_core::WardenError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Get a snapshot of the loaded config.
    pub fn get(&self) -> WardenConfig {
        self.config.clone()
    }

    /// Path the config was loaded from (or would be written to).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides. The feature flags are environment-first so
    /// an operator can flip them on a running deployment's next restart
    /// without editing the file.
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Some(v) = env_bool("WARDEN_EMERGENCY_BYPASS") {
            config.governance.emergency_bypass = v;
        }
        if let Some(v) = env_bool("WARDEN_GOVERNANCE_CHECK_CHAT") {
            config.governance.check_chat = v;
        }
        if let Some(v) = env_bool("WARDEN_GOVERNANCE_CHECK_PROPOSALS") {
            config.governance.check_proposals = v;
        }
        if let Some(v) = env_bool("WARDEN_GOVERNANCE_CHECK_JOBS") {
            config.governance.check_jobs = v;
        }
        if let Ok(v) = std::env::var("WARDEN_CACHE_TTL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.governance.cache_ttl_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LEDGER_PATH") {
            config.ledger.path = Some(PathBuf::from(v));
        }
        config
    }
}

/// Parse a boolean-ish env var: "1"/"true"/"yes" → true, "0"/"false"/"no" → false.
fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                warn!(var = key, value = %v, "unparseable boolean env var — ignoring");
                None
            }
        },
        Err(_) => None,
    }
}
