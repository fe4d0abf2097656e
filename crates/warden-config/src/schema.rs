use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `warden.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WardenConfig {
    pub governance: GovernanceConfig,
    pub ledger: LedgerConfig,
    pub queue: QueueConfig,
    pub executors: ExecutorsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

// ── Governance ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Consult governance for chat-path actions.
    pub check_chat: bool,
    /// Consult governance for proposal execution.
    pub check_proposals: bool,
    /// Consult governance for queued jobs.
    pub check_jobs: bool,
    /// Emergency bypass: every check passes, loudly. Never enable outside
    /// an incident.
    pub emergency_bypass: bool,
    /// Decision cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum cached decisions before LRU eviction.
    pub cache_capacity: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            check_chat: true,
            check_proposals: true,
            check_jobs: true,
            emergency_bypass: false,
            cache_ttl_secs: 60,
            cache_capacity: 4096,
        }
    }
}

// ── Ledger ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database path (None = ~/.warden/ledger.db).
    pub path: Option<PathBuf>,
    /// Executions still `running` after this many seconds are failed by
    /// the reconciliation pass.
    pub stale_execution_timeout_secs: u64,
    /// Interval between reconciliation passes.
    pub reconcile_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            stale_execution_timeout_secs: 600,
            reconcile_interval_secs: 60,
        }
    }
}

// ── Queue ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker poll interval in seconds.
    pub poll_interval_secs: u64,
    /// Lease duration before an unacked job is redelivered.
    pub lease_ttl_secs: u64,
    /// Number of worker loops to spawn.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            lease_ttl_secs: 120,
            workers: 2,
        }
    }
}

// ── Executors ──────────────────────────────────────────────────

/// Endpoints of the external executor collaborators. An unset endpoint
/// leaves that executor unconfigured; dispatching to it fails cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutorsConfig {
    pub browser_url: Option<String>,
    pub integration_url: Option<String>,
    pub workflow_url: Option<String>,
    pub agent_url: Option<String>,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Enable CORS (for dashboard development).
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3900".into(),
            cors: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl WardenConfig {
    /// Validate the config. Returns warnings for suspicious-but-usable
    /// values; errors only for values that cannot work at all.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.governance.emergency_bypass {
            warnings.push(
                "governance.emergency_bypass is ENABLED — every action will be allowed".into(),
            );
        }
        if self.governance.cache_ttl_secs == 0 {
            warnings.push("governance.cache_ttl_secs is 0 — every check hits the registry".into());
        }
        if self.governance.cache_capacity == 0 {
            return Err("governance.cache_capacity must be at least 1".into());
        }
        if self.queue.workers == 0 {
            return Err("queue.workers must be at least 1".into());
        }
        if self.queue.lease_ttl_secs < self.queue.poll_interval_secs {
            warnings.push(
                "queue.lease_ttl_secs is shorter than the poll interval — jobs may be redelivered while still running"
                    .into(),
            );
        }
        if self.ledger.stale_execution_timeout_secs < 60 {
            warnings.push(
                "ledger.stale_execution_timeout_secs under 60s will fail slow-but-healthy executions"
                    .into(),
            );
        }
        self.server
            .listen
            .parse::<std::net::SocketAddr>()
            .map_err(|e| format!("server.listen '{}' is not an address: {e}", self.server.listen))?;

        Ok(warnings)
    }
}
