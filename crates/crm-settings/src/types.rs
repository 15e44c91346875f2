//! Settings sections.
//!
//! Every section derives `Default` and uses `#[serde(default)]`, so a partial
//! JSON file only needs to name the keys it changes.

use crm_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrmSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Credential verification.
    pub auth: AuthSettings,
    /// SQLite database.
    pub database: DatabaseSettings,
    /// Dashboard push producer.
    pub dashboard: DashboardSettings,
    /// Instant-messaging pipeline.
    pub im: ImSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl CrmSettings {
    /// Check cross-field constraints after all layers are applied.
    pub fn validate(&self) -> Result<()> {
        if self.server.send_queue_capacity == 0 {
            return Err(invalid("server.sendQueueCapacity must be >= 1"));
        }
        if self.server.max_message_bytes == 0 {
            return Err(invalid("server.maxMessageBytes must be >= 1"));
        }
        if self.server.idle_timeout_secs == Some(0) {
            return Err(invalid("server.idleTimeoutSecs must be >= 1 when set"));
        }
        if self.server.idle_check_interval_secs == 0 {
            return Err(invalid("server.idleCheckIntervalSecs must be >= 1"));
        }
        if !matches!(self.auth.jwt_algorithm.as_str(), "HS256" | "HS384" | "HS512") {
            return Err(invalid(format!(
                "auth.jwtAlgorithm must be HS256, HS384 or HS512 (got {})",
                self.auth.jwt_algorithm
            )));
        }
        if self.database.pool_size == 0 {
            return Err(invalid("database.poolSize must be >= 1"));
        }
        if self.dashboard.push_interval_secs == 0 {
            return Err(invalid("dashboard.pushIntervalSecs must be >= 1"));
        }
        if self.im.summary_max_chars == 0 {
            return Err(invalid("im.summaryMaxChars must be >= 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(msg.into())
}

/// Listener and per-connection limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 picks an ephemeral port).
    pub port: u16,
    /// Outbound frames buffered per connection before sends are dropped.
    pub send_queue_capacity: usize,
    /// Largest inbound frame accepted.
    pub max_message_bytes: usize,
    /// Close sessions silent for this long. Unset disables the watchdog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    /// How often the idle watchdog checks.
    pub idle_check_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            send_queue_capacity: 256,
            max_message_bytes: 1024 * 1024,
            idle_timeout_secs: None,
            idle_check_interval_secs: 30,
        }
    }
}

/// Placeholder secret shipped in the defaults.
pub const DEFAULT_JWT_SECRET: &str = "change-me";

/// JWT verification parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Shared HMAC secret.
    pub jwt_secret: String,
    /// `HS256`, `HS384` or `HS512`.
    pub jwt_algorithm: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_algorithm: "HS256".to_string(),
        }
    }
}

impl AuthSettings {
    /// Whether the secret is still the shipped placeholder.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// SQLite location and pool size.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Database file; relative paths resolve against `~/.crm`.
    pub path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "database/crm.db".to_string(),
            pool_size: 8,
        }
    }
}

/// Periodic dashboard broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    /// Run the push producer.
    pub enabled: bool,
    /// Seconds between broadcasts.
    pub push_interval_secs: u64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            push_interval_secs: 10,
        }
    }
}

/// Message pipeline knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImSettings {
    /// Characters of content kept in a conversation's last-message summary.
    pub summary_max_chars: usize,
}

impl Default for ImSettings {
    fn default() -> Self {
        Self {
            summary_max_chars: crm_core::constants::DEFAULT_SUMMARY_MAX_CHARS,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
