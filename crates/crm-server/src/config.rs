//! Server configuration.

use std::time::Duration;

use crm_settings::CrmSettings;

/// Runtime configuration for [`CrmServer`](crate::CrmServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_bytes: usize,
    /// Close sessions with no inbound traffic for this long.
    pub idle_timeout: Option<Duration>,
    /// Idle watchdog tick.
    pub idle_check_interval: Duration,
    /// Characters of content kept in a conversation summary.
    pub summary_max_chars: usize,
    /// Dashboard broadcast period; `None` disables the push producer.
    pub dashboard_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_capacity: 256,
            max_message_bytes: 1024 * 1024,
            idle_timeout: None,
            idle_check_interval: Duration::from_secs(30),
            summary_max_chars: crm_core::constants::DEFAULT_SUMMARY_MAX_CHARS,
            dashboard_interval: None,
        }
    }
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &CrmSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            send_queue_capacity: settings.server.send_queue_capacity,
            max_message_bytes: settings.server.max_message_bytes,
            idle_timeout: settings.server.idle_timeout_secs.map(Duration::from_secs),
            idle_check_interval: Duration::from_secs(settings.server.idle_check_interval_secs),
            summary_max_chars: settings.im.summary_max_chars,
            dashboard_interval: settings
                .dashboard
                .enabled
                .then(|| Duration::from_secs(settings.dashboard.push_interval_secs)),
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
