use serde::{Deserialize, Serialize};

/// Root configuration, maps to `relay.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP/WebSocket listen address.
    pub listen: String,
    /// Enable permissive CORS (for task pages served from another origin).
    pub cors: bool,
    /// Maximum accepted request body size for `/submit_task` uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".into(),
            cors: false,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

// ── Dispatch ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause between two dispatch ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Delay before the single resend attempt after a failed socket send.
    pub retry_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            retry_delay_ms: 500,
        }
    }
}

// ── Bridge ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Seconds an HTTP caller waits for the system's reply before getting
    /// `504 upstream timeout`. 0 = wait forever.
    pub request_timeout_secs: u64,
    /// Sender id reserved for the controlling system connection.
    pub system_id: String,
    /// Sender id the relay stamps on packets it creates.
    pub server_id: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            system_id: relay_core::SYSTEM_ID.into(),
            server_id: relay_core::SERVER_ID.into(),
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

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "note",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl RelayConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Listen address ───
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: format!("'{}' is not a socket address", self.server.listen),
                severity: WarningSeverity::Error,
                hint: Some("Use host:port, e.g. '127.0.0.1:3000'".into()),
            });
        }

        // ── Dispatch timing ───
        if self.dispatch.tick_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "dispatch.tick_interval_ms".into(),
                message: "tick interval is 0, dispatch loop would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 50".into()),
            });
        } else if self.dispatch.tick_interval_ms > 1000 {
            warnings.push(ConfigWarning {
                field: "dispatch.tick_interval_ms".into(),
                message: format!(
                    "tick interval is {}ms; outbound packets will be noticeably delayed",
                    self.dispatch.tick_interval_ms
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Pending request timeout ───
        if self.bridge.request_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "bridge.request_timeout_secs".into(),
                message: "timeout disabled; HTTP callers wait forever if the system never replies".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 30".into()),
            });
        }

        // ── Reserved identities ───
        if self.bridge.system_id.is_empty() || self.bridge.server_id.is_empty() {
            warnings.push(ConfigWarning {
                field: "bridge".into(),
                message: "system_id and server_id must be non-empty".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        } else if self.bridge.system_id == self.bridge.server_id {
            warnings.push(ConfigWarning {
                field: "bridge.server_id".into(),
                message: format!("server_id equals system_id ('{}')", self.bridge.system_id),
                severity: WarningSeverity::Error,
                hint: Some("The two reserved identities must differ".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
