//! Configuration loading for the DIALDESK console client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use dialdesk_core::CaseKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    pub api_base_url: String,
    pub events_url: String,
    pub auth: AuthConfig,
    pub request_timeout_ms: u64,
    pub refresh_interval_ms: u64,
    pub persistence_path: PathBuf,
    /// Push event `type` values that invalidate the attention table.
    pub invalidation_events: Vec<String>,
    pub forward: ForwardConfig,
    pub reconnect: ReconnectConfig,
    pub table: TableConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Opaque session credential, sent as `Authorization: Bearer`.
    pub bearer_token: Option<String>,
}

/// Forward-to-ITSM webhooks, one per case kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardConfig {
    pub incident_url: String,
    pub request_url: String,
    pub fpqrs_url: String,
    pub timeout_ms: u64,
}

impl ForwardConfig {
    pub fn url_for(&self, kind: CaseKind) -> &str {
        match kind {
            CaseKind::Incident => &self.incident_url,
            CaseKind::Request => &self.request_url,
            CaseKind::Fpqrs => &self.fpqrs_url,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub page_size: u32,
    pub page_size_options: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or DIALDESK_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

impl ConsoleConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ConsoleConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("api_base_url", &self.api_base_url),
            ("events_url", &self.events_url),
            ("forward.incident_url", &self.forward.incident_url),
            ("forward.request_url", &self.forward.request_url),
            ("forward.fpqrs_url", &self.forward.fpqrs_url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if let Some(token) = &self.auth.bearer_token {
            if token.trim().is_empty() {
                return Err(invalid("auth.bearer_token", "must not be blank when set"));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.refresh_interval_ms == 0 {
            return Err(invalid("refresh_interval_ms", "must be > 0"));
        }
        if self.forward.timeout_ms == 0 {
            return Err(invalid("forward.timeout_ms", "must be > 0"));
        }
        if self.persistence_path.as_os_str().is_empty() {
            return Err(invalid("persistence_path", "must not be empty"));
        }
        if self.invalidation_events.iter().all(|e| e.trim().is_empty()) {
            return Err(invalid("invalidation_events", "at least one event name is required"));
        }
        if self.table.page_size_options.is_empty() || self.table.page_size_options.contains(&0) {
            return Err(invalid("table.page_size_options", "must be non-empty and > 0"));
        }
        if !self.table.page_size_options.contains(&self.table.page_size) {
            return Err(invalid("table.page_size", "must be one of page_size_options"));
        }
        if self.reconnect.initial_ms == 0 {
            return Err(invalid("reconnect.initial_ms", "must be > 0"));
        }
        if self.reconnect.max_ms < self.reconnect.initial_ms {
            return Err(invalid("reconnect.max_ms", "must be >= initial_ms"));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(invalid("reconnect.multiplier", "must be >= 1.0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("DIALDESK_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
api_base_url = "http://localhost:8000/api"
events_url = "http://localhost:8000/api/webhooks/stream"
request_timeout_ms = 5000
refresh_interval_ms = 2000
persistence_path = "tmp/dialdesk.json"
invalidation_events = ["webhook_event_created", "webhook_event_updated"]

[auth]
bearer_token = "secret"

[forward]
incident_url = "http://hooks.local/incident"
request_url = "http://hooks.local/request"
fpqrs_url = "http://hooks.local/fpqrs"
timeout_ms = 10000

[reconnect]
initial_ms = 1000
max_ms = 30000
multiplier = 2.0
jitter_ms = 0

[table]
page_size = 10
page_size_options = [10, 20, 50]

[log]
json = false
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn sample_config_loads_and_validates() {
        let file = write_config(SAMPLE);
        let config = ConsoleConfig::from_path(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.table.page_size, 10);
        assert_eq!(config.forward.url_for(CaseKind::Fpqrs), "http://hooks.local/fpqrs");
        assert_eq!(config.forward.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config(&format!("{SAMPLE}\nextra = 1\n"));
        assert!(matches!(
            ConsoleConfig::from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn page_size_must_be_an_option() {
        let file = write_config(SAMPLE);
        let mut config = ConsoleConfig::from_path(file.path()).unwrap();
        config.table.page_size = 15;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "table.page_size", .. })
        ));
    }

    #[test]
    fn reconnect_ceiling_must_cover_floor() {
        let file = write_config(SAMPLE);
        let mut config = ConsoleConfig::from_path(file.path()).unwrap();
        config.reconnect.max_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_invalidation_whitelist_is_rejected() {
        let file = write_config(SAMPLE);
        let mut config = ConsoleConfig::from_path(file.path()).unwrap();
        config.invalidation_events.clear();
        assert!(config.validate().is_err());
    }
}
