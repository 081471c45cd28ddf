use devilscout_tba::{DEFAULT_BASE_URL, Season, TbaClientConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Competition season; selects how score breakdowns are decoded
    #[serde(default = "default_season")]
    pub season: u16,
    #[serde(default)]
    pub tba: TbaSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Events whose rosters, schedules and rankings are polled
    #[serde(default)]
    pub active: ActiveEventsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            season: default_season(),
            tba: TbaSettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingConfig::default(),
            active: ActiveEventsConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Season
        if Season::from_year(self.season).is_none() {
            let supported: Vec<u16> = Season::SUPPORTED.iter().map(|s| s.year()).collect();
            return Err(format!("season must be one of {supported:?}"));
        }
        // Upstream validations
        if let Err(e) = url::Url::parse(&self.tba.base_url) {
            return Err(format!("tba.base_url is not a valid URL: {e}"));
        }
        if self.tba.request_timeout_ms == 0 {
            return Err("tba.request_timeout_ms must be > 0".into());
        }
        if self.tba.max_concurrent_requests == 0 {
            return Err("tba.max_concurrent_requests must be > 0".into());
        }
        // Cache validations
        let c = &self.cache;
        let intervals = [
            ("cache.purge_ttl_secs", c.purge_ttl_secs),
            ("cache.event_refresh_secs", c.event_refresh_secs),
            ("cache.roster_refresh_secs", c.roster_refresh_secs),
            ("cache.schedule_refresh_secs", c.schedule_refresh_secs),
            ("cache.rankings_refresh_secs", c.rankings_refresh_secs),
            ("cache.oprs_refresh_secs", c.oprs_refresh_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(format!("{name} must be > 0"));
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Only meaningful after [`validate`](Self::validate) succeeded.
    pub fn season(&self) -> Option<Season> {
        Season::from_year(self.season)
    }

    pub fn tba_client_config(&self) -> TbaClientConfig {
        TbaClientConfig {
            base_url: self.tba.base_url.clone(),
            auth_key: self.tba.auth_key.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.tba.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TbaSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Read API key; normally supplied through DEVILSCOUT__TBA__AUTH_KEY
    #[serde(default)]
    pub auth_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_season() -> u16 {
    2024
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_concurrent_requests() -> usize {
    16
}

impl Default for TbaSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Idle time after which on-demand entries are dropped
    #[serde(default = "default_purge_ttl_secs")]
    pub purge_ttl_secs: u64,
    #[serde(default = "default_event_refresh_secs")]
    pub event_refresh_secs: u64,
    #[serde(default = "default_roster_refresh_secs")]
    pub roster_refresh_secs: u64,
    #[serde(default = "default_schedule_refresh_secs")]
    pub schedule_refresh_secs: u64,
    #[serde(default = "default_rankings_refresh_secs")]
    pub rankings_refresh_secs: u64,
    #[serde(default = "default_oprs_refresh_secs")]
    pub oprs_refresh_secs: u64,
}

fn default_purge_ttl_secs() -> u64 {
    3600
}
fn default_event_refresh_secs() -> u64 {
    300
}
fn default_roster_refresh_secs() -> u64 {
    3600
}
fn default_schedule_refresh_secs() -> u64 {
    60
}
fn default_rankings_refresh_secs() -> u64 {
    300
}
fn default_oprs_refresh_secs() -> u64 {
    900
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            purge_ttl_secs: default_purge_ttl_secs(),
            event_refresh_secs: default_event_refresh_secs(),
            roster_refresh_secs: default_roster_refresh_secs(),
            schedule_refresh_secs: default_schedule_refresh_secs(),
            rankings_refresh_secs: default_rankings_refresh_secs(),
            oprs_refresh_secs: default_oprs_refresh_secs(),
        }
    }
}

impl CacheSettings {
    pub fn purge_ttl(&self) -> Duration {
        Duration::from_secs(self.purge_ttl_secs)
    }
    pub fn event_refresh(&self) -> Duration {
        Duration::from_secs(self.event_refresh_secs)
    }
    pub fn roster_refresh(&self) -> Duration {
        Duration::from_secs(self.roster_refresh_secs)
    }
    pub fn schedule_refresh(&self) -> Duration {
        Duration::from_secs(self.schedule_refresh_secs)
    }
    pub fn rankings_refresh(&self) -> Duration {
        Duration::from_secs(self.rankings_refresh_secs)
    }
    pub fn oprs_refresh(&self) -> Duration {
        Duration::from_secs(self.oprs_refresh_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActiveEventsConfig {
    #[serde(default)]
    pub events: Vec<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "devilscout.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., DEVILSCOUT__TBA__AUTH_KEY=...
        builder = builder.add_source(
            Environment::with_prefix("DEVILSCOUT")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("active.events"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.season(), Some(Season::Crescendo2024));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.cache.schedule_refresh(), Duration::from_secs(60));
    }

    #[test]
    fn test_unsupported_season_rejected() {
        let cfg = AppConfig {
            season: 2019,
            ..AppConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("season must be one of"));
    }

    #[test]
    fn test_zero_interval_names_the_field() {
        let mut cfg = AppConfig::default();
        cfg.cache.rankings_refresh_secs = 0;
        assert_eq!(
            cfg.validate().unwrap_err(),
            "cache.rankings_refresh_secs must be > 0"
        );
    }

    #[test]
    fn test_bad_base_url_and_level_rejected() {
        let mut cfg = AppConfig::default();
        cfg.tba.base_url = "not a url".into();
        assert!(cfg.validate().unwrap_err().starts_with("tba.base_url"));

        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().starts_with("logging.level"));
    }

    #[test]
    fn test_client_config_carries_upstream_settings() {
        let mut cfg = AppConfig::default();
        cfg.tba.auth_key = "key".into();
        cfg.tba.request_timeout_ms = 2500;

        let client = cfg.tba_client_config();
        assert_eq!(client.auth_key, "key");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.request_timeout, Duration::from_millis(2500));
    }
}
