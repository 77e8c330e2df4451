use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "REPOST_API_URL";

/// Dashboard settings, read from `~/.config/repost/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub paths: PathsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Cadences and deadlines of the synchronization engine, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_fast_poll")]
    pub fast_poll_secs: u64,
    #[serde(default = "default_background_poll")]
    pub background_poll_secs: u64,
    #[serde(default = "default_stats_poll")]
    pub stats_poll_secs: u64,
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
    #[serde(default = "default_config_timeout")]
    pub config_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_load_deadline")]
    pub load_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSettings {
    /// Where the log/progress cache lives between runs.
    #[serde(default = "platform::cache_dir")]
    pub cache_dir: PathBuf,
    /// Where exported backups are written.
    #[serde(default = "platform::backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fast_poll_secs: default_fast_poll(),
            background_poll_secs: default_background_poll(),
            stats_poll_secs: default_stats_poll(),
            status_timeout_secs: default_status_timeout(),
            config_timeout_secs: default_config_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            load_deadline_secs: default_load_deadline(),
        }
    }
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self {
            cache_dir: platform::cache_dir(),
            backup_dir: platform::backup_dir(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_fast_poll() -> u64 {
    2
}

fn default_background_poll() -> u64 {
    5
}

fn default_stats_poll() -> u64 {
    10
}

fn default_status_timeout() -> u64 {
    5
}

fn default_config_timeout() -> u64 {
    8
}

fn default_reconnect_delay() -> u64 {
    3
}

fn default_load_deadline() -> u64 {
    10
}

impl SyncSettings {
    pub fn fast_poll(&self) -> Duration {
        Duration::from_secs(self.fast_poll_secs.max(1))
    }

    pub fn background_poll(&self) -> Duration {
        Duration::from_secs(self.background_poll_secs.max(1))
    }

    pub fn stats_poll(&self) -> Duration {
        Duration::from_secs(self.stats_poll_secs.max(1))
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs.max(1))
    }

    pub fn config_timeout(&self) -> Duration {
        Duration::from_secs(self.config_timeout_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }

    pub fn load_deadline(&self) -> Duration {
        Duration::from_secs(self.load_deadline_secs.max(1))
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let settings_path = Self::settings_path();

        let mut settings = if !settings_path.exists() {
            let settings = Self::default();
            settings.save()?;
            settings
        } else {
            let content = std::fs::read_to_string(&settings_path)?;
            toml::from_str(&content)?
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let settings_path = Self::settings_path();
        if let Some(parent) = settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    pub fn settings_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// `REPOST_API_URL` wins over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.api.base_url = url.to_string();
            }
        }
    }

    /// Base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.api.base_url, "http://localhost:8000");
        assert_eq!(settings.sync.fast_poll(), Duration::from_secs(2));
        assert_eq!(settings.sync.background_poll(), Duration::from_secs(5));
        assert_eq!(settings.sync.status_timeout(), Duration::from_secs(5));
        assert_eq!(settings.sync.config_timeout(), Duration::from_secs(8));
        assert_eq!(settings.sync.reconnect_delay(), Duration::from_secs(3));
        assert!(settings.paths.cache_dir.ends_with("repost"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [api]
            base_url = "http://worker.local:9000/"

            [sync]
            fast_poll_secs = 1
            "#,
        )
        .unwrap();
        assert_eq!(settings.api_base(), "http://worker.local:9000");
        assert_eq!(settings.sync.fast_poll_secs, 1);
        assert_eq!(settings.sync.background_poll_secs, 5);
        assert_eq!(settings.sync.load_deadline_secs, 10);
    }

    #[test]
    fn test_zero_durations_clamp_to_one_second() {
        let settings: Settings = toml::from_str(
            r#"
            [sync]
            reconnect_delay_secs = 0
            load_deadline_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(settings.sync.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(settings.sync.load_deadline(), Duration::from_secs(1));
    }
}
