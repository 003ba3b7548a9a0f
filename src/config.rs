//! Application-level configuration loading, including the default match shape.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::match_state::MatchSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COURTBOARD_CONFIG_PATH";

const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const DEFAULT_VIEWER_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Period of the clock driver that evaluates running clocks.
    pub tick_interval: Duration,
    /// Staleness backstop for viewer streams.
    pub viewer_poll_interval: Duration,
    /// Capacity of each per-match broadcast channel.
    pub channel_capacity: usize,
    /// Settings used when neither the match nor its tournament has any document.
    pub default_settings: MatchSettings,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        tick_ms = app_config.tick_interval.as_millis() as u64,
                        poll_ms = app_config.viewer_poll_interval.as_millis() as u64,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            viewer_poll_interval: Duration::from_millis(DEFAULT_VIEWER_POLL_INTERVAL_MS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            default_settings: MatchSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    tick_interval_ms: Option<u64>,
    viewer_poll_interval_ms: Option<u64>,
    channel_capacity: Option<usize>,
    default_settings: Option<MatchSettings>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let mut default_settings = value.default_settings.unwrap_or(defaults.default_settings);
        default_settings.regenerate_sections();

        Self {
            tick_interval: value
                .tick_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            viewer_poll_interval: value
                .viewer_poll_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.viewer_poll_interval),
            channel_capacity: value
                .channel_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.channel_capacity),
            default_settings,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sections::count_ends;

    #[test]
    fn raw_config_falls_back_per_field() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"tickIntervalMs":250,"channelCapacity":0}"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.viewer_poll_interval, Duration::from_millis(1_000));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn default_settings_schedule_is_rebuilt() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"defaultSettings":{
                "redName":"A","blueName":"B","totalEnds":6,"warmup":"none",
                "intervalEnabled":false,"resultApproval":false,"tieBreak":"finalShot",
                "clocks":{"playerMs":270000,"warmupMs":120000,"intervalMs":60000},
                "sections":[]
            }}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(count_ends(&config.default_settings.sections), 6);
        assert_eq!(config.default_settings.clocks.player_ms, 270_000);
    }
}
