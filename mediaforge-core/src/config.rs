use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub ffmpeg: FfmpegConfig,
    pub restart: RestartConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// FFmpeg process configuration.
///
/// `templates` holds named command templates with `{src}` and `{dst}`
/// placeholders; users can configure multiple templates side by side and
/// select one per stream by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Path to the ffmpeg binary.
    pub bin: String,
    /// Named pull/push command templates. Must contain a "default" entry.
    pub templates: HashMap<String, String>,
    /// Snapshot command template (`{src}` input url, `{dst}` jpeg path).
    pub snap_template: String,
    /// Directory for per-process log files; process output is discarded
    /// when unset.
    pub log_dir: Option<String>,
}

pub const DEFAULT_CMD_KEY: &str = "default";

impl Default for FfmpegConfig {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            DEFAULT_CMD_KEY.to_string(),
            "-re -i {src} -c:a aac -ar 44100 -b:a 48k -c:v libx264 -f flv {dst}".to_string(),
        );
        Self {
            bin: "ffmpeg".to_string(),
            templates,
            snap_template: "-i {src} -y -f mjpeg -frames:v 1 -an {dst}".to_string(),
            log_dir: None,
        }
    }
}

impl FfmpegConfig {
    /// Look up a command template by key. `None` is a configuration error
    /// for the caller.
    #[must_use]
    pub fn command(&self, cmd_key: &str) -> Option<&str> {
        self.templates.get(cmd_key).map(String::as_str)
    }
}

/// Supervision timing for process-backed sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Minimum interval between (re)launch attempts, in milliseconds.
    /// Closures arriving earlier defer the relaunch until this has elapsed.
    pub min_interval_ms: u64,
    /// Registry poll cadence during discovery, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 10_000,
            poll_interval_ms: 500,
        }
    }
}

impl RestartConfig {
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (MEDIAFORGE_LOGGING_LEVEL, etc.)
        builder = builder.add_source(
            Environment::with_prefix("MEDIAFORGE")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        Self::load(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_default_template() {
        let config = Config::default();
        let template = config.ffmpeg.command(DEFAULT_CMD_KEY);
        assert!(template.is_some());
        let template = template.unwrap();
        assert!(template.contains("{src}"));
        assert!(template.contains("{dst}"));
    }

    #[test]
    fn test_unknown_command_key() {
        let config = FfmpegConfig::default();
        assert!(config.command("no-such-key").is_none());
    }

    #[test]
    fn test_restart_defaults() {
        let restart = RestartConfig::default();
        assert_eq!(restart.min_interval(), Duration::from_secs(10));
        assert_eq!(restart.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_with_missing_file_uses_defaults() {
        let config = Config::load(Some("/nonexistent/mediaforge.yaml")).unwrap();
        assert_eq!(config.ffmpeg.bin, "ffmpeg");
        assert_eq!(config.logging.level, "info");
    }
}
