use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use presence_core::{DetectorOptions, HeadTurnConfig, RunningMode, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration.
///
/// Defaults reproduce the tuned behaviour: 10 Hz sampling, three-tick
/// confirmation, 40 px spread over at least 10 of the last 20 centers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling period of the detection loop.
    pub tick_interval_ms: u64,
    /// Minimum score for the detector to report a candidate.
    pub min_detection_confidence: f32,
    /// Consecutive present ticks before a face counts as present.
    pub confirm_ticks: u32,
    /// Face-center samples kept for the head-turn check.
    pub head_turn_window: usize,
    /// Samples required before the head-turn check decides anything.
    pub head_turn_min_samples: usize,
    /// Horizontal spread (pixels) that counts as a head turn.
    /// Depends on camera resolution and framing; re-validate per deployment.
    pub head_turn_min_range_px: f64,
    /// Directory holding the detector model asset.
    pub model_dir: PathBuf,
    /// Pinned SHA-256 of the detector model, checked at load when set.
    pub model_sha256: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let head_turn = HeadTurnConfig::default();
        Self {
            tick_interval_ms: 100,
            min_detection_confidence: presence_core::detector::DEFAULT_MIN_DETECTION_CONFIDENCE,
            confirm_ticks: presence_core::debounce::DEFAULT_CONFIRM_TICKS,
            head_turn_window: head_turn.window,
            head_turn_min_samples: head_turn.min_samples,
            head_turn_min_range_px: head_turn.min_range_px,
            model_dir: default_model_dir(),
            model_sha256: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `PRESENCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval_ms: env_or("PRESENCE_TICK_INTERVAL_MS", defaults.tick_interval_ms),
            min_detection_confidence: env_or(
                "PRESENCE_MIN_DETECTION_CONFIDENCE",
                defaults.min_detection_confidence,
            ),
            confirm_ticks: env_or("PRESENCE_CONFIRM_TICKS", defaults.confirm_ticks),
            head_turn_window: env_or("PRESENCE_HEAD_TURN_WINDOW", defaults.head_turn_window),
            head_turn_min_samples: env_or(
                "PRESENCE_HEAD_TURN_MIN_SAMPLES",
                defaults.head_turn_min_samples,
            ),
            head_turn_min_range_px: env_or(
                "PRESENCE_HEAD_TURN_MIN_RANGE_PX",
                defaults.head_turn_min_range_px,
            ),
            model_dir: std::env::var("PRESENCE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            model_sha256: std::env::var("PRESENCE_MODEL_SHA256").ok(),
        }
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which presence or liveness can never be
    /// confirmed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirm_ticks == 0 {
            return Err(ConfigError::Invalid(
                "confirm_ticks must be at least 1".to_string(),
            ));
        }
        if self.head_turn_window == 0 {
            return Err(ConfigError::Invalid(
                "head_turn_window must be at least 1".to_string(),
            ));
        }
        if self.head_turn_min_samples > self.head_turn_window {
            return Err(ConfigError::Invalid(format!(
                "head_turn_min_samples ({}) exceeds head_turn_window ({}); liveness could never latch",
                self.head_turn_min_samples, self.head_turn_window
            )));
        }
        Ok(())
    }

    /// Loop period, never shorter than a millisecond.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            confirm_ticks: self.confirm_ticks,
            head_turn: HeadTurnConfig {
                window: self.head_turn_window,
                min_samples: self.head_turn_min_samples,
                min_range_px: self.head_turn_min_range_px,
            },
        }
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            min_detection_confidence: self.min_detection_confidence,
            running_mode: RunningMode::Video,
        }
    }
}

/// `$XDG_DATA_HOME/presence/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("presence/models")
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_behaviour() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.confirm_ticks, 3);
        assert_eq!(config.session_config().head_turn, HeadTurnConfig::default());
        assert_eq!(config.detector_options(), DetectorOptions::default());
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_toml_partial_override() {
        let dir = std::env::temp_dir().join(format!(
            "presence-config-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("presence.toml");
        std::fs::write(
            &path,
            "tick_interval_ms = 50\nhead_turn_min_range_px = 25.5\nmodel_dir = \"/opt/models\"\n",
        )
        .unwrap();

        let config = EngineConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.head_turn_min_range_px, 25.5);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.confirm_ticks, 3);
        assert_eq!(config.head_turn_window, 20);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_toml_rejects_bad_types() {
        let dir = std::env::temp_dir().join(format!(
            "presence-config-bad-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("presence.toml");
        std::fs::write(&path, "confirm_ticks = \"three\"\n").unwrap();

        let err = EngineConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_validate_rejects_unreachable_min_samples() {
        let config = EngineConfig {
            head_turn_window: 8,
            head_turn_min_samples: 10,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("head_turn_min_samples (10)"), "{err}");
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let zero_ticks = EngineConfig {
            confirm_ticks: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(zero_ticks.validate(), Err(ConfigError::Invalid(_))));

        let zero_window = EngineConfig {
            head_turn_window: 0,
            head_turn_min_samples: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(zero_window.validate(), Err(ConfigError::Invalid(_))));

        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_rejects_invalid_values() {
        let dir = std::env::temp_dir().join(format!(
            "presence-config-invalid-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("presence.toml");
        std::fs::write(&path, "head_turn_window = 5\n").unwrap();

        let err = EngineConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = EngineConfig::from_toml_file(Path::new("/nonexistent/presence.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
