use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use mc_capture::{CaptureRegion, CaptureSettings};
use serde::{Deserialize, Serialize};

/// Settings for one capture run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureSettings,
    pub region: CaptureRegion,
    pub run_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            region: CaptureRegion::from_origin_size(0, 0, 640, 480),
            run_seconds: 5,
            poll_interval_ms: 10,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let json = r#"{ "region": { "left": 10, "top": 20, "right": 110, "bottom": 220 } }"#;
        let config: AppConfig = serde_json::from_str(json).expect("valid config");

        assert_eq!(config.region, CaptureRegion::new(10, 20, 110, 220));
        assert_eq!(config.capture, CaptureSettings::default());
        assert_eq!(config.run_duration(), Duration::from_secs(5));
    }

    #[test]
    fn nested_capture_settings() {
        let json = r#"{ "capture": { "targetFPS": 60 }, "poll_interval_ms": 0 }"#;
        let config: AppConfig = serde_json::from_str(json).expect("valid config");

        assert_eq!(config.capture.fps, 60);
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("mc_capture_app_missing_config.json");
        let _ = fs::remove_file(&path);
        assert!(AppConfig::load(&path).is_err());
    }
}
