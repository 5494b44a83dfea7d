use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::defaults::*;
use crate::error::CaptureResult;

/// Capture worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Compositor tick rate; anything below the floor is raised to it.
    #[serde(default = "default_fps", alias = "targetFPS")]
    pub fps: u32,

    /// How long without a published frame before `pop_video` reports the capture dead.
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,

    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            thread_name: default_thread_name(),
        }
    }
}

impl CaptureSettings {
    /// Load settings from a JSON file.
    ///
    /// Falls back to defaults if the file is missing or malformed.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<CaptureSettings>(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed capture settings, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| crate::CaptureError::Settings(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| crate::CaptureError::Settings(e.to_string()))?;
        Ok(())
    }

    #[inline]
    pub fn effective_fps(&self) -> u32 {
        clamp_fps(self.fps)
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        tick_interval(self.fps)
    }

    #[inline]
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}

#[inline]
pub fn clamp_fps(fps: u32) -> u32 {
    fps.max(min_fps())
}

/// Timer period for a requested frame rate, after applying the floor.
pub fn tick_interval(fps: u32) -> Duration {
    Duration::from_millis(u64::from(1000 / clamp_fps(fps)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_config() {
        let json = r#"{ "fps": 60 }"#;

        let cfg: CaptureSettings = serde_json::from_str(json).expect("valid config");
        assert_eq!(cfg.fps, 60);
        assert_eq!(cfg.liveness_timeout_ms, 200);
        assert_eq!(cfg.thread_name, "mc-capture-worker");
    }

    #[test]
    fn deserializes_camel_case_alias() {
        let json = r#"{ "targetFPS": 30, "liveness_timeout_ms": 500 }"#;

        let cfg: CaptureSettings = serde_json::from_str(json).expect("valid config");
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.liveness_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn fps_floor_applies() {
        assert_eq!(clamp_fps(0), 10);
        assert_eq!(clamp_fps(5), 10);
        assert_eq!(clamp_fps(60), 60);

        assert_eq!(tick_interval(25), Duration::from_millis(40));
        assert_eq!(tick_interval(1), Duration::from_millis(100));
        assert_eq!(CaptureSettings::default().tick_interval(), Duration::from_millis(40));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("mc_capture_missing_settings_test.json");
        let _ = fs::remove_file(&path);
        assert_eq!(CaptureSettings::load_from(&path), CaptureSettings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("mc_capture_settings_{}", std::process::id()));
        let path = dir.join("capture.json");

        let settings = CaptureSettings {
            fps: 48,
            ..CaptureSettings::default()
        };
        settings.save_to(&path).expect("save settings");
        assert_eq!(CaptureSettings::load_from(&path), settings);

        let _ = fs::remove_dir_all(&dir);
    }
}
