//! Harness configuration (paths, headless defaults). Loaded from bench.ron at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings that are not part of a scenario. Loaded from `bench.ron` in the current directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Root of the shader folders (`model/`, `surface/`, ..., `common/`).
    #[serde(default = "default_shader_dir")]
    pub shader_dir: PathBuf,
    /// Run without a window or GPU even when `--headless` is not given.
    #[serde(default)]
    pub headless: bool,
    /// Simulated seconds per frame in headless runs.
    #[serde(default = "default_headless_delta")]
    pub headless_delta: f32,
    /// Scenario used when none is named on the command line.
    #[serde(default = "default_scenario")]
    pub default_scenario: String,
}

fn default_shader_dir() -> PathBuf {
    PathBuf::from("shaders")
}
fn default_headless_delta() -> f32 {
    1.0 / 60.0
}
fn default_scenario() -> String {
    "water".to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            shader_dir: default_shader_dir(),
            headless: false,
            headless_delta: default_headless_delta(),
            default_scenario: default_scenario(),
        }
    }
}

impl BenchConfig {
    /// Load config from `bench.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        let path = config_path();
        if let Ok(data) = std::fs::read_to_string(&path) {
            match Self::from_ron(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("Invalid config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }

    fn from_ron(data: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(data)
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("bench.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = BenchConfig::from_ron("(headless: true)").unwrap();
        assert!(config.headless);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
        assert_eq!(config.default_scenario, "water");
        assert!((config.headless_delta - 1.0 / 60.0).abs() < 1e-7);
    }

    #[test]
    fn invalid_config_is_an_error() {
        assert!(BenchConfig::from_ron("(headless: 3)").is_err());
    }
}
