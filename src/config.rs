use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::Context;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// How long to drive for and at what duty on each side.
#[derive(new, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub struct MotionProfile {
    pub duration_ms: u32,
    pub left_duty: i32,
    pub right_duty: i32,
}

impl MotionProfile {
    pub fn reversed(&self) -> Self {
        Self {
            duration_ms: self.duration_ms,
            left_duty: -self.left_duty,
            right_duty: -self.right_duty,
        }
    }
}

#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub drive: DriveConfig,
    pub lift: LiftConfig,
    pub path: PathConfig,
    pub box_get: BoxGetConfig,
    pub sim: SimConfig,
}

impl RobotConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening config {}", path.display()))?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Tuned on the real robot: one grid cell forward is ~5.4s, a quarter turn ~2s.  The right
/// motor runs a little hot so it gets less duty.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub forward: MotionProfile,
    pub backward: MotionProfile,
    pub rotate: MotionProfile,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            forward: MotionProfile::new(5373, 73, 63),
            backward: MotionProfile::new(5373, -73, -63),
            rotate: MotionProfile::new(1970, 73, -63),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftConfig {
    pub min_height_cm: f32,
    pub max_height_cm: f32,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self { min_height_cm: 1.0, max_height_cm: 4.0 }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub dwell_ms: u32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self { dwell_ms: 150 }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxGetConfig {
    pub raise_ms: u32,
    pub lower_ms: u32,
}

impl Default for BoxGetConfig {
    fn default() -> Self {
        Self { raise_ms: 2000, lower_ms: 2000 }
    }
}

/// Only used by the simulated lift in [`crate::robot_hal_mock`].
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub initial_height_cm: f32,
    pub cm_per_step: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { initial_height_cm: 1.0, cm_per_step: 0.05 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{
            "drive": { "rotate": { "duration_ms": 1800, "left_duty": 80, "right_duty": -70 } },
            "path": { "dwell_ms": 300 }
        }"#;
        let config: RobotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.drive.rotate, MotionProfile::new(1800, 80, -70));
        assert_eq!(config.drive.forward, DriveConfig::default().forward);
        assert_eq!(config.path.dwell_ms, 300);
        assert_eq!(config.box_get, BoxGetConfig::default());
        assert_eq!(config.lift, LiftConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let mut config = RobotConfig::default();
        config.box_get.raise_ms = 2500;
        let path = std::env::temp_dir().join(format!("gridbox-config-{}.json", std::process::id()));
        config.save(&path).unwrap();
        let loaded = RobotConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_mentions_path() {
        let err = RobotConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }

    #[test]
    fn test_reversed_profile() {
        let profile = MotionProfile::new(1970, 73, -63);
        assert_eq!(profile.reversed(), MotionProfile::new(1970, -73, 63));
    }
}
