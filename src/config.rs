// ================================
// src/config.rs - all tunables, loaded from TOML
// ================================
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};

pub const DEFAULT_CONFIG_PATH: &str = "./line_follow.toml";

/// Hue/saturation/value triple on the 8-bit scale (hue 0..180).
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DetectionParams {
    pub hsv_lower: Hsv,
    pub hsv_upper: Hsv,
}

impl Default for DetectionParams {
    fn default() -> Self {
        // yellow floor tape
        Self {
            hsv_lower: Hsv::new(20, 100, 100),
            hsv_upper: Hsv::new(40, 255, 255),
        }
    }
}

/// Horizontal strip of rows that the detector looks at.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ScanBandParams {
    /// Fraction of the frame height where the band starts.
    pub start_ratio: f64,
    /// Overrides `start_ratio` when set.
    pub start_row: Option<u32>,
    pub height: u32,
}

impl Default for ScanBandParams {
    fn default() -> Self {
        Self {
            start_ratio: 0.75,
            start_row: None,
            height: 20,
        }
    }
}

impl ScanBandParams {
    /// Row range `[start, end)` for a frame of `frame_height` rows, clipped to the frame.
    pub fn rows(&self, frame_height: u32) -> (u32, u32) {
        let start = match self.start_row {
            Some(row) => row,
            None => (self.start_ratio * frame_height as f64).floor() as u32,
        };
        let start = start.min(frame_height);
        let end = start.saturating_add(self.height).min(frame_height);
        (start, end)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SteeringParams {
    pub linear_speed: f64,
    pub gain_divisor: f64,
    pub publish_rate_hz: f64,
    /// Offset used until the first detection arrives. 0 drives straight.
    pub initial_offset: i32,
}

impl Default for SteeringParams {
    fn default() -> Self {
        Self {
            linear_speed: 0.6,
            gain_divisor: 100.0,
            publish_rate_hz: 30.0,
            initial_offset: 0,
        }
    }
}

impl SteeringParams {
    pub fn publish_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.publish_rate_hz)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TopicParams {
    pub image: String,
    pub cmd_vel: String,
    pub debug_image: String,
}

impl Default for TopicParams {
    fn default() -> Self {
        Self {
            image: "camera/rgb/image_raw".to_string(),
            cmd_vel: "cmd_vel".to_string(),
            debug_image: "road_window".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DebugParams {
    pub enabled: bool,
    pub marker_radius: u32,
}

impl Default for DebugParams {
    fn default() -> Self {
        Self {
            enabled: false,
            marker_radius: 20,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReplayParams {
    pub frames_dir: String,
    pub frame_rate_hz: f64,
    /// Annotated frames are written here when debug output is enabled.
    pub output_dir: Option<String>,
}

impl Default for ReplayParams {
    fn default() -> Self {
        Self {
            frames_dir: "./frames".to_string(),
            frame_rate_hz: 30.0,
            output_dir: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionParams,
    pub scan_band: ScanBandParams,
    pub steering: SteeringParams,
    pub topics: TopicParams,
    pub debug: DebugParams,
    pub replay: ReplayParams,
}

impl Config {
    /// Load from `CONFIG_PATH`, or from `./line_follow.toml` when it exists.
    ///
    /// An explicit `CONFIG_PATH` must point at a readable file; the default
    /// path silently falls back to built-in values.
    pub fn load() -> Result<Self> {
        Self::load_from(env::var("CONFIG_PATH").ok(), Path::new(DEFAULT_CONFIG_PATH))
    }

    fn load_from(explicit: Option<String>, default_path: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if default_path.exists() => Self::from_file(default_path),
            None => {
                log::info!("No config file found, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&config_str)
            .with_context(|| format!("invalid config {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let lower = self.detection.hsv_lower;
        let upper = self.detection.hsv_upper;
        ensure!(
            lower.h <= 180 && upper.h <= 180,
            "hue bounds must be within 0..=180, got {} and {}",
            lower.h,
            upper.h
        );
        ensure!(
            lower.h <= upper.h && lower.s <= upper.s && lower.v <= upper.v,
            "hsv_lower {:?} exceeds hsv_upper {:?}",
            lower,
            upper
        );

        let band = &self.scan_band;
        ensure!(band.height > 0, "scan_band.height must be positive");
        ensure!(
            band.start_row.is_some() || (0.0..=1.0).contains(&band.start_ratio),
            "scan_band.start_ratio must be within 0..=1, got {}",
            band.start_ratio
        );

        let steering = &self.steering;
        ensure!(
            steering.linear_speed.is_finite(),
            "steering.linear_speed must be finite"
        );
        ensure!(
            steering.gain_divisor.is_finite() && steering.gain_divisor != 0.0,
            "steering.gain_divisor must be finite and non-zero"
        );
        ensure!(
            steering.publish_rate_hz.is_finite() && steering.publish_rate_hz > 0.0,
            "steering.publish_rate_hz must be positive, got {}",
            steering.publish_rate_hz
        );
        ensure!(
            self.replay.frame_rate_hz.is_finite() && self.replay.frame_rate_hz > 0.0,
            "replay.frame_rate_hz must be positive, got {}",
            self.replay.frame_rate_hz
        );
        Ok(())
    }
}
