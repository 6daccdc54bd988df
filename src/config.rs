use crate::types::{Config, MAX_TRACKED_POINTS};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Where a loaded `Config` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    Defaults,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in
    /// defaults. Runs before logging is up, so the origin is returned for
    /// the caller to report.
    pub fn load_or_default(path: &str) -> Result<(Self, ConfigOrigin)> {
        if Path::new(path).exists() {
            Ok((Self::load(path)?, ConfigOrigin::File))
        } else {
            Ok((Self::default(), ConfigOrigin::Defaults))
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tracking;
        if t.max_points == 0 || t.max_points > MAX_TRACKED_POINTS {
            bail!(
                "tracking.max_points must be in 1..={}, got {}",
                MAX_TRACKED_POINTS,
                t.max_points
            );
        }
        if t.reset_interval == 0 {
            bail!("tracking.reset_interval must be at least 1");
        }
        if t.window_size < 3 {
            bail!("tracking.window_size must be at least 3, got {}", t.window_size);
        }
        if t.pyramid_levels < 0 {
            bail!("tracking.pyramid_levels cannot be negative");
        }
        if !(t.quality_level > 0.0 && t.quality_level <= 1.0) {
            bail!("tracking.quality_level must be in (0, 1], got {}", t.quality_level);
        }

        let c = &self.circles;
        if c.blur_kernel <= 0 || c.blur_kernel % 2 == 0 {
            bail!("circles.blur_kernel must be a positive odd number, got {}", c.blur_kernel);
        }
        if c.dp < 1.0 {
            bail!("circles.dp must be >= 1.0, got {}", c.dp);
        }
        if c.min_dist_divisor <= 0.0 {
            bail!("circles.min_dist_divisor must be positive");
        }

        if self.corners.max_features <= 0 {
            bail!("corners.max_features must be positive");
        }
        if self.display.key_poll_ms <= 0 {
            bail!("display.key_poll_ms must be positive (0 would block forever)");
        }
        Ok(())
    }
}
