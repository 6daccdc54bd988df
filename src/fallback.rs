// src/fallback.rs
//
// Single-image mode used when no camera frames are available: circles only,
// shown once, then wait for a key.

use crate::display::Display;
use crate::extractors::CircleFinder;
use crate::render;
use crate::types::Config;
use crate::video_source::{FrameSource, StaticImageSource};
use anyhow::{Context, Result};
use tracing::{error, info};

/// Returns the number of circles drawn, or `None` when the image was
/// missing or empty.
pub fn process_image(config: &Config, display: &mut dyn Display) -> Result<Option<usize>> {
    let mut source = StaticImageSource::load(&config.capture.fallback_image)
        .with_context(|| format!("Failed to load {}", config.capture.fallback_image))?;

    let Some(mut image) = source.acquire()? else {
        error!("ERROR! Empty image: {}", config.capture.fallback_image);
        return Ok(None);
    };

    let circles = CircleFinder::new(config.circles.clone())
        .find(&image)
        .context("Circle detection failed on fallback image")?;
    info!("✓ {} circles found", circles.len());

    render::draw_circles(&mut image, &circles)?;
    display.show(&config.display.annotated_window, &image)?;
    info!("Done");
    display.hold()?;

    Ok(Some(circles.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessDisplay;

    #[test]
    fn test_missing_image_is_not_fatal() {
        let mut config = Config::default();
        config.capture.fallback_image = "no/such/planets.png".to_string();
        let mut display = HeadlessDisplay::new();

        let drawn = process_image(&config, &mut display).unwrap();

        assert!(drawn.is_none());
        assert_eq!(display.frames_shown(), 0);
    }

    #[test]
    fn test_draws_and_shows_loaded_image() {
        use crate::extractors::fixtures::disc_frame;
        use opencv::{core::Vector, imgcodecs};

        let path = std::env::temp_dir().join("feature_loop_fallback_disc.png");
        let path = path.to_string_lossy().to_string();
        imgcodecs::imwrite(&path, &disc_frame(50), &Vector::new()).unwrap();

        let mut config = Config::default();
        config.capture.fallback_image = path.clone();
        config.circles.accumulator_threshold = 30.0;
        let mut display = HeadlessDisplay::new();

        let drawn = process_image(&config, &mut display).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(drawn.unwrap_or(0) >= 1);
        assert_eq!(display.frames_shown(), 1);
    }
}
