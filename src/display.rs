// src/display.rs

use crate::types::DisplayConfig;
use anyhow::{Context, Result};
use opencv::{core::Mat, highgui, prelude::*};
use tracing::{debug, info};

/// Where rendered frames go, and where a stop request comes from
pub trait Display {
    fn show(&mut self, window: &str, frame: &Mat) -> Result<()>;

    /// Polls for input once. True means the user asked to stop.
    fn poll_stop(&mut self) -> Result<bool>;

    /// Blocks until the user dismisses the output
    fn hold(&mut self) -> Result<()>;
}

/// HighGUI windows, one per name
pub struct HighGuiDisplay {
    key_poll_ms: i32,
}

impl HighGuiDisplay {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            key_poll_ms: config.key_poll_ms,
        }
    }
}

impl Display for HighGuiDisplay {
    fn show(&mut self, window: &str, frame: &Mat) -> Result<()> {
        highgui::imshow(window, frame).with_context(|| format!("Failed to show {}", window))?;
        Ok(())
    }

    fn poll_stop(&mut self) -> Result<bool> {
        let key = highgui::wait_key(self.key_poll_ms)?;
        if key >= 0 {
            info!("Key {} pressed, stopping", key);
            return Ok(true);
        }
        Ok(false)
    }

    fn hold(&mut self) -> Result<()> {
        highgui::wait_key(0)?;
        Ok(())
    }
}

impl Drop for HighGuiDisplay {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}

/// No windows. Frames are counted and logged, stop is never requested.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    frames_shown: u64,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, window: &str, frame: &Mat) -> Result<()> {
        self.frames_shown += 1;
        debug!(
            "[{}] frame {} ({}x{})",
            window,
            self.frames_shown,
            frame.cols(),
            frame.rows()
        );
        Ok(())
    }

    fn poll_stop(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn hold(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fixtures::black_frame;

    #[test]
    fn test_headless_counts_frames_and_never_stops() {
        let mut display = HeadlessDisplay::new();
        display.show("Boom", &black_frame()).unwrap();
        display.show("Optical flow", &black_frame()).unwrap();
        assert_eq!(display.frames_shown(), 2);
        assert!(!display.poll_stop().unwrap());
        display.hold().unwrap();
    }
}
