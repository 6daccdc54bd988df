// src/video_source.rs

use crate::error::CaptureError;
use crate::types::CaptureConfig;
use opencv::{
    core::Mat,
    imgcodecs,
    prelude::*,
    videoio::{self, VideoCapture},
};
#[cfg(test)]
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Supplies frames to the loop. `Ok(None)` means end of stream; a camera
/// disconnect and the end of a file look the same and both stop gracefully.
pub trait FrameSource {
    fn acquire(&mut self) -> Result<Option<Mat>, CaptureError>;
}

/// Live camera device, or a video file when `capture.video_path` is set
pub struct CameraSource {
    cap: VideoCapture,
    read_retries: u32,
    frames_read: u64,
}

impl CameraSource {
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let (cap, source_name) = match &config.video_path {
            Some(path) => {
                info!("Opening video: {}", path);
                (VideoCapture::from_file(path, videoio::CAP_ANY), path.clone())
            }
            None => {
                info!("Testing camera...");
                (
                    VideoCapture::new(config.device_index, videoio::CAP_ANY),
                    format!("camera #{}", config.device_index),
                )
            }
        };

        let unavailable = || CaptureError::DeviceUnavailable {
            source_name: source_name.clone(),
        };

        let cap = match cap {
            Ok(cap) => cap,
            Err(err) => {
                warn!("Failed to open {}: {}", source_name, err);
                return Err(unavailable());
            }
        };
        if !cap.is_opened().unwrap_or(false) {
            return Err(unavailable());
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        info!(
            "Source properties: {:.0}x{:.0} @ {:.1} FPS",
            width, height, fps
        );

        Ok(Self {
            cap,
            read_retries: config.read_retries,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for CameraSource {
    fn acquire(&mut self) -> Result<Option<Mat>, CaptureError> {
        let cap = &mut self.cap;
        let frame = read_with_retries(self.read_retries, || {
            let mut frame = Mat::default();
            let ok = cap.read(&mut frame)?;
            Ok((ok && !frame.empty()).then_some(frame))
        })?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

/// Calls `read` until it yields a frame, at most `retries + 1` times.
/// `Ok(None)` from `read` is a blank grab.
fn read_with_retries(
    retries: u32,
    mut read: impl FnMut() -> opencv::Result<Option<Mat>>,
) -> Result<Option<Mat>, CaptureError> {
    let mut attempts = 0;
    loop {
        if let Some(frame) = read()? {
            return Ok(Some(frame));
        }
        if attempts >= retries {
            warn!("Blank frame grabbed after {} read(s)", attempts + 1);
            return Ok(None);
        }
        attempts += 1;
        debug!("Blank frame, retry {}/{}", attempts, retries);
    }
}

/// Yields a single image once, then end of stream
pub struct StaticImageSource {
    image: Option<Mat>,
}

impl StaticImageSource {
    /// Loads `path`. An unreadable or empty image yields no frames at all.
    pub fn load(path: &str) -> Result<Self, CaptureError> {
        info!("Loading image...");
        let image = imgcodecs::imread(path, imgcodecs::IMREAD_COLOR)?;
        Ok(Self {
            image: (!image.empty()).then_some(image),
        })
    }
}

impl FrameSource for StaticImageSource {
    fn acquire(&mut self) -> Result<Option<Mat>, CaptureError> {
        Ok(self.image.take())
    }
}

/// Pre-decoded frames played back in order
#[cfg(test)]
pub struct SequenceSource {
    frames: VecDeque<Mat>,
}

#[cfg(test)]
impl SequenceSource {
    pub fn new(frames: impl IntoIterator<Item = Mat>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
impl FrameSource for SequenceSource {
    fn acquire(&mut self) -> Result<Option<Mat>, CaptureError> {
        // An empty Mat in the sequence behaves like a blank grab
        Ok(self.frames.pop_front().filter(|f| !f.empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Size, Vec3b, CV_8UC3};
    use std::cell::Cell;
    use std::rc::Rc;

    fn gray_frame(level: f64) -> Mat {
        Mat::new_size_with_default(Size::new(64, 48), CV_8UC3, Scalar::all(level)).unwrap()
    }

    #[test]
    fn test_sequence_source_plays_in_order_then_ends() {
        let mut source = SequenceSource::new(vec![gray_frame(10.0), gray_frame(20.0)]);
        let first = source.acquire().unwrap().unwrap();
        assert_eq!(first.at_2d::<Vec3b>(0, 0).unwrap().0, [10, 10, 10]);
        assert!(source.acquire().unwrap().is_some());
        assert!(source.acquire().unwrap().is_none());
        assert!(source.acquire().unwrap().is_none());
    }

    #[test]
    fn test_sequence_source_empty_mat_is_end_of_stream() {
        let mut source = SequenceSource::new(vec![Mat::default(), gray_frame(5.0)]);
        assert!(source.acquire().unwrap().is_none());
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_missing_image_yields_nothing() {
        let mut source = StaticImageSource::load("does/not/exist.png").unwrap();
        assert!(source.acquire().unwrap().is_none());
    }

    /// `blanks` blank grabs, then a frame on every call after that
    fn scripted(blanks: u32) -> (impl FnMut() -> opencv::Result<Option<Mat>>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let read = move || {
            let n = counter.get();
            counter.set(n + 1);
            Ok((n >= blanks).then(|| gray_frame(1.0)))
        };
        (read, calls)
    }

    #[test]
    fn test_no_retries_gives_up_on_first_blank() {
        let (read, calls) = scripted(1);
        assert!(read_with_retries(0, read).unwrap().is_none());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retries_recover_after_blank_grabs() {
        let (read, calls) = scripted(3);
        assert!(read_with_retries(3, read).unwrap().is_some());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_retries_exhausted_is_end_of_stream() {
        let (read, calls) = scripted(4);
        assert!(read_with_retries(3, read).unwrap().is_none());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_read_error_is_not_retried() {
        let mut calls = 0;
        let result = read_with_retries(5, || {
            calls += 1;
            Err(opencv::Error::new(opencv::core::StsError, "device lost"))
        });
        assert!(matches!(result, Err(CaptureError::Read(_))));
        assert_eq!(calls, 1);
    }
}
