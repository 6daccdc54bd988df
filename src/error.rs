// src/error.rs

use crate::types::ExtractorKind;
use thiserror::Error;

/// Failures of the frame source. End of stream is not one of them: it is
/// reported as `Ok(None)` by `FrameSource::acquire`.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("video source {source_name:?} is not available")]
    DeviceUnavailable { source_name: String },
    #[error("failed to read frame")]
    Read(#[from] opencv::Error),
}

/// A single analysis task could not complete. Aborts the current cycle only.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("{extractor} extractor failed")]
    Vision {
        extractor: ExtractorKind,
        #[source]
        source: opencv::Error,
    },
    #[error("{extractor} extractor task panicked")]
    Panicked { extractor: ExtractorKind },
    #[error("cycle did not complete within {after_ms} ms")]
    TimedOut { after_ms: u64 },
}

impl ExtractorError {
    pub fn vision(extractor: ExtractorKind) -> impl FnOnce(opencv::Error) -> Self {
        move |source| Self::Vision { extractor, source }
    }

    /// True when the flow task's owned state (mask, points) did not come back
    pub fn loses_tracking(&self) -> bool {
        match self {
            Self::Vision { extractor, .. } | Self::Panicked { extractor } => {
                *extractor == ExtractorKind::Flow
            }
            Self::TimedOut { .. } => true,
        }
    }
}
