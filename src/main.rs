// src/main.rs

mod config;
mod display;
mod error;
mod extractors;
mod fallback;
mod pipeline;
mod render;
mod tracking;
mod types;
mod video_source;

use anyhow::Result;
use config::ConfigOrigin;
use display::{Display, HeadlessDisplay, HighGuiDisplay};
use error::CaptureError;
use pipeline::{CycleOrchestrator, PipelineMetrics, StopReason};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::Config;
use video_source::CameraSource;

const CONFIG_ENV: &str = "FEATURE_LOOP_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let (config, origin) = Config::load_or_default(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("feature_loop={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🎥 Feature loop starting");
    match origin {
        ConfigOrigin::File => info!("✓ Configuration loaded from {}", config_path),
        ConfigOrigin::Defaults => info!("No config at {}, using defaults", config_path),
    }
    info!(
        "Tracking: max_points={}, reset_interval={}, window={}",
        config.tracking.max_points, config.tracking.reset_interval, config.tracking.window_size
    );

    let mut display: Box<dyn Display> = if config.display.enabled {
        Box::new(HighGuiDisplay::new(&config.display))
    } else {
        Box::new(HeadlessDisplay::new())
    };

    let mut camera = match CameraSource::open(&config.capture) {
        Ok(camera) => camera,
        Err(CaptureError::DeviceUnavailable { source_name }) => {
            error!("Camera not available ({})", source_name);
            fallback::process_image(&config, display.as_mut())?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let metrics = PipelineMetrics::new();
    let mut orchestrator = CycleOrchestrator::new(&config, metrics.clone());

    info!("Capturing...");
    let summary = orchestrator.run(&mut camera, display.as_mut()).await?;
    info!(
        "Capture finished: {} cycles, {} frames read",
        summary.cycles,
        camera.frames_read()
    );

    if summary.stop == StopReason::CameraUnavailable {
        error!("Camera not available (no frames)");
        fallback::process_image(&config, display.as_mut())?;
        return Ok(());
    }

    info!("Done");
    match serde_json::to_string(&metrics.summary()) {
        Ok(json) => info!("Metrics: {}", json),
        Err(err) => error!("Failed to serialize metrics: {}", err),
    }

    Ok(())
}
