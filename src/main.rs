use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rust_sorde::config::SordeConfig;
use rust_sorde::io::{EurocDataset, FrameSource};
use rust_sorde::system::Orchestrator;
use rust_sorde::vision::opencv::OpenCvBackend;

/// Upper bound for background jobs to drain before exit.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // sorde [FRAMES_DIR] [CONFIG] [--distance]
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let measure = match args.iter().position(|a| a == "--distance") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };
    let dataset_path = args
        .first()
        .cloned()
        .unwrap_or_else(|| "data/stereo/mav0".to_string());
    let config = match args.get(1) {
        Some(path) => SordeConfig::load(path)?,
        None => SordeConfig::default(),
    };

    let backend = Arc::new(OpenCvBackend::new(&config.recognition).context("Failed to initialise OpenCV")?);
    let mut orchestrator = Orchestrator::new(Arc::clone(&backend), config);

    if let Err(e) = orchestrator.load_calibration() {
        warn!(error = %e, "Could not load calibration");
    }
    if let Err(e) = orchestrator.load_templates() {
        warn!(error = %e, "Could not load templates");
    }
    if let Err(e) = orchestrator.load_dictionary() {
        warn!(error = %e, "Could not load dictionary");
    }

    info!(path = %dataset_path, "Loading stereo sequence");
    let dataset = EurocDataset::new(&dataset_path)?;
    info!(frames = dataset.len(), "Loaded stereo sequence");

    let mut source = dataset.replay(backend);
    let mut last_readout = None;
    while let Some(frame) = source.next_frame() {
        orchestrator.on_frame(frame?);

        if measure {
            for category in orchestrator.view().detected_categories() {
                if let Err(refusal) = orchestrator.request_distance(&category) {
                    debug!(%refusal, category = %category, "Distance not requested");
                    break;
                }
            }
        }

        let readout = orchestrator.view().distance_text();
        if readout.is_some() && readout != last_readout {
            if let Some(text) = &readout {
                info!("{text}");
            }
        }
        last_readout = readout;
    }

    if !orchestrator.wait_idle(SHUTDOWN_WAIT) {
        warn!("Workers still running at exit");
    }
    if let Some(text) = orchestrator.view().distance_text() {
        info!("{text}");
    }
    let stats = orchestrator.stats();
    info!(
        received = stats.frames_received,
        categorized = stats.results_applied,
        skipped = stats.frames_skipped,
        distances = stats.distance_requests,
        "Replay finished"
    );
    orchestrator.shutdown();
    Ok(())
}
