use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_mctrack::io::console::spawn_console;
use rust_mctrack::io::euroc::{DatasetFrameSource, EurocDataset};
use rust_mctrack::local_mapping::KeyframeMap;
use rust_mctrack::system::{LogSink, SystemConfig, TrackingSystem};
use rust_mctrack::tracking::ReplayTracker;

const USAGE: &str = "usage: rust_mctrack <dataset> [config.toml] [--realtime]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rust_mctrack=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let realtime = args.iter().any(|a| a == "--realtime");
    let mut positional = args.iter().filter(|a| !a.starts_with("--"));
    let Some(dataset_path) = positional.next() else {
        bail!(USAGE);
    };

    let config = match positional.next() {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SystemConfig::load(Path::new(path))?
        }
        None => {
            info!("Using default configuration");
            SystemConfig::default()
        }
    };

    info!("Loading dataset from: {}", dataset_path);
    let dataset = EurocDataset::new(dataset_path)
        .with_context(|| format!("failed to load dataset {}", dataset_path))?;
    info!(
        "Loaded {} frame sets from {} cameras, {} ground truth entries",
        dataset.len(),
        dataset.num_cameras(),
        dataset.groundtruth.len()
    );

    let groundtruth = dataset.groundtruth.clone();
    let source = DatasetFrameSource::new(dataset, realtime);

    let mut system = TrackingSystem::new(
        config,
        source,
        |ctx| Ok(ReplayTracker::new(groundtruth, ctx)),
        KeyframeMap::default(),
        LogSink,
    )?;

    spawn_console(system.command_sender())?;
    info!("Commands: reset | quit | savemap <path> | keyframes on|off | pausemapping | resumemapping");

    let summary = system.run();
    let snapshot = system.shared_state().map_snapshot();
    info!(
        "Finished: {:?}, {} frames, map version {} with {} keyframes",
        summary.stop_reason,
        summary.frames_processed,
        snapshot.version,
        snapshot.num_keyframes()
    );

    system.shutdown();
    Ok(())
}
