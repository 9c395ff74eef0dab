//! bobfit - head-bob and gesture tracker driven by landmark streams.
//!
//! Replays a keypoint recording (or a synthetic face) through the
//! detection engine and prints events as s-expressions.

mod driver;

use std::path::PathBuf;
use std::time::Duration;

use bobfit_engine::landmarks::FrameSize;
use bobfit_engine::source::{KeypointSource, ReplaySource, SyntheticSource, VirtualCamera};
use bobfit_engine::{EngineConfig, TrackingSession};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bobfit", about = "Motion and gesture event tracker")]
struct Cli {
    /// JSON-lines keypoint recording to replay (default: synthetic face)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Seed for collectible spawning
    #[arg(long)]
    seed: Option<u64>,

    /// Frame width override in pixels
    #[arg(long)]
    width: Option<f32>,

    /// Frame height override in pixels
    #[arg(long)]
    height: Option<f32>,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Ignore commands on stdin
    #[arg(long)]
    no_commands: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bobfit=info,bobfit_engine=info".into()),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.spawn.seed = Some(seed);
    }
    if cli.width.is_some() || cli.height.is_some() {
        config.frame = FrameSize::new(
            cli.width.unwrap_or(config.frame.width),
            cli.height.unwrap_or(config.frame.height),
        );
    }
    config.validate()?;

    if cli.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    info!("bobfit v{} starting", env!("CARGO_PKG_VERSION"));

    let mut camera = VirtualCamera::new(config.frame);
    let source: Box<dyn KeypointSource> = match &cli.replay {
        Some(path) => {
            let replay = ReplaySource::open(path)?;
            info!("replaying {} ({} frames)", path.display(), replay.len());
            camera = camera.with_frame_limit(replay.len() as u64);
            Box::new(replay)
        }
        None => {
            info!("no recording given, using synthetic face");
            Box::new(SyntheticSource::default())
        }
    };

    let session = TrackingSession::start(config, &mut camera, source)?;

    driver::run(
        session,
        driver::DriverConfig {
            fps: cli.fps,
            exit_after: cli.exit_after.map(Duration::from_secs),
            commands: !cli.no_commands,
        },
    )
}
