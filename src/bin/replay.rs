use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use log::info;

use posture_monitor::indicator::LogIndicator;
use posture_monitor::recording::Recording;
use posture_monitor::sensors::{ImuDevice, SimulatedImu};
use posture_monitor::summary::SessionSummary;
use posture_monitor::{ClassifierKind, Controller, Imu, LoopSignal, MonitorConfig, Reporter};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a recording_*.json[.gz]
    #[arg(long)]
    log: PathBuf,

    /// Write a synthetic recording of this many frames per sensor to --log and exit
    #[arg(long)]
    generate: Option<usize>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Classifier (threshold, ridge, spine)
    #[arg(long)]
    classifier: Option<String>,

    /// Startup calibration iterations (recordings are finite)
    #[arg(long, default_value = "100")]
    calibration_iterations: u32,

    /// Also emit telemetry lines
    #[arg(long, default_value_t = false)]
    telemetry: bool,

    /// Write the session summary here instead of stdout
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(kind) = &args.classifier {
        config.classifier = kind.parse::<ClassifierKind>()?;
    }
    config.telemetry.enabled |= args.telemetry;
    config.calibration.startup_iterations = args.calibration_iterations;
    // Replay runs as fast as the recording allows.
    config.threshold.period_ms = 0;
    config.ridge.period_ms = 0;
    config.spine.period_ms = 0;
    config.telemetry.period_ms = 0;
    config.idle_sleep_ms = 0;
    Ok(config)
}

fn generate(args: &Args, config: &MonitorConfig, frames: usize) -> Result<()> {
    let mut devices: Vec<Box<dyn ImuDevice>> = config
        .sensors
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Box::new(SimulatedImu::new(name, config.simulation.profile(i))) as Box<dyn ImuDevice>
        })
        .collect();
    let recording = Recording::capture(&mut devices, frames)?;
    recording.save(&args.log)?;
    info!(
        "Wrote {} frames x {} sensors to {}",
        frames,
        devices.len(),
        args.log.display()
    );
    Ok(())
}

fn run_once(args: &Args, mut config: MonitorConfig) -> Result<SessionSummary> {
    let recording = Recording::load(&args.log)?;
    if recording.sensors.is_empty() {
        bail!("{} has no sensor tracks", args.log.display());
    }
    info!(
        "Replaying {} ({} sensors, recorded {})",
        args.log.display(),
        recording.sensors.len(),
        recording.recorded_at.as_deref().unwrap_or("unknown")
    );

    config.sensors = recording.sensors.iter().map(|t| t.name.clone()).collect();
    config.validate()?;

    let (devices, exhausted) = recording.devices();
    let sensors: Vec<Imu> = devices
        .into_iter()
        .map(|d| Imu::with_schedules(Box::new(d), config.calibration.schedule, config.tracking))
        .collect();

    let mut controller = Controller::new(
        config,
        sensors,
        Reporter::stdout(),
        Box::new(LogIndicator::default()),
    )?;
    let started_at = Utc::now();
    controller.start()?;
    controller.sender().notify(b'P');

    while !exhausted.load(Ordering::Relaxed) {
        if controller.step() == LoopSignal::Exit {
            break;
        }
    }

    Ok(SessionSummary::from_controller(&controller, started_at))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(frames) = args.generate {
        return generate(&args, &config, frames);
    }

    let summary = run_once(&args, config)?;
    match &args.summary {
        Some(path) => summary.save(path)?,
        None => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    info!(
        "Replay done: {} ticks ({} skipped), {} good / {} bad",
        summary.ticks, summary.skipped_ticks, summary.good_verdicts, summary.bad_verdicts
    );
    Ok(())
}
