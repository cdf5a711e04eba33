use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use std::io::Read;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};

use posture_monitor::indicator::LogIndicator;
use posture_monitor::sensors::SimulatedImu;
use posture_monitor::summary::SessionSummary;
use posture_monitor::{ClassifierKind, Controller, Imu, MonitorConfig, Reporter, RequestSender};

#[derive(Parser, Debug)]
#[command(name = "posture_monitor")]
#[command(about = "Posture monitor control loop on a simulated sensor rig", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until '0' or Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Classifier (threshold, ridge, spine)
    #[arg(long)]
    classifier: Option<String>,

    /// Enable posture processing before the first 'P'
    #[arg(long)]
    posture: bool,

    /// Stream per-sensor telemetry lines
    #[arg(long)]
    telemetry: bool,

    /// Command bytes injected at startup, e.g. "1P"
    #[arg(long, default_value = "")]
    script: String,

    /// Ignore stdin as a command source
    #[arg(long)]
    no_stdin: bool,

    /// Output directory for the session summary
    #[arg(long, default_value = "posture_sessions")]
    output_dir: String,
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(kind) = &args.classifier {
        config.classifier = kind.parse::<ClassifierKind>()?;
    }
    if args.posture {
        config.posture_enabled = true;
    }
    if args.telemetry {
        config.telemetry.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

/// Feeds stdin bytes to the controller. Runs on a plain thread so a blocked
/// read never holds up shutdown.
fn spawn_stdin_reader(tx: RequestSender) {
    std::thread::spawn(move || {
        for byte in std::io::stdin().lock().bytes() {
            match byte {
                Ok(b'\n') | Ok(b'\r') => {}
                Ok(b) => {
                    tx.notify(b);
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
        info!("stdin closed");
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    info!("Posture monitor starting");
    info!("  Duration: {} seconds (0=continuous)", args.duration);
    info!("  Classifier: {}", config.classifier);
    info!("  Sensors: {}", config.sensors.join(", "));
    info!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let sensors: Vec<Imu> = config
        .sensors
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let device = SimulatedImu::new(name, config.simulation.profile(i));
            Imu::with_schedules(Box::new(device), config.calibration.schedule, config.tracking)
        })
        .collect();

    let mut controller = Controller::new(
        config,
        sensors,
        Reporter::stdout(),
        Box::new(LogIndicator::default()),
    )?;
    let started_at = Utc::now();
    controller.start()?;

    let tx = controller.sender();
    for b in args.script.bytes() {
        tx.notify(b);
    }
    if !args.no_stdin {
        spawn_stdin_reader(tx.clone());
    }

    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping...");
            ctrl_c_tx.notify(b'0');
        }
    });

    if args.duration > 0 {
        let duration = args.duration;
        let timer_tx = tx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(duration)).await;
            info!("Duration reached, stopping...");
            timer_tx.notify(b'0');
        });
    }

    let controller = tokio::task::spawn_blocking(move || {
        controller.run();
        controller
    })
    .await
    .context("control loop panicked")?;

    let summary = SessionSummary::from_controller(&controller, started_at);
    let path = PathBuf::from(&args.output_dir).join(format!(
        "session_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    summary.save(&path)?;
    info!(
        "Session saved to {}: {} ticks, {} good / {} bad",
        path.display(),
        summary.ticks,
        summary.good_verdicts,
        summary.bad_verdicts
    );

    Ok(())
}
