//! `visionfuse` – vision pose fusion on simulated hardware.
//!
//! Usage: `visionfuse [config.toml]`
//!
//! 1. Loads the config from the given path, or `~/.visionfuse/config.toml`
//!    (written with defaults on first run), and validates it.
//! 2. Builds the exchange registry for the configured sources.
//! 3. Spawns the vision and drive tasks against a simulated drivetrain whose
//!    odometry drifts and one tracking camera per configured source.
//! 4. Runs until **Ctrl-C**, then stops both tasks and prints their counters.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use thiserror::Error;
use tracing::{info, warn};

use visionfuse_hal::VisionSource;
use visionfuse_hal::sim::{SimDrivetrain, SimVisionSource};
use visionfuse_middleware::{ExchangeRegistry, ExchangeStats};
use visionfuse_perception::ConfidenceModel;
use visionfuse_runtime::{
    DriveStats, DriveTask, PeriodicTask, VisionStats, VisionTask, init_tracing, shutdown_channel,
    spawn_periodic,
};
use visionfuse_types::{ChassisSpeeds, FusionError, MonotonicClock, Pose2d, TargetInfo};

use config::{Config, ConfigError};

const STATUS_PERIOD: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Fusion(#[from] FusionError),
    #[error("task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn main() -> ExitCode {
    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Structured logging ────────────────────────────────────────────────
    // Hold the guard until exit so pending spans are flushed.
    let _telemetry = init_tracing(&cfg.telemetry);

    print_banner(&cfg);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RunError::from)
        .and_then(|rt| rt.block_on(run(cfg)));

    match result {
        Ok(summary) => {
            summary.print();
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> Result<Config, ConfigError> {
    let cfg = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            config::load(&path)?
        }
        None => {
            let path = config::config_path();
            if !path.exists() {
                match config::save_to(&Config::default(), &path) {
                    Ok(()) => println!(
                        "  {} Default config written to {}",
                        "✓".green().bold(),
                        path.display().to_string().bold()
                    ),
                    Err(e) => println!("  {}: {}", "Could not write default config".yellow(), e),
                }
            }
            config::load(&path)?
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulation run
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: Config) -> Result<Summary, RunError> {
    let started = Instant::now();
    let clock = MonotonicClock::start();

    let exchange = ExchangeRegistry::new(cfg.source_ids(), cfg.buffer)?.into_shared();

    let mut drivetrain =
        SimDrivetrain::new(Pose2d::default()).with_odometry_scale(cfg.simulation.odometry_scale);
    drivetrain.set_speeds(ChassisSpeeds::new(cfg.simulation.vx, 0.0, cfg.simulation.omega));
    let truth = drivetrain.truth();

    let mut sources: Vec<Box<dyn VisionSource>> = Vec::with_capacity(cfg.sources.len());
    for (tag, source) in (1..).zip(&cfg.sources) {
        let target = TargetInfo {
            fiducial_id: tag,
            ambiguity: cfg.simulation.target_ambiguity,
            area: cfg.simulation.target_area,
        };
        let camera = SimVisionSource::tracking(source.id(), truth.clone(), vec![target], clock);
        sources.push(Box::new(camera));
    }

    let mut vision = VisionTask::new(
        Arc::clone(&exchange),
        sources,
        ConfidenceModel::new(cfg.confidence),
    )?;
    for source in &cfg.sources {
        vision.set_source_pipeline(&source.id(), source.pipeline_index)?;
    }
    let drive_period = Duration::from_millis(cfg.drive_period_ms);
    let drive = DriveTask::new(Arc::clone(&exchange), drivetrain, clock, drive_period);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop, shutdown) = shutdown_channel();
    // Dropping `stop` would end every task at once, so a run that cannot be
    // stopped gracefully is refused.
    ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping tasks …".yellow().bold());
        if stop.send(true).is_err() {
            warn!("all tasks already stopped");
        }
    })?;

    let drive_handle = spawn_periodic(drive, drive_period, shutdown.clone());
    let vision_handle = spawn_periodic(
        vision,
        Duration::from_millis(cfg.vision_period_ms),
        shutdown.clone(),
    );
    let status_handle = spawn_periodic(
        StatusReporter {
            exchange: Arc::clone(&exchange),
        },
        STATUS_PERIOD,
        shutdown,
    );
    info!("fusion running; press Ctrl-C to stop");

    let drive = drive_handle.await?;
    let vision = vision_handle.await?;
    status_handle.await?;

    Ok(Summary {
        elapsed: started.elapsed(),
        vision: vision.stats(),
        drive: drive.stats(),
        exchange: exchange.stats(),
        position_error: drive.drivetrain().position_error(),
    })
}

/// Logs buffer traffic once per period while the run is live.
struct StatusReporter {
    exchange: Arc<ExchangeRegistry>,
}

impl PeriodicTask for StatusReporter {
    fn name(&self) -> &'static str {
        "status"
    }

    fn tick(&mut self) {
        let stats = self.exchange.stats();
        let depth: usize = stats.buffers.iter().map(|b| b.depth).sum();
        let pushed: u64 = stats.buffers.iter().map(|b| b.pushed).sum();
        info!(
            motion_publishes = stats.motion_publishes,
            pushed,
            dropped = stats.total_dropped(),
            depth,
            "exchange status"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Summary
// ─────────────────────────────────────────────────────────────────────────────

struct Summary {
    elapsed: Duration,
    vision: VisionStats,
    drive: DriveStats,
    exchange: ExchangeStats,
    position_error: f64,
}

impl Summary {
    fn print(&self) {
        println!();
        println!("  {} after {:.1} s", "Run summary".bold(), self.elapsed.as_secs_f64());
        println!(
            "  vision  cycles {:>8}  polled {:>8}  accepted {:>8}",
            self.vision.cycles, self.vision.polled, self.vision.accepted
        );
        println!(
            "          rejected: ambiguous {}  spinning {}  malformed {}  no reference {}  faults {}",
            self.vision.rejected_ambiguous,
            self.vision.rejected_spinning,
            self.vision.rejected_malformed,
            self.vision.skipped_without_reference,
            self.vision.source_faults
        );
        println!(
            "  drive   cycles {:>8}  corrections {:>8}  published {:>8}",
            self.drive.cycles, self.drive.corrections_applied, self.drive.motion_published
        );
        for buffer in &self.exchange.buffers {
            println!(
                "  buffer  {:<12} pushed {:>6}  drained {:>6}  dropped {:>6}  high water {:>3}",
                buffer.source.as_str().bold(),
                buffer.pushed,
                buffer.drained,
                buffer.dropped,
                buffer.high_water
            );
        }
        let error = format!("{:.4} m", self.position_error);
        let error = if self.position_error < 0.05 { error.green() } else { error.yellow() };
        println!("  final position error {error}");
        println!();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(cfg: &Config) {
    println!();
    println!(
        "  {} {}",
        "VisionFuse".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Vision pose fusion (simulated hardware)");
    println!();
    let names: Vec<&str> = cfg.sources.iter().map(|s| s.name.as_str()).collect();
    println!("  sources      {}", names.join(", ").bold());
    println!(
        "  periods      vision {} ms, drive {} ms",
        cfg.vision_period_ms, cfg.drive_period_ms
    );
    println!("  buffers      {:?}", cfg.buffer);
    println!();
}
