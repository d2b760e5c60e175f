//! Run the turret controller against the simulated robot.
//!
//! Interactive by default: the terminal is switched to raw mode and the
//! keyboard drives the chassis and gimbal (Esc or Ctrl+C quits). With
//! `--headless` no keys are read and Ctrl+C or `--duration` ends the run.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hardware::sim::{BlobDetector, SimConfig, SimRobot};
use hardware::{Protocol, Transport};
use tracing::info;
use tracing_subscriber::EnvFilter;
use turret::terminal_keys::{TerminalKeys, DEFAULT_KEY_HOLD};
use turret::{DetectionMode, KeyStateProvider, Session, ShutdownSignal, StaticKeys, TurretConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Vision-guided turret controller on a simulated robot",
    long_about = "Runs the full control loop (frame acquisition, detection, engagement \
and manual drive) against a simulated robot whose camera renders a moving target.\n\n\
Keys: w/s forward/back, a/d strafe, q/e rotate, i/k/j/l gimbal, Up/Down speed, Esc quit."
)]
struct Args {
    /// JSON configuration file; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<DetectionMode>,

    #[arg(long, value_enum)]
    transport: Option<Transport>,

    #[arg(long, value_enum)]
    protocol: Option<Protocol>,

    /// Override the detection mode's confidence threshold
    #[arg(long)]
    confidence_threshold: Option<f64>,

    /// Aim error (fraction of frame) treated as on target
    #[arg(long)]
    dead_zone: Option<f64>,

    /// Gimbal rate per unit of aim error, deg/s
    #[arg(long)]
    gain: Option<f64>,

    /// Seconds the aim must hold steady before firing
    #[arg(long)]
    lock_duration: Option<f64>,

    /// Minimum seconds between shots
    #[arg(long)]
    fire_cooldown: Option<f64>,

    /// Do not read the keyboard
    #[arg(long)]
    headless: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Without key release events, how long a key press counts as held (ms)
    #[arg(long, default_value_t = DEFAULT_KEY_HOLD.as_millis() as u64)]
    key_hold_ms: u64,

    /// Probability that a simulated frame read fails
    #[arg(long, default_value = "0.0")]
    fault_rate: f64,

    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Write the end-of-session metrics summary to this file as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

/// Stderr writer that emits CRLF line endings, readable in raw terminal mode
struct CrlfStderr(io::Stderr);

impl Write for CrlfStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' {
                self.0.write_all(&buf[start..i])?;
                self.0.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.0.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn seconds(option: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid --{option}: {secs}"))
}

fn load_config(args: &Args) -> Result<TurretConfig> {
    let mut config = match &args.config {
        Some(path) => TurretConfig::load(path)?,
        None => TurretConfig::default(),
    };

    if let Some(mode) = args.mode {
        config.detection.mode = mode;
    }
    if let Some(transport) = args.transport {
        config.connection.transport = transport;
    }
    if let Some(protocol) = args.protocol {
        config.connection.protocol = protocol;
    }
    if let Some(threshold) = args.confidence_threshold {
        config.detection.confidence_threshold = Some(threshold);
    }
    if let Some(dead_zone) = args.dead_zone {
        config.engagement.dead_zone = dead_zone;
    }
    if let Some(gain) = args.gain {
        config.engagement.gain = gain;
    }
    if let Some(secs) = args.lock_duration {
        config.engagement.lock_duration = seconds("lock-duration", secs)?;
    }
    if let Some(secs) = args.fire_cooldown {
        config.engagement.fire_cooldown = seconds("fire-cooldown", secs)?;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| CrlfStderr(io::stderr()))
        .init();

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    if !(0.0..=1.0).contains(&args.fault_rate) {
        bail!("--fault-rate must be within [0, 1], got {}", args.fault_rate);
    }

    let robot = SimRobot::new(SimConfig {
        fault_rate: args.fault_rate,
        seed: args.seed,
        ..SimConfig::default()
    });

    let shutdown = ShutdownSignal::new();
    let keys: Box<dyn KeyStateProvider> = if args.headless {
        let handler_signal = shutdown.clone();
        ctrlc::set_handler(move || handler_signal.trigger())
            .context("Failed to install Ctrl+C handler")?;
        info!("Running headless - press Ctrl+C to exit");
        Box::new(StaticKeys::none())
    } else {
        info!("Keyboard control active - press Esc to exit");
        Box::new(TerminalKeys::new(Duration::from_millis(args.key_hold_ms))?)
    };

    if let Some(secs) = args.duration {
        let run_for = seconds("duration", secs)?;
        let timer = shutdown.clone();
        thread::spawn(move || {
            if !timer.wait_timeout(run_for) {
                info!("Run duration of {run_for:?} elapsed");
                timer.trigger();
            }
        });
    }

    let summary = Session::new(config, robot.ports(), BlobDetector::new(), keys)
        .with_shutdown(shutdown)
        .with_ground_truth(robot.ground_truth())
        .run()?;

    println!("{summary}");
    info!(
        "Shots fired: {}, hits: {}",
        robot.world().shots_fired(),
        robot.world().hits()
    );

    if let Some(path) = &args.summary_json {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &summary)?;
        info!("Wrote metrics summary to {}", path.display());
    }

    Ok(())
}
