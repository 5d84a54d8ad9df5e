//! `navsight` – command line front end.
//!
//! ```text
//! navsight [run] [--config PATH] [--seconds N]   run the pipeline on simulated sensors
//! navsight init [--config PATH]                  write a config file interactively
//! navsight show-config [--config PATH]           print the effective configuration
//! navsight --help                                usage, generated from the `Cli` definition
//! ```
//!
//! Ctrl-C stops the pipeline cleanly and prints a run summary.

mod config;
mod console;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, warn};

use navsight_hal::sim::approaching_pedestrian;
use navsight_runtime::{Navigator, PerformanceSummary, init_tracing};
use navsight_types::{AlertPriority, NavError, Side};

/// NavSight: obstacle awareness and spoken guidance
///
/// Runs the navigation pipeline against simulated sensors and prints the
/// spoken alerts to the terminal.
#[derive(Debug, Parser)]
#[command(name = "navsight")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, env = "NAVSIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Run the pipeline on simulated sensors (default)
    Run {
        /// Stop after this many seconds (0 runs until Ctrl-C)
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Write a config file interactively
    Init,

    /// Print the effective configuration
    ShowConfig,
}

fn main() {
    let _tracing = init_tracing("navsight");

    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config::config_path);

    match cli.command.unwrap_or(Commands::Run { seconds: None }) {
        Commands::Init => run_init_wizard(&path),
        Commands::ShowConfig => {
            let cfg = load_or_default(&path);
            match toml::to_string_pretty(&cfg) {
                Ok(raw) => println!("{raw}"),
                Err(e) => eprintln!("{}: {}", "error".red(), e),
            }
        }
        Commands::Run { seconds } => {
            print_banner();
            let mut cfg = load_or_default(&path);
            if let Some(secs) = seconds {
                cfg.demo.run_seconds = secs;
            }
            let shutdown = Arc::new(AtomicBool::new(false));
            install_ctrlc(Arc::clone(&shutdown));

            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to build the Tokio runtime");
                    std::process::exit(1);
                }
            };
            if let Err(e) = runtime.block_on(run(cfg, shutdown)) {
                eprintln!("{}: {}", "navigation failed".red().bold(), e);
                std::process::exit(1);
            }
        }
    }
}

async fn run(cfg: config::Config, shutdown: Arc<AtomicBool>) -> Result<(), NavError> {
    let (camera, ranging) = approaching_pedestrian(Duration::from_millis(cfg.demo.frame_period_ms));
    let mut nav = Navigator::new(
        cfg.navigator,
        Box::new(camera),
        Box::new(ranging),
        Box::new(console::ConsoleSink),
    )?;
    let printer = tokio::spawn(console::follow_events(nav.bus()));

    nav.start().await?;
    nav.force_announce("Navigation assistance started", AlertPriority::Low)?;
    println!("  {} Press Ctrl-C to stop.\n", "▶".green().bold());

    let deadline = (cfg.demo.run_seconds > 0)
        .then(|| Instant::now() + Duration::from_secs(cfg.demo.run_seconds));
    while !shutdown.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    nav.stop().await?;
    printer.abort();
    print_summary(&nav.performance());
    Ok(())
}

fn load_or_default(path: &PathBuf) -> config::Config {
    match config::load_from(path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    }
}

fn install_ctrlc(shutdown: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping navigation …".yellow().bold());
        shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; use --seconds to bound the run");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Init wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_init_wizard(path: &PathBuf) {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        NavSight Configuration        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();

    let mut cfg = load_or_default(path);
    let nav = &mut cfg.navigator;

    let side = prompt_line(
        &format!("  Preferred side to step around obstacles [{}]: ", nav.guidance.preferred_direction.as_str()),
        nav.guidance.preferred_direction.as_str(),
    );
    match side.parse::<Side>() {
        Ok(s) => nav.guidance.preferred_direction = s,
        Err(e) => println!("  {} {}", "ignored:".yellow(), e),
    }

    let emergency = prompt_line(
        &format!("  Emergency stop distance in cm [{}]: ", nav.thresholds.emergency_dist_cm),
        &nav.thresholds.emergency_dist_cm.to_string(),
    );
    if let Ok(v) = emergency.parse::<f32>() {
        nav.thresholds.emergency_dist_cm = v;
    }

    let interval = prompt_line(
        &format!("  Minimum seconds between spoken alerts [{}]: ", nav.outbound.min_vocal_interval_s),
        &nav.outbound.min_vocal_interval_s.to_string(),
    );
    if let Ok(v) = interval.parse::<f32>() {
        nav.outbound.min_vocal_interval_s = v;
    }

    if let Err(e) = cfg.navigator.validate() {
        println!("{}: {}", "Not saved".red(), e);
        return;
    }
    match config::save_to(&cfg, path) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _  __           ____  _       __    __ "#.bold().cyan());
    println!("{}", r#"  / |/ /__ __  __ / __/ (_)___ _/ /   / /_"#.bold().cyan());
    println!("{}", r#" /    / _ `/ |/ /_\ \  / / _ `/ _ \ / __/"#.bold().cyan());
    println!("{}", r#"/_/|_/\_,_/|___/___/ /_/\_, /_//_/ \__/ "#.bold().cyan());
    println!("{}", r#"                       /___/            "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "NavSight".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Obstacle awareness and spoken guidance");
    println!();
}

fn print_summary(perf: &PerformanceSummary) {
    println!();
    println!("{}", "  Run summary".bold());
    println!("    uptime            {:.1} s", perf.uptime_s);
    println!("    batches / s       {:.1}", perf.batches_per_second);
    println!("    detections/batch  {:.2}", perf.detections_per_batch);
    println!("    warnings / min    {:.1}", perf.warnings_per_minute);
    println!(
        "    latency (ms)      detect {:.1}  fuse {:.2}  decide {:.2}",
        perf.latency.detection_ms, perf.latency.fusion_ms, perf.latency.decision_ms
    );
    println!("    final state       {}", perf.state);
    println!();
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
