use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use parking_lot::Mutex;

use swingsync_core::cli::{print_session_report, print_swing_stats};
use swingsync_core::sync::{FileState, LoopbackLink, Reachability, SyncMessage, SyncReceiver, SyncTransport};
use swingsync_core::{
    estimated_racket_head_speed, load_cfg, load_settings, read_swing_records, replay, swing_stats, ReplaySource,
    SessionController, SessionOptions,
};

#[derive(Parser)]
#[command(name = "swingsync", version, about = "Swing detection, session recording and companion sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a raw-sample CSV through detection, recording and sync
    Replay(ReplayArgs),
    /// Print stats for a finalized swing file
    Report(ReportArgs),
    /// Racket-head speed (mph) from angular velocity and height
    Speed(SpeedArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Raw-sample CSV (nine columns)
    #[arg(long)]
    input: PathBuf,

    /// Where the session files are written
    #[arg(long)]
    out_dir: PathBuf,

    /// Where the companion installs received files
    #[arg(long)]
    companion_dir: PathBuf,

    /// User settings JSON (missing file gives defaults)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Core config JSON (thresholds, buffer, channel)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start with the link down and reconnect after stop
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    file: PathBuf,

    #[arg(long, default_value_t = 70.0)]
    height: f64,
}

#[derive(Args)]
struct SpeedArgs {
    /// rad/s
    #[arg(long)]
    omega: f64,

    #[arg(long, default_value_t = 70.0)]
    height: f64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(log_level).format_timestamp(None).init();

    match cli.command {
        Command::Replay(args) => run_replay(args),
        Command::Report(args) => run_report(args),
        Command::Speed(args) => {
            println!("{:.1} mph", estimated_racket_head_speed(args.omega, args.height));
            Ok(())
        }
    }
}

fn run_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let settings = match &args.settings {
        Some(p) => load_settings(p).with_context(|| format!("loading settings {}", p.display()))?,
        None => Default::default(),
    };
    let cfg = match &args.config {
        Some(p) => load_cfg(p).with_context(|| format!("loading config {}", p.display()))?,
        None => Default::default(),
    };
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let mut source = ReplaySource::from_samples_csv(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    // companion-siden i samme prosess
    let reachability = Reachability::new(!args.offline);
    let receiver = Arc::new(Mutex::new(SyncReceiver::new(&args.companion_dir, settings.clone())));
    let link = Arc::new(LoopbackLink::new(receiver.clone(), reachability.clone()));
    let transport = SyncTransport::new(link.clone(), reachability);

    let options = SessionOptions::new(&args.out_dir).with_cfg(cfg).with_settings(settings.clone());
    let mut session = SessionController::start(&source, options)?;
    transport.send(&SyncMessage::SessionStart);

    let n = replay(&mut source, &session.feed())?;
    info!("replayed {} readings", n);

    let outcome = session.stop().clone();
    if let Some(e) = &outcome.storage_error {
        warn!("session file not written: {}", e);
    }

    let delivery = transport.publish_session(&outcome.summary, outcome.record.as_ref());
    info!("summary delivery: {:?}", delivery);
    if args.offline {
        transport.on_reachability_changed(true);
        // plattformen leverer context selv; loopback må få et dytt
        link.deliver_context();
    }

    let rx = receiver.lock();
    match rx.file_state() {
        FileState::Ready { path, rows, .. } => info!("companion has {} ({} swings)", path.display(), rows.len()),
        FileState::Unreadable { file_name, reason } => bail!("companion could not read {}: {}", file_name, reason),
        FileState::Empty => warn!("companion received no file"),
    }
    print_session_report(rx.live_summary(), rx.stats().as_ref());
    Ok(())
}

fn run_report(args: ReportArgs) -> anyhow::Result<()> {
    let rows = read_swing_records(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    print_swing_stats(&swing_stats(&rows, args.height));
    Ok(())
}
