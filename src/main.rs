// ABOUTME: Entry point for the rfscan binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs session file and backup commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rfscan_core::format::ensure_extension;
use rfscan_core::{ScanSession, decode_session, encode_session};
use rfscan_store::{BackupConfig, BackupManager};

const DEFAULT_FILTER: &str = "rfscan=info,rfscan_core=info,rfscan_store=info";

#[derive(Debug, Parser)]
#[command(name = "rfscan", version, about = "Inspect, upgrade and recover RTLSDR scan sessions")]
struct Cli {
    /// Backup directory (overrides RFSCAN_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a summary of a session file of any version
    Inspect { file: PathBuf },

    /// Rewrite a session file in the current format
    Upgrade {
        file: PathBuf,
        /// Destination (default: the input, with the .rfs extension ensured)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Browse backups left behind by earlier runs
    Backups {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Debug, Subcommand)]
enum BackupAction {
    /// List recoverable backups, newest first
    List,
    /// Save a backup as a session file
    Restore { index: usize, output: PathBuf },
    /// Delete a backup
    Delete { index: usize },
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { file } => inspect(&file),
        Command::Upgrade { file, output } => {
            let output = output.unwrap_or_else(|| ensure_extension(&file));
            upgrade(&file, &output)
        }
        Command::Backups { action } => {
            let config = match cli.home {
                Some(home) => BackupConfig::new(home),
                None => BackupConfig::from_env()?,
            };
            backups(&config, action)
        }
    }
}

fn load(path: &Path) -> anyhow::Result<ScanSession> {
    match decode_session(path).with_context(|| format!("reading {}", path.display()))? {
        Some(session) => Ok(session),
        None => bail!("no session file at {}", path.display()),
    }
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let session = load(path)?;
    print_summary(&session);
    Ok(())
}

fn upgrade(input: &Path, output: &Path) -> anyhow::Result<()> {
    let session = load(input)?;
    encode_session(&session, output).with_context(|| format!("writing {}", output.display()))?;
    println!("{} -> {}", input.display(), output.display());
    Ok(())
}

fn backups(config: &BackupConfig, action: BackupAction) -> anyhow::Result<()> {
    let mut manager = BackupManager::open(config)
        .with_context(|| format!("opening backups in {}", config.root.display()))?;

    match action {
        BackupAction::List => {
            let entries = manager.catalog()?;
            if entries.is_empty() {
                println!("no backups in {}", config.root.display());
            }
            for (index, entry) in entries.iter().enumerate() {
                println!(
                    "{:>3}  {}  {:>10}  {}",
                    index,
                    entry.modified.format("%Y-%m-%d %H:%M:%S"),
                    entry.size,
                    entry.name()
                );
            }
        }
        BackupAction::Restore { index, output } => {
            let session = manager.load(index)?;
            let output = ensure_extension(&output);
            encode_session(&session, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("restored backup {} to {}", index, output.display());
        }
        BackupAction::Delete { index } => {
            manager.delete(index)?;
            println!("deleted backup {}", index);
        }
    }

    manager.close()?;
    Ok(())
}

fn print_summary(session: &ScanSession) {
    let unknown = || "-".to_string();
    let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(unknown);

    println!("Range:        {} - {} MHz", session.start, session.stop);
    println!("Dwell:        {} s", session.dwell);
    println!("FFT size:     {}", session.nfft);
    println!(
        "Device:       {}",
        session.device.clone().unwrap_or_else(unknown)
    );
    println!("Gain:         {}", opt(session.gain));
    println!("LO:           {}", opt(session.lo));
    println!("Calibration:  {}", opt(session.calibration));
    println!("Tuner:        {}", session.tuner);
    println!("Time:         {}", session.time.clone().unwrap_or_else(unknown));
    println!(
        "Position:     {}, {}",
        opt(session.latitude),
        opt(session.longitude)
    );
    if !session.description.is_empty() {
        println!("Description:  {}", session.description);
    }
    println!("Sweeps:       {}", session.sweep_count());
    if let (Some(first), Some(last)) = (session.first_sweep_time(), session.last_sweep_time()) {
        println!("Sweep times:  {} - {}", first, last);
    }
    println!("GPS fixes:    {}", session.location.len());
}
