//! notestream CLI - the `notestream` command.
//!
//! Replays recorded composition sessions through the same controller,
//! extractor and scheduler a live client uses, and manages the config file.

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notestream_core::{BANKS, DEFAULT_BANK};
use notestream_session::Config;
use std::path::PathBuf;
use std::time::Duration;

/// notestream - streamed composition playback
#[derive(Parser, Debug)]
#[command(name = "notestream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play compositions while they are still being generated", long_about = None)]
struct Args {
    /// Config file path (default: ~/.config/notestream/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded server log (one JSON message per line)
    Replay {
        /// Path to the recorded log
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Playback speed of the recording (2.0 = twice as fast)
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Delay between messages without their own `delay_ms`
        #[arg(long, default_value = "50")]
        interval_ms: u64,

        /// Loop playback until interrupted
        #[arg(long = "loop")]
        loop_playback: bool,

        /// Do not start playback until the stream completes
        #[arg(long)]
        no_auto_play: bool,

        /// Prompt sent with the compose request
        #[arg(long, default_value = "recorded session")]
        prompt: String,

        /// Deliver messages with their recorded ids instead of the live request id
        #[arg(long)]
        keep_ids: bool,

        /// Save the finished composition to the gallery directory
        #[arg(long)]
        save: bool,

        /// Simulate a dropped connection after N messages
        #[arg(long, value_name = "N")]
        disconnect_after: Option<usize>,
    },

    /// List the instrument banks
    Banks,

    /// Create a default configuration file
    Init,

    /// Show the configuration file path
    ConfigPath,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    match args.command {
        Commands::Replay {
            file,
            speed,
            interval_ms,
            loop_playback,
            no_auto_play,
            prompt,
            keep_ids,
            save,
            disconnect_after,
        } => {
            let mut config = load_config(args.config.as_ref())?;
            if loop_playback {
                config.playback.loop_playback = true;
            }
            if no_auto_play {
                config.playback.auto_play = false;
            }
            let options = replay::ReplayOptions {
                file,
                prompt,
                speed,
                interval: Duration::from_millis(interval_ms),
                keep_ids,
                save,
                disconnect_after,
            };
            replay::run(options, config).await
        }
        Commands::Banks => {
            print_banks();
            Ok(())
        }
        Commands::Init => {
            let path = match args.config {
                Some(path) => {
                    Config::write_default_config(&path)?;
                    path
                }
                None => Config::create_default_config_file()?,
            };
            println!("Created default config at: {}", path.display());
            Ok(())
        }
        Commands::ConfigPath => {
            let path = match args.config {
                Some(path) => path,
                None => Config::config_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load_or_default()),
    }
}

fn print_banks() {
    for bank in BANKS.iter() {
        let marker = if bank.id == DEFAULT_BANK { " (default)" } else { "" };
        println!("{}{} - {}", bank.id, marker, bank.description);
        for (slot, instrument) in bank.instruments.iter().enumerate() {
            println!(
                "  {} {:<16} {:>3}-{:<3} {}",
                slot, instrument.name, instrument.low, instrument.high, instrument.description
            );
        }
        println!();
    }
}
