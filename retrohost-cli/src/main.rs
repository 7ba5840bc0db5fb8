//! retrohost - run libretro-style cores headless
//!
//! # Commands
//!
//! - `retrohost info --core <module>` - Print what the core reports about itself
//! - `retrohost run --core <module> --rom <file>` - Run a game for a number of frames
//!
//! # Usage
//!
//! ```bash
//! # Inspect a core
//! retrohost info --core ./mgba_libretro.so
//!
//! # Run 300 frames, keep the last frame and everything the core played
//! retrohost run --core ./mgba_libretro.so --rom game.gba \
//!     --frames 300 --screenshot last.png --wav out.wav
//! ```
//!
//! Logging goes through `RUST_LOG` (default `info`); messages from the core itself
//! use the `core` target.

mod capture;
mod info;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// retrohost - run libretro-style cores headless
#[derive(Parser)]
#[command(name = "retrohost")]
#[command(about = "Host runtime for libretro-style emulation cores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the core's system information
    Info(info::InfoArgs),

    /// Load a game and run it for a fixed number of frames
    Run(run::RunArgs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Info(args) => info::execute(args),
        Commands::Run(args) => run::execute(args),
    }
}
