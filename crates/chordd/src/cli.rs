#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::daemon::{run_daemon, run_list_devices};
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(
    name = "chordd",
    about = "Maps timed key-press sequences on input devices to configured actions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the daemon.
    Run(RunArgs),

    /// Print key-capable input devices and exit.
    #[command(name = "list-devices")]
    ListDevices,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the JSON key map.
    #[arg(long, default_value = "/etc/chordd.json")]
    pub config: PathBuf,

    /// Input devices to read. Defaults to every key-capable device.
    #[arg(long, value_delimiter = ',')]
    pub devices: Vec<PathBuf>,

    /// Default timeout between key presses, in seconds.
    #[arg(long, default_value_t = 2.0)]
    pub timeout: f64,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run_daemon(&args),
        Commands::ListDevices => run_list_devices(),
    }
}
