use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "fxctl",
    author,
    version,
    about = "Inspect and cycle effect presets of the shader runtime"
)]
pub struct Cli {
    /// Runtime configuration file (defaults to `runtime.ini` in the config directory).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Work with preset files next to the current preset.
    Presets(PresetsCommand),
    /// Print the resolved configuration file, preset, and search paths.
    Where,
}

#[derive(Args, Debug)]
pub struct PresetsCommand {
    #[command(subcommand)]
    pub action: PresetsAction,
}

#[derive(Subcommand, Debug)]
pub enum PresetsAction {
    /// List valid presets, marking the current one.
    List {
        /// Directory to list, or a name filter (e.g. `night` or `looks/night`).
        #[arg(long, value_name = "FILTER")]
        filter: Option<PathBuf>,
    },
    /// Make the next preset current.
    Next {
        #[arg(value_name = "FILTER")]
        filter: Option<PathBuf>,
    },
    /// Make the previous preset current.
    Prev {
        #[arg(value_name = "FILTER")]
        filter: Option<PathBuf>,
    },
    /// Print the techniques, definitions, and values of the current preset.
    Show,
}

pub fn parse() -> Cli {
    Cli::parse()
}
