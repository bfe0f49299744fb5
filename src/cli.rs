use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridaudit", about = "Beat-grid verification and generation for DJ libraries")]
pub struct Cli {
    /// Config file (defaults to gridaudit.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Write one report per track into this directory instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON reports
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value_t = 0, global = true)]
    pub jobs: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score each bundle's stored grid against its detected beats
    Check {
        /// Track bundles ({"tempoMarkers": [...], "rawBeat": {...}})
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
    },
    /// Build a new grid for each bundle
    Generate {
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
    },
    /// Drift of one bundle's beats against a trial grid
    Precision {
        bundle: PathBuf,

        /// Downbeat position in seconds
        #[arg(long, allow_negative_numbers = true)]
        phase: f64,

        #[arg(long)]
        bpm: f64,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Check { .. } => "check",
            Command::Generate { .. } => "generate",
            Command::Precision { .. } => "precision",
        }
    }
}
