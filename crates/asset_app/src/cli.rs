use std::path::PathBuf;

use clap::Parser;

/// Harvest component images for a tabletop game and rank them.
#[derive(Debug, Parser)]
#[command(name = "harvest", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Game title, e.g. "Abyss"
    pub title: String,

    /// Extra page to search for a component section (repeatable)
    #[arg(short, long = "source", value_name = "URL")]
    pub sources: Vec<String>,

    /// Component label to look for near images (repeatable)
    #[arg(short, long = "label", value_name = "LABEL")]
    pub labels: Vec<String>,

    /// RON configuration file (defaults to $HARVEST_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory of per-game `<slug>.ron` profiles
    #[arg(short, long, value_name = "DIR")]
    pub profiles: Option<PathBuf>,

    /// Write the report to this directory instead of stdout
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Debug logging and per-URL diagnostics in the report
    #[arg(short, long)]
    pub verbose: bool,

    /// Also log to ./harvest.log
    #[arg(long)]
    pub log_file: bool,
}
