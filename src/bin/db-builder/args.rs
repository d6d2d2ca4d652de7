use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a named database build from a JSON manifest")]
pub(crate) struct Args {
    /// Name of the build to run, as it appears in the manifest
    pub(crate) build_name: String,
    /// INI file with one section per connection name
    #[arg(long, default_value = "config.ini")]
    pub(crate) credentials: PathBuf,
    /// JSON manifest listing the builds
    #[arg(long, default_value = "settings.json")]
    pub(crate) manifest: PathBuf,
    /// Also append log output to this file
    #[arg(long)]
    pub(crate) log_file: Option<PathBuf>,
    /// Abort any single step that runs longer than this (e.g. "90s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) step_timeout: Option<Duration>,
    /// Resolve the build and print its steps without connecting
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Log at debug level
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl Args {
    pub(crate) fn log_level(&self) -> Level {
        if self.verbose { Level::DEBUG } else { Level::INFO }
    }
}
