use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "dayrecap-daemon", version, about = "Collects activity and writes daily reports")]
pub struct DaemonArgs {
    /// Run in the foreground instead of detaching.
    #[arg(long)]
    pub force: bool,
    /// Directory for the daemon's own log files.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Configuration file. Defaults to $XDG_CONFIG_HOME/dayrecap/config.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
