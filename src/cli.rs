// CLI module for handling command-line interface

use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_PARALLEL_DOWNLOADS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mcup", version)]
#[command(about = "Keeps a Minecraft server jar and its plugins up to date")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Update even if the cooldown has not passed yet
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Directory holding the config file and the download cache
    #[arg(long, env = "MCUP_DIR", global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Config file, defaults to config.yaml inside the config directory
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// How many plugins are checked and downloaded at the same time
    #[arg(long, global = true, default_value_t = DEFAULT_PARALLEL_DOWNLOADS)]
    pub parallel_downloads: usize,

    /// Retries of a failed download
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Treat every remote version as newer, forcing a redownload
    #[arg(long, global = true)]
    pub skip_version_check: bool,

    /// Also update plugins whose jar is missing from the server folder
    #[arg(long, global = true)]
    pub force_leftover_update: bool,

    /// Keep config keys no registered updater knows about
    #[arg(long, global = true)]
    pub no_config_cleanup: bool,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Scan the plugins folder, then update the server and plugins (default)
    Run,
    /// Only scan the plugins folder and record what is installed
    Scan,
    /// Write the default config file
    Init {
        /// Server folder to record in the new config
        #[arg(long)]
        server_folder: Option<PathBuf>,
    },
}
