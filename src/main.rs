mod cli;
mod commands;
mod config;
mod constants;
mod download;
mod error;
mod hash;
mod jar;
mod registry;
mod storage;
mod ui;
mod update;
mod updaters;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Workspace;
use commands::run::RunOptions;
use config::Paths;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;
use update::UpdateOptions;
use updaters::UpdateContext;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing running downloads before stopping");
            on_signal.cancel();
        }
    });

    if let Err(e) = dispatch(cli, cancel.clone()).await {
        cancel.cancel();
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let paths = Paths::new(cli.config_dir.clone(), cli.config.clone());
    debug!("Using config {}", paths.config_file().display());
    let workspace = Workspace::new(paths)?;
    let cleanup = !cli.no_config_cleanup;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init { server_folder } => commands::init::init(&workspace, server_folder),
        Commands::Scan => commands::scan::scan(&workspace, cleanup, &cancel).map(|_| ()),
        Commands::Run => {
            let options = RunOptions {
                force: cli.force,
                cleanup,
                max_retries: cli.max_retries,
                update: UpdateOptions {
                    parallel_downloads: cli.parallel_downloads.max(1),
                    force_leftover_update: cli.force_leftover_update,
                },
                ctx: UpdateContext {
                    skip_version_check: cli.skip_version_check,
                },
            };
            commands::run::run(&workspace, options, cancel).await.map(|_| ())
        }
    }
}
