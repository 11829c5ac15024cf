mod cli;
mod clipboard;
mod client;
mod daemon;
mod hotkey;
mod ipc;
mod overlay;
mod store;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Daemon {
            store,
            hotkey,
            limit,
        } => {
            let config = daemon::DaemonConfig {
                store_path: store,
                hotkey,
                limit,
            };
            if let Err(e) = daemon::run(config).await {
                tracing::error!(error = %e, "daemon failed");
                eprintln!("cliphistd daemon: {e}");
                std::process::exit(1);
            }
        }
        Command::Overlay => {
            if let Err(e) = overlay::run().await {
                tracing::error!(error = %e, "overlay failed");
                eprintln!("cliphistd overlay: {e}");
                std::process::exit(1);
            }
        }
        Command::Query { command } => {
            if let Err(e) = client::run(command).await {
                tracing::error!(error = %e, "query failed");
                eprintln!("cliphistd query: {e}");
                std::process::exit(1);
            }
        }
    }
}
