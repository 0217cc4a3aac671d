mod acquisition;
mod api;
mod config;
mod downloader;
mod error;
mod events;
mod housekeeping;
mod jukebox;
mod models;
mod openapi;
mod playback;
mod presence;
mod resolver;
mod session;
mod session_registry;
mod startup;
mod state;
#[cfg(test)]
mod testing;
mod transcode;
mod transport;
mod watchdog;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jukebox-hub")]
pub(crate) struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8090
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Root of the per-room audio cache
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Hub config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,jukebox_hub=info")
        }))
        .init();

    startup::run(args).await
}
