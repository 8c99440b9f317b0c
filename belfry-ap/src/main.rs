//! Belfry Audio Player - main entry point
//!
//! Boots the application container (config, audio engine, manual player,
//! calendars, TTS, scheduler) and serves the HTTP/SSE control interface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use belfry_ap::{api, App, AppBackends};
use belfry_common::paths::resolve_root_folder;

/// Command-line arguments for belfry-ap
#[derive(Parser, Debug)]
#[command(name = "belfry-ap")]
#[command(about = "Schedule-driven facility audio daemon")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7777", env = "BELFRY_AP_PORT")]
    port: u16,

    /// Root folder for data and sound libraries
    #[arg(short, long, env = "BELFRY_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "belfry_ap=info,belfry_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let root = resolve_root_folder(args.root_folder.as_deref());
    info!("starting belfry-ap, data root {}", root.display());

    let app = App::new(root, AppBackends::null())
        .context("failed to initialize application")?;
    app.start();

    api::run(app.clone(), args.port)
        .await
        .context("HTTP server failed")?;

    app.shutdown();
    info!("shutdown complete");
    Ok(())
}
