//! HTTP host for the media fetch engine.
mod api;
mod config;

use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use engine_logging::{engine_error, engine_info, engine_warn};
use media_engine::{ensure_output_dir, locate_downloader, Orchestrator, ProgressBroadcaster};

use crate::api::AppState;
use crate::config::{ServerConfig, DOWNLOADER_ENV};

/// Exit status when the external downloader is not installed.
const EXIT_DOWNLOADER_MISSING: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let mut config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("media_server: {err}");
            return ExitCode::FAILURE;
        }
    };
    engine_logging::initialize(
        config.log_destination,
        engine_logging::parse_level(&config.log_level),
        &config.log_file,
    );

    let program = config.engine.downloader.program.clone();
    match locate_downloader(&program) {
        Ok(path) => {
            engine_info!("using downloader {:?}", path);
            config.engine.downloader.program = path.display().to_string();
        }
        Err(err) => {
            engine_error!("{}", err);
            eprintln!(
                "media_server: {err}. Install yt-dlp or point {DOWNLOADER_ENV} at the binary."
            );
            return ExitCode::from(EXIT_DOWNLOADER_MISSING);
        }
    }

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("{:#}", err);
            eprintln!("media_server: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    ensure_output_dir(&config.engine.download_dir).with_context(|| {
        format!(
            "download directory {:?} is not usable",
            config.engine.download_dir
        )
    })?;

    let broadcaster = ProgressBroadcaster::new();
    let orchestrator = Orchestrator::new(config.engine.clone(), broadcaster.clone());
    let app = api::router(AppState {
        orchestrator: Arc::new(orchestrator),
        broadcaster,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    engine_info!(
        "listening on {} (downloads to {:?})",
        config.bind_address,
        config.engine.download_dir
    );

    // Progress streams never end on their own, so shutdown does not wait for
    // open connections.
    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("server stopped")?;
        }
        () = shutdown_signal() => {
            engine_info!("shutting down");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        engine_warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
}
