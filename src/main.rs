use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    api::AppState,
    config::RelayConfig,
    media::{diagnostics::LogDiagnostics, source::FfmpegSource},
};

mod api;
mod config;
mod media;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("ffmpeg_next", log::LevelFilter::Warn)
        .init();
}

fn exit_with(context: &str, e: anyhow::Error) -> ! {
    log::error!("{}: {:#}", context, e);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = RelayConfig::load().unwrap_or_else(|e| exit_with("Error loading config", e));
    ffmpeg_capture::init().unwrap_or_else(|e| exit_with("Error initialising ffmpeg", e));
    let server = config::server_config().unwrap_or_else(|e| exit_with("Error reading HOST/PORT", e));

    log::info!(
        "relaying {} as {}x{} mjpeg (fps: {:?}, drain: {:?}, shared: {})",
        config.endpoint(),
        config.output_width,
        config.output_height,
        config.target_fps,
        config.drain_policy,
        config.shared_upstream
    );

    let cancel = CancellationToken::new();

    let state = Arc::new(AppState::new(
        FfmpegSource::new(config.drain_policy),
        config.endpoint().clone(),
        config.supervisor_config(),
        LogDiagnostics::shared(),
        cancel.clone(),
        config.shared_upstream,
    ));
    let api = api::start_api_server(&server.bind_addr(), state, cancel.clone())
        .await
        .unwrap_or_else(|e| exit_with("Error starting API server", e));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    if tokio::time::timeout(Duration::from_secs(5), api).await.is_err() {
        log::warn!("API server did not stop within 5s");
    }

    std::process::exit(0);
}
