use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use futures::StreamExt;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::media::{
    diagnostics::SharedDiagnostics,
    multipart,
    relay::StreamRelay,
    shared::SharedRelay,
    source::FrameSource,
    stream::FrameStream,
    supervisor::SupervisorConfig,
    types::StreamEndpoint,
};

const INDEX: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Live stream</title>
    <style>
      body { margin: 0; background: #111; display: flex; justify-content: center; align-items: center; height: 100vh; }
      img { max-width: 100%; max-height: 100%; }
    </style>
  </head>
  <body>
    <img src="/video_feed" alt="live stream">
  </body>
</html>
"#;

pub(crate) struct AppState<S: FrameSource + Clone> {
    source: S,
    endpoint: StreamEndpoint,
    config: SupervisorConfig,
    diagnostics: SharedDiagnostics,
    cancel: CancellationToken,
    shared: Option<SharedRelay<S>>,
}

impl<S: FrameSource + Clone> AppState<S> {
    pub(crate) fn new(
        source: S,
        endpoint: StreamEndpoint,
        config: SupervisorConfig,
        diagnostics: SharedDiagnostics,
        cancel: CancellationToken,
        shared_upstream: bool,
    ) -> Self {
        let shared = shared_upstream.then(|| {
            SharedRelay::new(
                source.clone(),
                endpoint.clone(),
                config.clone(),
                diagnostics.clone(),
                &cancel,
            )
        });
        Self {
            source,
            endpoint,
            config,
            diagnostics,
            cancel,
            shared,
        }
    }

    fn frames(&self) -> FrameStream {
        match &self.shared {
            Some(shared) => shared.subscribe(),
            None => Box::pin(StreamRelay::open(
                self.source.clone(),
                self.endpoint.clone(),
                &self.config,
                self.diagnostics.clone(),
                &self.cancel,
            )),
        }
    }
}

pub(crate) fn router<S>(state: Arc<AppState<S>>) -> Router
where
    S: FrameSource + Clone + Sync,
{
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed::<S>))
        .with_state(state)
}

/// Bind `addr` and serve until `cancel` fires.
pub(crate) async fn start_api_server<S>(
    addr: &str,
    state: Arc<AppState<S>>,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>>
where
    S: FrameSource + Clone + Sync,
{
    let listener = TcpListener::bind(addr).await?;
    log::info!("API server listening on {}", listener.local_addr()?);

    let app = router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("API server error: {}", e);
        }
    }))
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}

async fn index() -> Html<&'static str> {
    Html(INDEX)
}

async fn video_feed<S>(State(state): State<Arc<AppState<S>>>) -> Response
where
    S: FrameSource + Clone + Sync,
{
    // Dropping the body on disconnect drops the relay with it.
    let frames = state.frames().take_until(state.cancel.clone().cancelled_owned());

    (
        [
            (header::CONTENT_TYPE, multipart::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(multipart::body_stream(frames)),
    )
        .into_response()
}
