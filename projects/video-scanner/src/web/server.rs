use crate::cli::ServeArgs;
use crate::web::api::{
    get_scan_results, get_scanned_videos, get_uploaded_videos, load_data, scan_videos,
    upload_video, AppState,
};
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Videos are large; no body limit on uploads
        .route(
            "/video/upload",
            post(upload_video).layer(DefaultBodyLimit::disable()),
        )
        .route("/video/list-videos-scanned", get(get_scanned_videos))
        .route("/video/list-videos-uploaded", get(get_uploaded_videos))
        .route("/video/scan", post(scan_videos))
        .route("/video/results/:video_name", get(get_scan_results))
        .route("/seeder/load-data", post(load_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(args: ServeArgs) -> Result<()> {
    let state = Arc::new(AppState {
        processor: args.dispatch.processor()?,
        dispatch: args.dispatch.dispatch_config(false),
        folders: args.folders,
        deploy: args.deploy,
    });

    let mut current_port = args.port;
    let listener = loop {
        let addr = SocketAddr::new(args.host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Must be non-blocking before tokio takes it over
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port
                    .checked_add(1)
                    .ok_or_else(|| anyhow::anyhow!("No available ports found"))?;
            }
        }
    };

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Video scanner API listening on http://{}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, router(state)).await?;

    Ok(())
}
