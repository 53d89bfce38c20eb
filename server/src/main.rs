use std::net::SocketAddr;
use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remotefs_server::state::AppState;
use remotefs_server::{build_router, watch};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = std::env::var("REMOTE_FS_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"));
    if let Err(err) = std::fs::create_dir_all(&root) {
        tracing::warn!("could not create storage root {}: {err}", root.display());
    }
    let root = root.canonicalize().unwrap_or(root);

    let state = AppState::new(root.clone());

    let _watcher = match watch::spawn(root.clone(), state.tx.clone()) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            tracing::warn!("filesystem watcher unavailable, push channel will be silent: {err}");
            None
        }
    };

    let app = build_router(state);

    let addr: SocketAddr = std::env::var("REMOTE_FS_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));

    tracing::info!(root = %root.display(), %addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind address");
    axum::serve(listener, app).await.expect("server error");
}
