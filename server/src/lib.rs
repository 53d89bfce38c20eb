pub mod events;
pub mod fsutil;
pub mod handlers;
pub mod state;
pub mod watch;
pub mod ws;

use axum::routing::{get, patch, post};
use axum::Router;

use state::AppState;

/// Builds the full router over `state` — shared between `main` and the
/// integration tests so both exercise the exact same wiring.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/list", get(handlers::list))
        .route("/list/updatedMetadata", get(handlers::updated_metadata))
        .route(
            "/files",
            get(handlers::get_file).put(handlers::put_file).delete(handlers::delete_file),
        )
        .route("/files/chmod", patch(handlers::chmod))
        .route("/files/truncate", patch(handlers::truncate))
        .route("/files/utimes", patch(handlers::utimes))
        .route("/files/rename", patch(handlers::rename))
        .route("/mkdir", post(handlers::mkdir))
        .route("/stats", get(handlers::stats))
        .route("/watch", get(ws::watch))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
