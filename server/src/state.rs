//! Explicit server context (spec §9 "ambient module state → explicit
//! context"): the storage root and the change-event hub are bundled
//! here and passed through Axum's `State` extractor, never read from a
//! process-global singleton.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::FsChangeEvent;

#[derive(Clone)]
pub struct AppState {
    pub root: Arc<PathBuf>,
    pub tx: broadcast::Sender<FsChangeEvent>,
}

impl AppState {
    pub fn new(root: PathBuf) -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            root: Arc::new(root),
            tx,
        }
    }
}
