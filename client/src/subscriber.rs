//! C7 — Change Subscriber.
//!
//! Long-lived push channel from the server; feeds invalidations to C3
//! and C4 ahead of TTL expiry (spec §4.6). On disconnect, backs off and
//! reconnects; it never resyncs, relying on TTL as the safety net.

use crate::cache::{Attr, AttrKind, Cache};
use crate::inode::InodeTable;
use crate::path::{self};
use dashmap::DashMap;
use futures_util::StreamExt;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

const RENAME_CORRELATION_WINDOW: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOp {
    Add,
    Write,
    Change,
    AddDir,
    Unlink,
    UnlinkDir,
    Rename,
    RenameDir,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAttrDto {
    pub size: u64,
    pub mtime: i64,
    pub permissions: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub nlink: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FsChangeEvent {
    pub op: ChangeOp,
    pub path: String,
    #[serde(default)]
    pub new_path: Option<String>,
    #[serde(default)]
    pub attrs: Option<RemoteAttrDto>,
}

/// Owns the background reconnect-and-dispatch task. Dropping this (or
/// calling `shutdown`) tears the task down.
pub struct ChangeSubscriber {
    task: tokio::task::JoinHandle<()>,
}

impl ChangeSubscriber {
    /// `ws_url` is the full `ws://` or `wss://` URL of the server's
    /// `/watch` endpoint.
    pub fn spawn(ws_url: String, cache: Arc<Cache>, inodes: Arc<InodeTable>) -> Self {
        let task = tokio::spawn(run(ws_url, cache, inodes));
        Self { task }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run(ws_url: String, cache: Arc<Cache>, inodes: Arc<InodeTable>) {
    let pending_unlinks: DashMap<String, Instant> = DashMap::new();
    let mut attempt: u32 = 0;
    loop {
        if let Ok((stream, _)) = tokio_tungstenite::connect_async(&ws_url).await {
            attempt = 0;
            let (_write, mut read) = stream.split();
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(event) = serde_json::from_str::<FsChangeEvent>(&text) {
                            handle_event(event, &cache, &inodes, &pending_unlinks);
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        if let Ok(event) = serde_json::from_slice::<FsChangeEvent>(&bytes) {
                            handle_event(event, &cache, &inodes, &pending_unlinks);
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }

        attempt = attempt.saturating_add(1);
        let backoff = Duration::from_millis(200) * 2u32.saturating_pow(attempt.min(6));
        let capped = backoff.min(Duration::from_secs(30));
        let jittered = rand::thread_rng().gen_range(Duration::ZERO..=capped);
        tokio::time::sleep(jittered).await;
    }
}

fn handle_event(
    event: FsChangeEvent,
    cache: &Cache,
    inodes: &InodeTable,
    pending_unlinks: &DashMap<String, Instant>,
) {
    let Ok(target) = path::normalize(&event.path) else {
        return;
    };

    match event.op {
        ChangeOp::Add | ChangeOp::Write | ChangeOp::Change => {
            pending_unlinks.remove(&event.path);
            cache.invalidate_attr(&target);
            cache.invalidate_dir(&target.parent());
            if let Some(dto) = event.attrs {
                let ino = inodes.ino_of_or_allocate(&target);
                cache.put_attr(target, dto_to_attr(ino, &dto));
            }
        }
        ChangeOp::AddDir => {
            pending_unlinks.remove(&event.path);
            cache.invalidate_dir(&target.parent());
        }
        ChangeOp::Unlink | ChangeOp::UnlinkDir => {
            cache.invalidate_subtree(&target);
            cache.invalidate_dir(&target.parent());
            inodes.forget(&target);
            // Held briefly so a correlated `add` on the same path folds
            // into this invalidation instead of firing a second one.
            pending_unlinks.insert(event.path.clone(), Instant::now());
        }
        ChangeOp::Rename | ChangeOp::RenameDir => {
            if let Some(new_path) = event.new_path.as_deref().and_then(|p| path::normalize(p).ok()) {
                inodes.rename(&target, &new_path);
                cache.invalidate_subtree(&target);
                cache.invalidate_dir(&target.parent());
                cache.invalidate_dir(&new_path.parent());
                pending_unlinks.remove(&event.path);
            }
        }
    }

    pending_unlinks.retain(|_, at| at.elapsed() <= RENAME_CORRELATION_WINDOW);
}

fn dto_to_attr(ino: u64, dto: &RemoteAttrDto) -> Attr {
    let mode = u16::from_str_radix(&dto.permissions, 8).unwrap_or(if dto.is_dir { 0o755 } else { 0o644 });
    Attr {
        ino,
        kind: if dto.is_dir { AttrKind::Dir } else { AttrKind::File },
        size: if dto.is_dir { 0 } else { dto.size },
        mode,
        mtime_s: dto.mtime,
        atime_s: dto.mtime,
        ctime_s: dto.mtime,
        nlink: dto.nlink.unwrap_or(if dto.is_dir { 2 } else { 1 }),
        uid: 0,
        gid: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    #[test]
    fn unlink_then_add_within_window_clears_pending_marker() {
        let cache = Cache::new(&CacheConfig::default());
        let inodes = InodeTable::new();
        let pending = DashMap::new();

        handle_event(
            FsChangeEvent {
                op: ChangeOp::Unlink,
                path: "a.txt".into(),
                new_path: None,
                attrs: None,
            },
            &cache,
            &inodes,
            &pending,
        );
        assert!(pending.contains_key("a.txt"));

        handle_event(
            FsChangeEvent {
                op: ChangeOp::Add,
                path: "a.txt".into(),
                new_path: None,
                attrs: None,
            },
            &cache,
            &inodes,
            &pending,
        );
        assert!(!pending.contains_key("a.txt"));
    }

    #[test]
    fn rename_event_rekeys_inode_table() {
        let cache = Cache::new(&CacheConfig::default());
        let inodes = InodeTable::new();
        let a = path::normalize("./a").unwrap();
        let ino = inodes.ino_of_or_allocate(&a);

        handle_event(
            FsChangeEvent {
                op: ChangeOp::Rename,
                path: "a".into(),
                new_path: Some("b".into()),
                attrs: None,
            },
            &cache,
            &inodes,
            &DashMap::new(),
        );

        let b = path::normalize("./b").unwrap();
        assert_eq!(inodes.ino_of(&b), Some(ino));
        assert_eq!(inodes.ino_of(&a), None);
    }
}
