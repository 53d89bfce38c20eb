//! C5 — Open-File Table.
//!
//! Handles are addressable by a monotonic `fh` only. Each handle owns a
//! tokio `Mutex` so operations on one `fh` serialize while different
//! `fh`s proceed in parallel (spec §5). The write path is a stateful
//! streaming upload: sequential writes append to the open PUT stream;
//! a non-sequential write finalizes the current stream and opens a new
//! one at the new offset (spec §4.5).

use crate::fs_error::{FsError, FsResult};
use crate::path::CanonicalPath;
use crate::remote::RemoteClient;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex};

/// Adapts a `tokio::sync::mpsc::Receiver` into a `Stream` without
/// pulling in an extra crate for the wrapper.
struct MpscStream(mpsc::Receiver<Bytes>);

impl Stream for MpscStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.0.poll_recv(cx)
    }
}

struct UploadStream {
    sender: mpsc::Sender<Bytes>,
    task: tokio::task::JoinHandle<FsResult<u64>>,
}

pub struct OpenHandle {
    pub ino: u64,
    pub path: CanonicalPath,
    pub write_access: bool,
    pub write_cursor: u64,
    pub dirty: bool,
    upload: Option<UploadStream>,
    sticky_error: Option<String>,
    remote: Arc<RemoteClient>,
}

impl OpenHandle {
    fn new(ino: u64, path: CanonicalPath, write_access: bool, remote: Arc<RemoteClient>) -> Self {
        Self {
            ino,
            path,
            write_access,
            write_cursor: 0,
            dirty: false,
            upload: None,
            sticky_error: None,
            remote,
        }
    }

    fn start_upload(&mut self, offset: u64) {
        let (tx, rx) = mpsc::channel::<Bytes>(4);
        let remote = self.remote.clone();
        let rel_path = self.path.as_rel_path().to_string();
        let task = tokio::spawn(async move { remote.write_at(&rel_path, offset, MpscStream(rx)).await });
        self.upload = Some(UploadStream { sender: tx, task });
    }

    /// Closes and awaits the current upload stream, if any, surfacing
    /// any failure. Called on non-sequential writes and from
    /// `flush`/`fsync`/`release`.
    pub async fn finish_upload(&mut self) -> FsResult<()> {
        if let Some(upload) = self.upload.take() {
            drop(upload.sender);
            match upload.task.await {
                Ok(Ok(_written)) => Ok(()),
                Ok(Err(err)) => {
                    let msg = err.to_string();
                    self.sticky_error = Some(msg.clone());
                    Err(FsError::Transport(msg))
                }
                Err(join_err) => {
                    let msg = join_err.to_string();
                    self.sticky_error = Some(msg.clone());
                    Err(FsError::Transport(msg))
                }
            }
        } else {
            Ok(())
        }
    }

    fn take_sticky(&mut self) -> FsResult<()> {
        if let Some(msg) = self.sticky_error.take() {
            Err(FsError::Transport(msg))
        } else {
            Ok(())
        }
    }

    /// Appends `data` at `offset`, opening or continuing the streamed
    /// PUT as needed.
    pub async fn write(&mut self, offset: u64, data: Bytes) -> FsResult<u32> {
        self.take_sticky()?;
        let len = data.len() as u32;
        if len == 0 {
            return Ok(0);
        }

        let sequential = offset == self.write_cursor && self.upload.is_some();
        if !sequential {
            self.finish_upload().await?;
            self.start_upload(offset);
        }

        let send_failed = {
            let upload = self.upload.as_ref().expect("just started or already open");
            upload.sender.send(data).await.is_err()
        };
        if send_failed {
            // The upload task already exited (mid-stream failure);
            // collect its real error and make it sticky.
            self.finish_upload().await?;
            return Err(FsError::Transport("upload stream closed unexpectedly".into()));
        }

        self.write_cursor = offset + len as u64;
        self.dirty = true;
        Ok(len)
    }
}

pub struct OpenFileTable {
    handles: DashMap<u64, Arc<Mutex<OpenHandle>>>,
    next_fh: AtomicU64,
    remote: Arc<RemoteClient>,
}

impl OpenFileTable {
    pub fn new(remote: Arc<RemoteClient>) -> Self {
        Self {
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
            remote,
        }
    }

    pub fn open(&self, ino: u64, path: CanonicalPath, write_access: bool) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        let handle = OpenHandle::new(ino, path, write_access, self.remote.clone());
        self.handles.insert(fh, Arc::new(Mutex::new(handle)));
        fh
    }

    pub fn get(&self, fh: u64) -> Option<Arc<Mutex<OpenHandle>>> {
        self.handles.get(&fh).map(|e| e.clone())
    }

    pub fn close(&self, fh: u64) -> Option<Arc<Mutex<OpenHandle>>> {
        self.handles.remove(&fh).map(|(_, h)| h)
    }
}
