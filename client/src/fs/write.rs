//! `write`/`release`/`flush`/`fsync` — spec §4.1, §4.5.

use super::prelude::*;

#[allow(clippy::too_many_arguments)]
pub fn write(
    fs: &RemoteFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    let Some(handle) = fs.handles.get(fh) else {
        reply.error(libc::EBADF);
        return;
    };
    if offset < 0 {
        reply.error(libc::EINVAL);
        return;
    }

    let bytes = Bytes::copy_from_slice(data);
    let result = fs
        .runtime
        .block_on(async move { handle.lock().await.write(offset as u64, bytes).await });

    match result {
        Ok(written) => reply.written(written),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub fn release(
    fs: &RemoteFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    let Some(handle) = fs.handles.close(fh) else {
        reply.ok();
        return;
    };
    let (path, dirty, finish) = finish_handle(fs, handle);
    if dirty {
        fs.cache.invalidate_attr(&path);
        fs.cache.invalidate_dir(&path.parent());
    }
    match finish {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub fn flush(fs: &RemoteFs, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
    finish_and_invalidate(fs, fh, reply);
}

pub fn fsync(fs: &RemoteFs, _req: &Request<'_>, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
    finish_and_invalidate(fs, fh, reply);
}

fn finish_and_invalidate(fs: &RemoteFs, fh: u64, reply: ReplyEmpty) {
    let Some(handle) = fs.handles.get(fh) else {
        reply.ok();
        return;
    };
    let (path, dirty, finish) = finish_handle(fs, handle);
    if dirty {
        fs.cache.invalidate_attr(&path);
        fs.cache.invalidate_dir(&path.parent());
    }
    match finish {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.to_errno()),
    }
}

/// Closes any in-flight upload stream and reports the path/dirty flag
/// so the caller can invalidate the right cache entries (spec §4.5).
fn finish_handle(
    fs: &RemoteFs,
    handle: std::sync::Arc<tokio::sync::Mutex<crate::handles::OpenHandle>>,
) -> (CanonicalPath, bool, FsResult<()>) {
    fs.runtime.block_on(async move {
        let mut guard = handle.lock().await;
        let path = guard.path.clone();
        let dirty = guard.dirty;
        let finish = guard.finish_upload().await;
        (path, dirty, finish)
    })
}
