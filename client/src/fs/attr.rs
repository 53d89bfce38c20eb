//! `getattr`/`setattr`/`statfs` — spec §4.1.

use super::prelude::*;

pub fn getattr(fs: &RemoteFs, req: &Request, ino: u64, reply: ReplyAttr) {
    let Some(path) = fs.inodes.path_of(ino) else {
        reply.error(libc::ENOENT);
        return;
    };
    match fs.runtime.block_on(resolve_attr(fs, &path)) {
        Ok(attr) => reply.attr(&fs.attr_timeout, &to_file_attr(&attr, req.uid(), req.gid())),
        Err(err) => reply.error(err.to_errno()),
    }
}

/// Maps to remote `chmod`, `truncate`, `utimes` in that order; uid/gid
/// changes are ignored (spec §4.1). Returns the refreshed Attr.
#[allow(clippy::too_many_arguments)]
pub fn setattr(
    fs: &RemoteFs,
    req: &Request<'_>,
    ino: u64,
    mode: Option<u32>,
    _uid: Option<u32>,
    _gid: Option<u32>,
    size: Option<u64>,
    atime: Option<TimeOrNow>,
    mtime: Option<TimeOrNow>,
    _ctime: Option<SystemTime>,
    _fh: Option<u64>,
    _crtime: Option<SystemTime>,
    _chgtime: Option<SystemTime>,
    _bkuptime: Option<SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    let Some(path) = fs.inodes.path_of(ino) else {
        reply.error(libc::ENOENT);
        return;
    };

    let result = fs.runtime.block_on(async {
        let rel = path.as_rel_path();
        if let Some(mode) = mode {
            fs.remote.chmod(rel, mode).await?;
        }
        if let Some(size) = size {
            fs.remote.truncate(rel, size).await?;
        }
        if atime.is_some() || mtime.is_some() {
            let atime_s = atime.and_then(time_or_now_to_secs);
            let mtime_s = mtime.and_then(time_or_now_to_secs);
            fs.remote.utimes(rel, atime_s, mtime_s).await?;
        }
        fs.cache.invalidate_attr(&path);
        resolve_attr(fs, &path).await
    });

    match result {
        Ok(attr) => reply.attr(&fs.attr_timeout, &to_file_attr(&attr, req.uid(), req.gid())),
        Err(err) => reply.error(err.to_errno()),
    }
}

fn time_or_now_to_secs(t: TimeOrNow) -> Option<i64> {
    let system_time = match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    };
    system_time
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

/// Serves the volume summary from cache, falling back to the remote
/// `/stats` endpoint on a miss (spec §4.1 "statfs ... cached for the
/// attribute TTL").
pub fn statfs(fs: &RemoteFs, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
    let key = path::CanonicalPath::sentinel("statfs");
    let result = fs.runtime.block_on(async {
        if let Some(stats) = fs.cache.get_stats(&key) {
            return Ok(stats);
        }
        let stats = fs.remote.statfs().await?;
        fs.cache.put_stats(key.clone(), stats);
        Ok(stats)
    });

    match result {
        Ok(stats) => reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize as u32,
            255,
            stats.bsize as u32,
        ),
        Err(err) => reply.error(err.to_errno()),
    }
}
