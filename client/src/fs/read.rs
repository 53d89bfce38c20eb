//! `lookup`/`readdir`/`read`/`open` — spec §4.1.

use super::prelude::*;
use futures_util::StreamExt;

pub fn lookup(fs: &RemoteFs, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let Some(parent_path) = fs.inodes.path_of(parent) else {
        reply.error(libc::ENOENT);
        return;
    };
    let child_path = match path::join(&parent_path, name) {
        Ok(p) => p,
        Err(err) => {
            reply.error(err.to_errno());
            return;
        }
    };

    match fs.runtime.block_on(resolve_attr(fs, &child_path)) {
        Ok(attr) => reply.entry(&fs.entry_timeout, &to_file_attr(&attr, req.uid(), req.gid()), 0),
        Err(err) => reply.error(err.to_errno()),
    }
}

pub fn readdir(fs: &RemoteFs, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
    let Some(dir_path) = fs.inodes.path_of(ino) else {
        reply.error(libc::ENOENT);
        return;
    };

    let entries = match fs.runtime.block_on(list_dir(fs, &dir_path)) {
        Ok(entries) => entries,
        Err(err) => {
            reply.error(err.to_errno());
            return;
        }
    };

    let parent_ino = if dir_path.is_root() {
        crate::inode::ROOT_INO
    } else {
        fs.inodes.ino_of_or_allocate(&dir_path.parent())
    };

    let mut rows: Vec<(u64, FileType, String)> = Vec::with_capacity(entries.len() + 2);
    rows.push((ino, FileType::Directory, ".".to_string()));
    rows.push((parent_ino, FileType::Directory, "..".to_string()));
    for entry in entries {
        let kind = match entry.kind {
            AttrKind::Dir => FileType::Directory,
            AttrKind::File => FileType::RegularFile,
        };
        rows.push((entry.ino, kind, entry.name));
    }

    for (i, (row_ino, kind, name)) in rows.into_iter().enumerate().skip(offset as usize) {
        if reply.add(row_ino, (i + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

/// Serves a directory listing from cache, falling back to `/list` on a
/// miss and populating both the dirent cache and each child's attr
/// cache in one round trip (spec §4.3 "dirent + attr on the same
/// listing response").
async fn list_dir(fs: &RemoteFs, dir_path: &CanonicalPath) -> FsResult<Vec<DirEntry>> {
    if let Some(entries) = fs.cache.get_dir(dir_path) {
        return Ok(entries);
    }

    let remote_entries = fs.remote.list(dir_path.as_rel_path()).await?;
    let mut dirents = Vec::with_capacity(remote_entries.len());
    for entry in remote_entries {
        let child_path = path::join_str(dir_path, &entry.name)?;
        let ino = fs.inodes.ino_of_or_allocate(&child_path);
        let kind = if entry.is_dir { AttrKind::Dir } else { AttrKind::File };
        let attr = Attr {
            ino,
            kind,
            size: if entry.is_dir { 0 } else { entry.size },
            mode: entry.mode(),
            mtime_s: entry.mtime,
            atime_s: entry.mtime,
            ctime_s: entry.mtime,
            nlink: entry.nlink_or_default(),
            uid: 0,
            gid: 0,
        };
        fs.cache.put_attr(child_path.clone(), attr);
        dirents.push(DirEntry { name: entry.name, kind, ino });
    }
    fs.cache.put_dir(dir_path.clone(), dirents.clone());
    Ok(dirents)
}

pub fn read(
    fs: &RemoteFs,
    _req: &Request<'_>,
    ino: u64,
    _fh: u64,
    offset: i64,
    size: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyData,
) {
    let Some(path) = fs.inodes.path_of(ino) else {
        reply.error(libc::ENOENT);
        return;
    };
    if size == 0 || offset < 0 {
        reply.data(&[]);
        return;
    }

    let start = offset as u64;
    let end_inclusive = start + size as u64 - 1;
    let result = fs.runtime.block_on(async {
        let stream = fs.remote.read_range(path.as_rel_path(), start, end_inclusive).await?;
        futures_util::pin_mut!(stream);
        let mut buf = Vec::with_capacity(size as usize);
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
            if buf.len() >= size as usize {
                break;
            }
        }
        Ok::<_, FsError>(buf)
    });

    match result {
        Ok(buf) => reply.data(&buf),
        Err(err) => reply.error(err.to_errno()),
    }
}

/// Validates the ino is live and allocates a handle in C5. No remote
/// open call is required (spec §4.1).
pub fn open(fs: &RemoteFs, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
    let Some(path) = fs.inodes.path_of(ino) else {
        reply.error(libc::ENOENT);
        return;
    };
    let write_access = (flags & libc::O_WRONLY != 0) || (flags & libc::O_RDWR != 0);
    let fh = fs.handles.open(ino, path, write_access);
    reply.opened(fh, 0);
}
