//! `create`/`mkdir` — spec §4.1.

use super::prelude::*;

pub fn create(
    fs: &RemoteFs,
    req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    mode: u32,
    _umask: u32,
    _flags: i32,
    reply: ReplyCreate,
) {
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

    let result = fs.runtime.block_on(async {
        let empty = futures_util::stream::empty::<Bytes>();
        fs.remote.write_at(child_path.as_rel_path(), 0, empty).await?;
        fs.cache.invalidate_dir(&parent_path);
        resolve_attr(fs, &child_path).await
    });

    match result {
        Ok(mut attr) => {
            attr.mode = (mode & 0o777) as u16;
            fs.cache.put_attr(child_path.clone(), attr);
            let fh = fs.handles.open(attr.ino, child_path, true);
            reply.created(&fs.entry_timeout, &to_file_attr(&attr, req.uid(), req.gid()), 0, fh, 0);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub fn mkdir(
    fs: &RemoteFs,
    req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    mode: u32,
    _umask: u32,
    reply: ReplyEntry,
) {
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

    let result = fs.runtime.block_on(async {
        fs.remote.mkdir(child_path.as_rel_path()).await?;
        fs.cache.invalidate_dir(&parent_path);
        resolve_attr(fs, &child_path).await
    });

    match result {
        Ok(mut attr) => {
            attr.mode = (mode & 0o777) as u16;
            fs.cache.put_attr(child_path, attr);
            reply.entry(&fs.entry_timeout, &to_file_attr(&attr, req.uid(), req.gid()), 0);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}
