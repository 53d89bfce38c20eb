//! `unlink`/`rmdir` — spec §4.1. The server removes directories
//! recursively on a single DELETE (spec §6), so the client no longer
//! needs to walk the tree itself.

use super::prelude::*;

pub fn unlink(fs: &RemoteFs, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    remove(fs, parent, name, reply);
}

pub fn rmdir(fs: &RemoteFs, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    remove(fs, parent, name, reply);
}

fn remove(fs: &RemoteFs, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let Some(parent_path) = fs.inodes.path_of(parent) else {
        reply.error(libc::ENOENT);
        return;
    };
    let target = match path::join(&parent_path, name) {
        Ok(p) => p,
        Err(err) => {
            reply.error(err.to_errno());
            return;
        }
    };

    match fs.runtime.block_on(fs.remote.delete(target.as_rel_path())) {
        Ok(()) => {
            fs.inodes.forget(&target);
            fs.cache.invalidate_subtree(&target);
            fs.cache.invalidate_dir(&parent_path);
            reply.ok();
        }
        Err(err) => reply.error(err.to_errno()),
    }
}
