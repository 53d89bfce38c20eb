//! `rename` — spec §4.1. The move itself is a single remote PATCH; the
//! server applies overwrite semantics at the destination.

use super::prelude::*;

#[allow(clippy::too_many_arguments)]
pub fn rename(
    fs: &RemoteFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let Some(old_parent_path) = fs.inodes.path_of(parent) else {
        reply.error(libc::ENOENT);
        return;
    };
    let Some(new_parent_path) = fs.inodes.path_of(newparent) else {
        reply.error(libc::ENOENT);
        return;
    };
    let old_path = match path::join(&old_parent_path, name) {
        Ok(p) => p,
        Err(err) => {
            reply.error(err.to_errno());
            return;
        }
    };
    let new_path = match path::join(&new_parent_path, newname) {
        Ok(p) => p,
        Err(err) => {
            reply.error(err.to_errno());
            return;
        }
    };

    let result = fs
        .runtime
        .block_on(fs.remote.rename(old_path.as_rel_path(), new_path.as_rel_path()));

    match result {
        Ok(()) => {
            fs.inodes.rename(&old_path, &new_path);
            fs.cache.invalidate_subtree(&old_path);
            fs.cache.invalidate_dir(&old_parent_path);
            fs.cache.invalidate_dir(&new_parent_path);
            fs.cache.invalidate_attr(&new_path);
            reply.ok();
        }
        Err(err) => reply.error(err.to_errno()),
    }
}
