//! C6 — Kernel-Protocol Adapter.
//!
//! Dispatches FUSE upcalls to the shared C1–C5/C7 components. Every
//! upcall runs on the Tokio runtime via `block_on`; state access goes
//! through sharded/per-handle locks, never a single global mutex, so no
//! upcall holds a lock across the resulting network call (spec §5).

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};

use crate::cache::{Attr, AttrKind, Cache};
use crate::config::Config;
use crate::fs_error::FsResult;
use crate::handles::OpenFileTable;
use crate::inode::{InodeTable, ROOT_INO};
use crate::path::CanonicalPath;
use crate::remote::{RemoteClient, RetryPolicy};
use crate::subscriber::ChangeSubscriber;

pub mod attr;
pub mod create;
pub mod delete;
pub mod prelude;
pub mod read;
pub mod rename;
pub mod write;

/// Bundles the C1–C5/C7 components every upcall dispatches through.
pub struct RemoteFs {
    pub remote: Arc<RemoteClient>,
    pub cache: Arc<Cache>,
    pub inodes: Arc<InodeTable>,
    pub handles: Arc<OpenFileTable>,
    pub runtime: tokio::runtime::Runtime,
    pub attr_timeout: Duration,
    pub entry_timeout: Duration,
    _subscriber: ChangeSubscriber,
}

impl RemoteFs {
    pub fn new(config: Config) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to start Tokio runtime");

        let retry = RetryPolicy {
            max_attempts: config.remote.retry_max_attempts,
            budget: Duration::from_secs(config.remote.retry_budget_seconds),
            ..RetryPolicy::default()
        };
        let remote = Arc::new(
            RemoteClient::new(
                &config.remote.server_url,
                retry,
                Duration::from_secs(config.remote.connect_timeout_seconds),
            )
            .expect("invalid server url"),
        );
        let cache = Arc::new(Cache::new(&config.cache));
        let inodes = Arc::new(InodeTable::new());
        let handles = Arc::new(OpenFileTable::new(remote.clone()));

        let mut base = config.remote.server_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let ws_url = format!(
            "{}watch",
            base.replacen("http://", "ws://", 1).replacen("https://", "wss://", 1)
        );
        let subscriber = {
            let _guard = runtime.enter();
            ChangeSubscriber::spawn(ws_url, cache.clone(), inodes.clone())
        };

        Self {
            remote,
            cache,
            inodes,
            handles,
            runtime,
            attr_timeout: Duration::from_secs(config.kernel.attr_timeout_seconds),
            entry_timeout: Duration::from_secs(config.kernel.entry_timeout_seconds),
            _subscriber: subscriber,
        }
    }
}

/// Synthetic attributes for the mount root; never fetched remotely.
pub fn root_attr() -> Attr {
    Attr {
        ino: ROOT_INO,
        kind: AttrKind::Dir,
        size: 0,
        mode: 0o755,
        mtime_s: 0,
        atime_s: 0,
        ctime_s: 0,
        nlink: 2,
        uid: 0,
        gid: 0,
    }
}

/// Resolves `path`'s attributes from cache, falling back to a remote
/// metadata fetch on a miss (spec §4.1 "getattr").
pub async fn resolve_attr(fs: &RemoteFs, path: &CanonicalPath) -> FsResult<Attr> {
    if path.is_root() {
        return Ok(root_attr());
    }
    if let Some(attr) = fs.cache.get_attr(path) {
        return Ok(attr);
    }
    let entry = fs.remote.updated_metadata(path.as_rel_path()).await?;
    let ino = fs.inodes.ino_of_or_allocate(path);
    let attr = Attr {
        ino,
        kind: if entry.is_dir { AttrKind::Dir } else { AttrKind::File },
        size: if entry.is_dir { 0 } else { entry.size },
        mode: entry.mode(),
        mtime_s: entry.mtime,
        atime_s: entry.mtime,
        ctime_s: entry.mtime,
        nlink: entry.nlink_or_default(),
        uid: 0,
        gid: 0,
    };
    fs.cache.put_attr(path.clone(), attr);
    Ok(attr)
}

/// Converts a cache `Attr` to `fuser::FileAttr`, overriding uid/gid with
/// the mounting user from the current request (spec §3 "taken from the
/// mounting user; not remote").
pub fn to_file_attr(attr: &Attr, uid: u32, gid: u32) -> FileAttr {
    let mtime = UNIX_EPOCH + Duration::from_secs(attr.mtime_s.max(0) as u64);
    let atime = UNIX_EPOCH + Duration::from_secs(attr.atime_s.max(0) as u64);
    let ctime = UNIX_EPOCH + Duration::from_secs(attr.ctime_s.max(0) as u64);
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks(),
        atime,
        mtime,
        ctime,
        crtime: ctime,
        kind: match attr.kind {
            AttrKind::File => FileType::RegularFile,
            AttrKind::Dir => FileType::Directory,
        },
        perm: attr.mode,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}

#[derive(Clone)]
pub struct FsAdapter(pub Arc<RemoteFs>);

impl Filesystem for FsAdapter {
    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        read::lookup(&self.0, req, parent, name, reply);
    }

    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        attr::getattr(&self.0, req, ino, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        attr::setattr(
            &self.0, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        read::readdir(&self.0, req, ino, fh, offset, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        read::read(&self.0, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::open(&self.0, req, ino, flags, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        write::write(
            &self.0, req, ino, fh, offset, data, write_flags, flags, lock_owner, reply,
        );
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        write::release(&self.0, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        write::flush(&self.0, req, ino, fh, lock_owner, reply);
    }

    fn fsync(&mut self, req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        write::fsync(&self.0, req, ino, fh, datasync, reply);
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        create::create(&self.0, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        create::mkdir(&self.0, req, parent, name, mode, umask, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::unlink(&self.0, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::rmdir(&self.0, req, parent, name, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        rename::rename(&self.0, req, parent, name, newparent, newname, flags, reply);
    }

    fn statfs(&mut self, req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        attr::statfs(&self.0, req, ino, reply);
    }
}
