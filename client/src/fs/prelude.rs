//! Shared imports for the `fs` submodules (`attr`, `read`, `write`, ...).

pub use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};

pub use std::ffi::OsStr;
pub use std::time::{SystemTime, UNIX_EPOCH};

pub use bytes::Bytes;

pub use crate::cache::{Attr, AttrKind, DirEntry};
pub use crate::fs_error::{FsError, FsResult};
pub use crate::path::{self, CanonicalPath};

pub use super::{resolve_attr, root_attr, to_file_attr, RemoteFs};
