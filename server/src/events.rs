//! Wire shape of the `/watch` push channel (spec §4.6, §6 "Push
//! channel"). Field names and the `op` tag values mirror the client's
//! `subscriber::FsChangeEvent` exactly — this is the only contract
//! between the two crates, so keep them in lockstep by hand.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
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

#[derive(Debug, Clone, Serialize)]
pub struct RemoteAttrDto {
    pub size: u64,
    pub mtime: i64,
    pub permissions: String,
    pub is_dir: bool,
    pub nlink: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FsChangeEvent {
    pub op: ChangeOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<RemoteAttrDto>,
}
