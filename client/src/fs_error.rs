//! Client-internal error kinds and their mapping to POSIX errno values.
//!
//! Every component above the Remote Client (C2) propagates `FsError`
//! unchanged; the Kernel-Protocol Adapter (C6) is the only place that
//! converts it to an errno via [`FsError::to_errno`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("operation canceled")]
    Canceled,
    #[error("file too large")]
    FileTooLarge,
}

impl FsError {
    /// Maps a client-internal error kind to the errno the kernel expects
    /// (spec §4.1 "Error mapping" / §7).
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::PermissionDenied => libc::EACCES,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            // Timeouts intentionally surface as EIO, not ETIMEDOUT, so
            // user-space applications see a uniform "disk failure" class.
            FsError::Transport(_) => libc::EIO,
            FsError::Canceled => libc::EINTR,
            FsError::FileTooLarge => libc::EFBIG,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body_hint: impl Into<String>) -> Self {
        match status.as_u16() {
            400 => FsError::InvalidArgument(body_hint.into()),
            404 => FsError::NotFound,
            409 => FsError::AlreadyExists,
            413 => FsError::FileTooLarge,
            _ => FsError::Transport(format!("server responded {status}")),
        }
    }
}

impl From<reqwest::Error> for FsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FsError::Transport(format!("timeout: {err}"))
        } else {
            FsError::Transport(err.to_string())
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
