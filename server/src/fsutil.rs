//! Shared helpers: `relPath` resolution against the storage root, and
//! on-disk metadata → wire DTO conversion (spec §6, §9 "typed DTOs").

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use serde::Serialize;

/// Resolves a canonical `relPath` (`.` or `./a/b/c`) against `root`,
/// rejecting traversal outside the root.
pub fn resolve(root: &Path, rel_path: &str) -> Result<PathBuf, StatusCode> {
    let trimmed = rel_path.trim_start_matches("./");
    if trimmed == "." || trimmed.is_empty() {
        return Ok(root.to_path_buf());
    }
    let mut resolved = root.to_path_buf();
    for component in trimmed.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        if component == ".." {
            return Err(StatusCode::BAD_REQUEST);
        }
        resolved.push(component);
    }
    Ok(resolved)
}

/// Expresses `path` (an absolute path under `root`) as a canonical
/// `relPath`, the inverse of [`resolve`].
pub fn to_rel_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rest) if rest.as_os_str().is_empty() => ".".to_string(),
        Ok(rest) => format!("./{}", rest.to_string_lossy().replace('\\', "/")),
        Err(_) => ".".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DirentRow {
    pub path: String,
    pub name: String,
    pub parent: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
    pub permissions: String,
    pub nlink: u32,
    pub version: u64,
}

pub fn metadata_row(root: &Path, path: &Path, meta: &std::fs::Metadata) -> DirentRow {
    let rel = to_rel_path(root, path);
    let parent = path
        .parent()
        .map(|p| to_rel_path(root, p))
        .unwrap_or_else(|| ".".to_string());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mtime = mtime_secs(meta);
    DirentRow {
        path: rel,
        name,
        parent,
        is_dir: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mtime,
        permissions: format!("{:o}", meta.permissions().mode() & 0o777),
        nlink: meta.nlink() as u32,
        version: mtime.max(0) as u64,
    }
}

pub fn mtime_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Result of interpreting a `Range` header against a known file size.
pub enum RangeOutcome {
    /// No `Range` header was present; serve the whole file.
    Full,
    /// A satisfiable `bytes=S-E` range, clamped to `[0, size-1]`.
    Partial(u64, u64),
    /// A `Range` header was present but its start lies at or beyond
    /// `size` (spec §8 "Boundaries" — out-of-range starts get an empty,
    /// non-200 response, not the full file).
    Unsatisfiable,
}

/// Parses a `Range: bytes=S-E` header against `size`, distinguishing "no
/// header" from "header present but unsatisfiable" so callers don't fold
/// both into the same full-file response.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeOutcome::Unsatisfiable;
    };
    let Some((start_s, end_s)) = spec.split_once('-') else {
        return RangeOutcome::Unsatisfiable;
    };
    let Ok(start) = start_s.parse::<u64>() else {
        return RangeOutcome::Unsatisfiable;
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }
    let end = if end_s.is_empty() {
        size.saturating_sub(1)
    } else {
        match end_s.parse::<u64>() {
            Ok(e) => e.min(size.saturating_sub(1)),
            Err(_) => return RangeOutcome::Unsatisfiable,
        }
    };
    RangeOutcome::Partial(start, end)
}
