//! Full realization of the spec §6 wire contract. Generalizes the
//! teacher's `get_file`/`put_file`/`mkdir`/`delete_file`/`list_dir`
//! handlers from path-segment routes to the `relPath`-query-parameter
//! contract, range reads, offset writes, and the chmod/truncate/utimes/
//! rename PATCH family. The local directory tree under `AppState::root`
//! plays the role of the metadata database the spec treats as out of
//! scope.

use std::os::unix::fs::PermissionsExt;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::fsutil::{self, DirentRow, RangeOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RelPathQuery {
    #[serde(rename = "relPath")]
    rel_path: String,
}

#[derive(Deserialize)]
pub struct WriteQuery {
    #[serde(rename = "relPath")]
    rel_path: String,
    offset: u64,
}

#[derive(Deserialize)]
pub struct ChmodQuery {
    #[serde(rename = "relPath")]
    rel_path: String,
    perm: String,
}

#[derive(Deserialize)]
pub struct TruncateQuery {
    #[serde(rename = "relPath")]
    rel_path: String,
    size: u64,
}

#[derive(Deserialize)]
pub struct UtimesQuery {
    #[serde(rename = "relPath")]
    rel_path: String,
    atime: Option<i64>,
    mtime: Option<i64>,
}

#[derive(Deserialize)]
pub struct RenameQuery {
    #[serde(rename = "oldRelPath")]
    old_rel_path: String,
    #[serde(rename = "newRelPath")]
    new_rel_path: String,
}

#[derive(Serialize)]
struct WrittenResponse {
    message: &'static str,
    written: u64,
}

#[derive(Serialize)]
struct StatsResponse {
    bsize: String,
    blocks: String,
    bfree: String,
    bavail: String,
    files: String,
    ffree: String,
}

/// `GET /list?relPath=P` — one row per child.
pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<RelPathQuery>,
) -> Result<Json<Vec<DirentRow>>, StatusCode> {
    let dir = fsutil::resolve(&state.root, &q.rel_path)?;
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    let mut rows = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)? {
        let meta = entry.metadata().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        rows.push(fsutil::metadata_row(&state.root, &entry.path(), &meta));
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(rows))
}

/// `GET /list/updatedMetadata?relPath=P` — single metadata row.
pub async fn updated_metadata(
    State(state): State<AppState>,
    Query(q): Query<RelPathQuery>,
) -> Result<Json<DirentRow>, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    let meta = tokio::fs::metadata(&path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(fsutil::metadata_row(&state.root, &path, &meta)))
}

/// `GET /files?relPath=P` — honors `Range`; 206 partial or 200 full.
pub async fn get_file(
    State(state): State<AppState>,
    Query(q): Query<RelPathQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    let mut file = tokio::fs::File::open(&path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    let meta = file.metadata().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if meta.is_dir() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let size = meta.len();

    let range_header = headers.get(axum::http::header::RANGE).and_then(|v| v.to_str().ok());

    match fsutil::parse_range(range_header, size) {
        RangeOutcome::Partial(start, end) => {
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let len = end - start + 1;
            let body = Body::from_stream(ReaderStream::new(file.take(len)));
            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (axum::http::header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
                    (axum::http::header::CONTENT_LENGTH, len.to_string()),
                ],
                body,
            )
                .into_response())
        }
        RangeOutcome::Full => {
            let body = Body::from_stream(ReaderStream::new(file));
            Ok((
                StatusCode::OK,
                [(axum::http::header::CONTENT_LENGTH, size.to_string())],
                body,
            )
                .into_response())
        }
        RangeOutcome::Unsatisfiable => Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(axum::http::header::CONTENT_RANGE, format!("bytes */{size}"))],
            Body::empty(),
        )
            .into_response()),
    }
}

/// `PUT /files?relPath=P&offset=N` — `offset=0` truncates to the body
/// length; any other offset overlays bytes without shrinking the file
/// (spec §6, flagged as an asymmetry to confirm in spec §9's Open
/// Questions).
pub async fn put_file(
    State(state): State<AppState>,
    Query(q): Query<WriteQuery>,
    body: Body,
) -> Result<Json<WrittenResponse>, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(q.offset == 0)
        .open(&path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    file.seek(std::io::SeekFrom::Start(q.offset))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut stream = body.into_data_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| StatusCode::BAD_REQUEST)?;
        file.write_all(&chunk).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(WrittenResponse { message: "ok", written }))
}

/// `DELETE /files?relPath=P` — removes a file, or recursively removes a
/// directory, in one call.
pub async fn delete_file(
    State(state): State<AppState>,
    Query(q): Query<RelPathQuery>,
) -> Result<StatusCode, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    let meta = tokio::fs::metadata(&path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(&path).await
    } else {
        tokio::fs::remove_file(&path).await
    };
    result.map(|_| StatusCode::OK).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// `PATCH /files/chmod?relPath=P&perm=OCT`.
pub async fn chmod(
    State(state): State<AppState>,
    Query(q): Query<ChmodQuery>,
) -> Result<StatusCode, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    let mode = u32::from_str_radix(&q.perm, 8).map_err(|_| StatusCode::BAD_REQUEST)?;
    let perms = std::fs::Permissions::from_mode(mode & 0o777);
    tokio::fs::set_permissions(&path, perms)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|_| StatusCode::NOT_FOUND)
}

/// `PATCH /files/truncate?relPath=P&size=N`.
pub async fn truncate(
    State(state): State<AppState>,
    Query(q): Query<TruncateQuery>,
) -> Result<StatusCode, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    file.set_len(q.size)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// `PATCH /files/utimes?relPath=P&atime=S&mtime=S` — either may be
/// omitted.
pub async fn utimes(
    State(state): State<AppState>,
    Query(q): Query<UtimesQuery>,
) -> Result<StatusCode, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    if tokio::fs::metadata(&path).await.is_err() {
        return Err(StatusCode::NOT_FOUND);
    }

    let atime = q.atime;
    let mtime = q.mtime;
    tokio::task::spawn_blocking(move || set_times(&path, atime, mtime))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(|_| StatusCode::OK)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Sets atime/mtime via `utimensat`, omitting whichever side wasn't
/// requested (`UTIME_OMIT`).
fn set_times(path: &std::path::Path, atime_s: Option<i64>, mtime_s: Option<i64>) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "nul in path"))?;
    let spec = |secs: Option<i64>| libc::timespec {
        tv_sec: secs.unwrap_or(0) as libc::time_t,
        tv_nsec: if secs.is_some() { 0 } else { libc::UTIME_OMIT },
    };
    let times = [spec(atime_s), spec(mtime_s)];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
    if rc != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// `PATCH /files/rename?oldRelPath=A&newRelPath=B` — overwrites the
/// target if it exists. Paths starting with `/.Trash-` get their parent
/// directory created first (spec §6).
pub async fn rename(
    State(state): State<AppState>,
    Query(q): Query<RenameQuery>,
) -> Result<StatusCode, StatusCode> {
    let old_path = fsutil::resolve(&state.root, &q.old_rel_path)?;
    let new_path = fsutil::resolve(&state.root, &q.new_rel_path)?;

    if q.new_rel_path.starts_with("/.Trash-") || q.new_rel_path.contains("/.Trash-") {
        if let Some(parent) = new_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        }
    }

    if tokio::fs::metadata(&new_path).await.is_ok() {
        let meta = tokio::fs::metadata(&new_path).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if meta.is_dir() {
            let _ = tokio::fs::remove_dir_all(&new_path).await;
        } else {
            let _ = tokio::fs::remove_file(&new_path).await;
        }
    }

    tokio::fs::rename(&old_path, &new_path)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|_| StatusCode::NOT_FOUND)
}

/// `POST /mkdir?relPath=P` — 409 if it already exists.
pub async fn mkdir(
    State(state): State<AppState>,
    Query(q): Query<RelPathQuery>,
) -> Result<StatusCode, StatusCode> {
    let path = fsutil::resolve(&state.root, &q.rel_path)?;
    if tokio::fs::metadata(&path).await.is_ok() {
        return Err(StatusCode::CONFLICT);
    }
    tokio::fs::create_dir_all(&path)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// `GET /stats` — volume summary; all fields as decimal strings (spec
/// §9 "Loose JSON typing").
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, StatusCode> {
    let root = state.root.clone();
    let info = tokio::task::spawn_blocking(move || statvfs(&root))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(StatsResponse {
        bsize: info.bsize.to_string(),
        blocks: info.blocks.to_string(),
        bfree: info.bfree.to_string(),
        bavail: info.bavail.to_string(),
        files: info.files.to_string(),
        ffree: info.ffree.to_string(),
    }))
}

struct VolumeInfo {
    bsize: u64,
    blocks: u64,
    bfree: u64,
    bavail: u64,
    files: u64,
    ffree: u64,
}

fn statvfs(root: &std::path::Path) -> std::io::Result<VolumeInfo> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(root.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "nul in path"))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(VolumeInfo {
        bsize: stat.f_frsize as u64,
        blocks: stat.f_blocks as u64,
        bfree: stat.f_bfree as u64,
        bavail: stat.f_bavail as u64,
        files: stat.f_files as u64,
        ffree: stat.f_ffree as u64,
    })
}
