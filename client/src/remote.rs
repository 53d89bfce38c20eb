//! C2 — Remote Client.
//!
//! A stateless HTTP transport over the wire contract in spec §6. All
//! paths travel as the `relPath` query parameter; bodies are
//! `application/octet-stream` for file contents and JSON otherwise.
//!
//! Idempotent operations are retried with jittered exponential backoff
//! (spec §4.2); streamed writes are never retried once a byte has left
//! the wire.

use crate::fs_error::{FsError, FsResult};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// One row of a `/list` response, typed at the boundary per spec §9
/// ("Loose JSON typing → typed DTOs").
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
    /// Octal permission string, e.g. `"644"`.
    pub permissions: String,
    /// Absent on older server versions; defaults per spec §9.
    #[serde(default)]
    pub nlink: Option<u32>,
}

impl RemoteEntry {
    pub fn mode(&self) -> u16 {
        u16::from_str_radix(&self.permissions, 8).unwrap_or(if self.is_dir { 0o755 } else { 0o644 })
    }

    pub fn nlink_or_default(&self) -> u32 {
        self.nlink.unwrap_or(if self.is_dir { 2 } else { 1 })
    }
}

/// `/stats` response. All fields arrive as decimal strings; parsed into
/// 64-bit integers here, never passed inward as strings (spec §9).
#[derive(Debug, Clone, Deserialize)]
struct StatsWire {
    bsize: String,
    blocks: String,
    bfree: String,
    bavail: String,
    files: String,
    ffree: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeStats {
    pub bsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
}

fn parse_decimal(field: &str, raw: &str) -> FsResult<u64> {
    raw.parse()
        .map_err(|_| FsError::InvalidArgument(format!("non-numeric stats field {field}: {raw:?}")))
}

impl TryFrom<StatsWire> for VolumeStats {
    type Error = FsError;

    fn try_from(w: StatsWire) -> Result<Self, Self::Error> {
        Ok(VolumeStats {
            bsize: parse_decimal("bsize", &w.bsize)?,
            blocks: parse_decimal("blocks", &w.blocks)?,
            bfree: parse_decimal("bfree", &w.bfree)?,
            bavail: parse_decimal("bavail", &w.bavail)?,
            files: parse_decimal("files", &w.files)?,
            ffree: parse_decimal("ffree", &w.ffree)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct WrittenResponse {
    #[allow(dead_code)]
    message: String,
    written: u64,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub budget: Duration,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            budget: Duration::from_secs(10),
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Retries an idempotent operation with full-jitter exponential backoff,
/// bounded by both attempt count and total wall-clock time (spec §4.2).
async fn retry_idempotent<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> FsResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = FsResult<T>>,
{
    let started = tokio::time::Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts || started.elapsed() >= policy.budget => {
                return Err(err);
            }
            Err(err @ FsError::Transport(_)) => {
                let backoff = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                let jittered = rand::thread_rng().gen_range(Duration::ZERO..=backoff);
                let remaining = policy.budget.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(err);
                }
                tokio::time::sleep(jittered.min(remaining)).await;
            }
            // Not retriable: these are semantic rejections, not
            // transport failures.
            Err(err) => return Err(err),
        }
    }
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    deadline: Duration,
}

impl RemoteClient {
    pub fn new(server_url: &str, retry: RetryPolicy, deadline: Duration) -> FsResult<Self> {
        let base_url = Url::parse(server_url)
            .map_err(|e| FsError::InvalidArgument(format!("bad server url: {e}")))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| FsError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            retry,
            deadline,
        })
    }

    fn url(&self, path_and_query: &str) -> Url {
        self.base_url
            .join(path_and_query)
            .expect("base_url is a valid base")
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = FsResult<T>>,
    ) -> FsResult<T> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(FsError::Transport("request deadline exceeded".into())),
        }
    }

    fn map_response_error(status: reqwest::StatusCode) -> FsError {
        FsError::from_status(status, "")
    }

    /// Retries a bodyless `HEAD` against `url` until the connection
    /// itself succeeds (any response, including an error status, counts
    /// as connected). Only a connect-level failure is retriable here; a
    /// response of any kind means the server is reachable and the real
    /// request can proceed.
    async fn ensure_connected(&self, url: &Url) -> FsResult<()> {
        retry_idempotent(&self.retry, || async {
            match self.http.head(url.clone()).send().await {
                Err(err) if err.is_connect() => Err(FsError::from(err)),
                _ => Ok(()),
            }
        })
        .await
    }

    pub async fn list(&self, rel_path: &str) -> FsResult<Vec<RemoteEntry>> {
        let url = self.url(&format!("list?relPath={}", urlencode(rel_path)));
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.get(url.clone()).send().await?;
                if !resp.status().is_success() {
                    return Err(Self::map_response_error(resp.status()));
                }
                resp.json::<Vec<RemoteEntry>>()
                    .await
                    .map_err(FsError::from)
            })
            .await
        })
        .await
    }

    pub async fn updated_metadata(&self, rel_path: &str) -> FsResult<RemoteEntry> {
        let url = self.url(&format!(
            "list/updatedMetadata?relPath={}",
            urlencode(rel_path)
        ));
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.get(url.clone()).send().await?;
                if !resp.status().is_success() {
                    return Err(Self::map_response_error(resp.status()));
                }
                resp.json::<RemoteEntry>().await.map_err(FsError::from)
            })
            .await
        })
        .await
    }

    pub async fn statfs(&self) -> FsResult<VolumeStats> {
        let url = self.url("stats");
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.get(url.clone()).send().await?;
                if !resp.status().is_success() {
                    return Err(Self::map_response_error(resp.status()));
                }
                let wire = resp.json::<StatsWire>().await.map_err(FsError::from)?;
                VolumeStats::try_from(wire)
            })
            .await
        })
        .await
    }

    /// Range-reads `[start, end_inclusive]`. Returns a lazy byte stream
    /// that back-pressures on the consumer; never buffers the whole
    /// body (spec §4.2 "Streaming").
    pub async fn read_range(
        &self,
        rel_path: &str,
        start: u64,
        end_inclusive: u64,
    ) -> FsResult<impl Stream<Item = FsResult<Bytes>>> {
        let url = self.url(&format!("files?relPath={}", urlencode(rel_path)));
        let range_header = format!("bytes={start}-{end_inclusive}");
        let resp = retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self
                    .http
                    .get(url.clone())
                    .header(reqwest::header::RANGE, range_header.clone())
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(Self::map_response_error(resp.status()));
                }
                Ok(resp)
            })
            .await
        })
        .await?;

        Ok(resp.bytes_stream().map_err(FsError::from))
    }

    /// Streams `body` to the server starting at `offset`. Per spec §6,
    /// `offset == 0` truncates the remote file to the streamed length;
    /// any other offset overlays bytes without shrinking the file.
    ///
    /// The streamed upload itself is never retried once the caller
    /// starts producing bytes into `body` — there is no way to safely
    /// replay a partially-consumed stream. A clean connect failure
    /// before any byte is sent is a different case (spec §4.2): the
    /// connection is established with a cheap, idempotent probe first,
    /// retried under the usual policy, before the stream is ever touched.
    pub async fn write_at(
        &self,
        rel_path: &str,
        offset: u64,
        body: impl Stream<Item = Bytes> + Send + 'static,
    ) -> FsResult<u64> {
        let url = self.url(&format!(
            "files?relPath={}&offset={offset}",
            urlencode(rel_path)
        ));
        self.ensure_connected(&url).await?;
        let reqwest_body = reqwest::Body::wrap_stream(body.map(Ok::<Bytes, std::io::Error>));
        let resp = self
            .with_deadline(async {
                self.http
                    .put(url)
                    .body(reqwest_body)
                    .send()
                    .await
                    .map_err(FsError::from)
            })
            .await?;
        if !resp.status().is_success() {
            return Err(Self::map_response_error(resp.status()));
        }
        let parsed: WrittenResponse = resp.json().await.map_err(FsError::from)?;
        Ok(parsed.written)
    }

    pub async fn mkdir(&self, rel_path: &str) -> FsResult<()> {
        let url = self.url(&format!("mkdir?relPath={}", urlencode(rel_path)));
        self.with_deadline(async {
            let resp = self.http.post(url).send().await?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(Self::map_response_error(resp.status()))
            }
        })
        .await
    }

    pub async fn delete(&self, rel_path: &str) -> FsResult<()> {
        let url = self.url(&format!("files?relPath={}", urlencode(rel_path)));
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.delete(url.clone()).send().await?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(Self::map_response_error(resp.status()))
                }
            })
            .await
        })
        .await
    }

    pub async fn chmod(&self, rel_path: &str, mode_octal: u32) -> FsResult<()> {
        let url = self.url(&format!(
            "files/chmod?relPath={}&perm={:o}",
            urlencode(rel_path),
            mode_octal & 0o777
        ));
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.patch(url.clone()).send().await?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(Self::map_response_error(resp.status()))
                }
            })
            .await
        })
        .await
    }

    pub async fn truncate(&self, rel_path: &str, size: u64) -> FsResult<()> {
        let url = self.url(&format!(
            "files/truncate?relPath={}&size={size}",
            urlencode(rel_path)
        ));
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.patch(url.clone()).send().await?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(Self::map_response_error(resp.status()))
                }
            })
            .await
        })
        .await
    }

    pub async fn utimes(
        &self,
        rel_path: &str,
        atime_s: Option<i64>,
        mtime_s: Option<i64>,
    ) -> FsResult<()> {
        let mut query = format!("relPath={}", urlencode(rel_path));
        if let Some(a) = atime_s {
            query.push_str(&format!("&atime={a}"));
        }
        if let Some(m) = mtime_s {
            query.push_str(&format!("&mtime={m}"));
        }
        let url = self.url(&format!("files/utimes?{query}"));
        retry_idempotent(&self.retry, || async {
            self.with_deadline(async {
                let resp = self.http.patch(url.clone()).send().await?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(Self::map_response_error(resp.status()))
                }
            })
            .await
        })
        .await
    }

    pub async fn rename(&self, old_rel_path: &str, new_rel_path: &str) -> FsResult<()> {
        let url = self.url(&format!(
            "files/rename?oldRelPath={}&newRelPath={}",
            urlencode(old_rel_path),
            urlencode(new_rel_path)
        ));
        // Non-idempotent in the general case (overwrite semantics), but
        // safe to retry before any response has been observed: a clean
        // connect failure means the rename never reached the server.
        self.with_deadline(async {
            let resp = self.http.patch(url).send().await?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(Self::map_response_error(resp.status()))
            }
        })
        .await
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
