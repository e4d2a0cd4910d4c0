//! Streaming HTTP download of a single video into a timestamped file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::core::config::GrabberConfig;
use crate::core::types::{DownloadOutcome, GrabError};

/// Bytes handed to the file per write.
pub const CHUNK_SIZE: usize = 8192;

/// Suffixes tried before giving up on a name that keeps colliding.
const MAX_NAME_ATTEMPTS: u32 = 1000;

pub fn build_http_client(cfg: &GrabberConfig) -> Result<reqwest::Client, GrabError> {
    let mut builder = reqwest::Client::builder().connect_timeout(cfg.connect_timeout);
    if let Some(timeout) = cfg.http_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

pub fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, GrabError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GrabError::Config(format!("header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GrabError::Config(format!("header '{}' value: {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// `video_<YYYYMMDD_HHMMSS>.mp4`
pub fn timestamped_filename(now: DateTime<Local>) -> String {
    format!("video_{}.mp4", now.format("%Y%m%d_%H%M%S"))
}

/// Create a file that did not exist before. When `name` is taken, `_1`, `_2`,
/// ... are appended to the stem.
async fn create_unique_file(folder: &Path, name: &str) -> Result<(File, PathBuf), GrabError> {
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = match (attempt, ext.is_empty()) {
            (0, _) => name.to_string(),
            (n, true) => format!("{}_{}", stem, n),
            (n, false) => format!("{}_{}.{}", stem, n, ext),
        };
        let path = folder.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(GrabError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free file name for {} in {}", name, folder.display()),
    )))
}

async fn write_body(file: &mut File, response: reqwest::Response) -> Result<u64, GrabError> {
    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for piece in chunk.chunks(CHUNK_SIZE) {
            if piece.is_empty() {
                continue;
            }
            file.write_all(piece).await?;
            written += piece.len() as u64;
        }
    }
    file.flush().await?;
    Ok(written)
}

/// GET `url` with `headers` and stream a 200 body into `folder`.
///
/// Anything but 200 is an error and leaves no file behind. A body that fails
/// mid-stream has its partial file removed.
pub async fn download_video(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    folder: &Path,
) -> Result<DownloadOutcome, GrabError> {
    info!("downloading video from {}", url);
    let response = client.get(url).headers(headers.clone()).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(GrabError::HttpStatus(status.as_u16()));
    }

    let name = timestamped_filename(Local::now());
    let (mut file, path) = create_unique_file(folder, &name).await?;

    match write_body(&mut file, response).await {
        Ok(bytes_written) => Ok(DownloadOutcome {
            path,
            bytes_written,
        }),
        Err(e) => {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!("could not remove partial file {}: {}", path.display(), rm);
            }
            Err(e)
        }
    }
}
