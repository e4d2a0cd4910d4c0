use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrabError {
    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page not ready: `{selector}` did not appear within {timeout_secs}s")]
    PageNotReady { selector: String, timeout_secs: u64 },

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A video that made it to disk.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// What a single trigger press ended up doing.
#[derive(Debug)]
pub enum TriggerOutcome {
    Saved(DownloadOutcome),
    NotFound,
    Busy,
}
