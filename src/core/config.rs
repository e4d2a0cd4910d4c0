use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::types::GrabError;
use crate::features::hotkeys;

// ---------------------------------------------------------------------------
// File config — `review-grabber.json` with env-var fallback
// ---------------------------------------------------------------------------

pub const CONFIG_FILE_NAME: &str = "review-grabber.json";

pub const ENV_CONFIG_PATH: &str = "REVIEW_GRABBER_CONFIG";
pub const ENV_PRODUCT_URL: &str = "REVIEW_GRABBER_URL";
pub const ENV_DOWNLOAD_DIR: &str = "REVIEW_GRABBER_DOWNLOAD_DIR";
pub const ENV_PAGE_LOAD_DELAY: &str = "REVIEW_GRABBER_PAGE_LOAD_DELAY";
pub const ENV_VIDEO_LOAD_DELAY: &str = "REVIEW_GRABBER_VIDEO_LOAD_DELAY";
pub const ENV_LOG_FILE: &str = "REVIEW_GRABBER_LOG_FILE";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_PRODUCT_URL: &str =
    "https://www.wildberries.ru/catalog/192186031/feedbacks?imtId=183532775&size=31";
pub const DEFAULT_DOWNLOAD_FOLDER: &str = "wb_videos";
pub const DEFAULT_LOG_FILE: &str = "wb_downloader.log";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://www.wildberries.ru/";
pub const DEFAULT_READY_SELECTOR: &str = ".feedback__content";

const DEFAULT_PAGE_LOAD_DELAY_SECS: u64 = 5;
const DEFAULT_VIDEO_LOAD_DELAY_SECS: u64 = 2;
const DEFAULT_READY_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Raw shape of `review-grabber.json`. Every field is optional; absent fields
/// fall back to env vars, then to built-in defaults.
#[derive(Deserialize, Default, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub product_url: Option<String>,
    pub download_folder: Option<PathBuf>,
    /// Merged over the default `User-Agent` / `Referer` pair.
    pub request_headers: BTreeMap<String, String>,
    pub page_load_delay_secs: Option<u64>,
    pub video_load_delay_secs: Option<u64>,
    pub ready_selector: Option<String>,
    pub ready_timeout_secs: Option<u64>,
    pub trigger_key: Option<String>,
    pub exit_key: Option<String>,
    pub log_file: Option<PathBuf>,
    pub chrome_executable: Option<String>,
    /// Whole-request timeout. Unset by default: video bodies can be large.
    pub http_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

/// Where the file config came from, kept so it can be logged once the
/// subscriber is installed.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Invalid { path: PathBuf, error: String },
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                tracing::info!("{} loaded from {}", CONFIG_FILE_NAME, path.display())
            }
            ConfigSource::Invalid { path, error } => tracing::warn!(
                "{} parse error at {}: {}; using defaults",
                CONFIG_FILE_NAME,
                path.display(),
                error
            ),
            ConfigSource::Defaults => {
                tracing::info!("no {} found; using env vars and defaults", CONFIG_FILE_NAME)
            }
        }
    }
}

/// Load `review-grabber.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `explicit` (the `--config` flag)
/// 2. `REVIEW_GRABBER_CONFIG` env var path
/// 3. `./review-grabber.json`
/// 4. `../review-grabber.json`
///
/// Missing file → defaults. Parse error → defaults, reported via [`ConfigSource::Invalid`].
pub fn load_file_config(explicit: Option<&Path>) -> (FileConfig, ConfigSource) {
    load_first(config_candidates(explicit))
}

fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(p) = explicit {
        candidates.push(p.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        if !env_path.trim().is_empty() {
            candidates.push(PathBuf::from(env_path));
        }
    }
    candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    candidates.push(Path::new("..").join(CONFIG_FILE_NAME));
    candidates
}

/// The first readable candidate decides; unreadable ones are skipped.
fn load_first(candidates: impl IntoIterator<Item = PathBuf>) -> (FileConfig, ConfigSource) {
    for path in candidates {
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        return match serde_json::from_str::<FileConfig>(&contents) {
            Ok(cfg) => (cfg, ConfigSource::File(path)),
            Err(e) => (
                FileConfig::default(),
                ConfigSource::Invalid {
                    path,
                    error: e.to_string(),
                },
            ),
        };
    }

    (FileConfig::default(), ConfigSource::Defaults)
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct GrabberConfig {
    pub product_url: String,
    pub download_folder: PathBuf,
    pub request_headers: BTreeMap<String, String>,
    pub page_load_delay: Duration,
    pub video_load_delay: Duration,
    pub ready_selector: String,
    pub ready_timeout: Duration,
    pub trigger_key: String,
    pub exit_key: String,
    pub log_file: PathBuf,
    pub chrome_executable: Option<String>,
    pub http_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self::resolve_with(FileConfig::default(), |_| None)
    }
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string()),
        ("Referer".to_string(), DEFAULT_REFERER.to_string()),
    ])
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl GrabberConfig {
    /// Resolve against the process environment.
    pub fn resolve(file: FileConfig) -> Self {
        Self::resolve_with(file, |k| std::env::var(k).ok())
    }

    /// Resolve each field as JSON value → env var → default. `env` is injected
    /// so tests don't have to mutate the process environment.
    pub fn resolve_with(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_secs = |key: &str| env(key).and_then(|v| v.trim().parse::<u64>().ok());

        let product_url = non_empty(file.product_url)
            .or_else(|| non_empty(env(ENV_PRODUCT_URL)))
            .unwrap_or_else(|| DEFAULT_PRODUCT_URL.to_string());

        let download_folder = file
            .download_folder
            .or_else(|| non_empty(env(ENV_DOWNLOAD_DIR)).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_FOLDER));

        let mut request_headers = default_headers();
        request_headers.extend(file.request_headers);

        let page_load_delay = file
            .page_load_delay_secs
            .or_else(|| env_secs(ENV_PAGE_LOAD_DELAY))
            .unwrap_or(DEFAULT_PAGE_LOAD_DELAY_SECS);
        let video_load_delay = file
            .video_load_delay_secs
            .or_else(|| env_secs(ENV_VIDEO_LOAD_DELAY))
            .unwrap_or(DEFAULT_VIDEO_LOAD_DELAY_SECS);

        let log_file = file
            .log_file
            .or_else(|| non_empty(env(ENV_LOG_FILE)).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        let chrome_executable =
            non_empty(file.chrome_executable).or_else(|| non_empty(env(ENV_CHROME_EXECUTABLE)));

        Self {
            product_url,
            download_folder,
            request_headers,
            page_load_delay: Duration::from_secs(page_load_delay),
            video_load_delay: Duration::from_secs(video_load_delay),
            ready_selector: non_empty(file.ready_selector)
                .unwrap_or_else(|| DEFAULT_READY_SELECTOR.to_string()),
            ready_timeout: Duration::from_secs(
                file.ready_timeout_secs.unwrap_or(DEFAULT_READY_TIMEOUT_SECS),
            ),
            trigger_key: non_empty(file.trigger_key).unwrap_or_else(|| "F4".to_string()),
            exit_key: non_empty(file.exit_key).unwrap_or_else(|| "Escape".to_string()),
            log_file,
            chrome_executable,
            http_timeout: file.http_timeout_secs.map(Duration::from_secs),
            connect_timeout: Duration::from_secs(
                file.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        }
    }

    /// Apply command-line overrides on top of the resolved values.
    pub fn apply_cli(mut self, args: &CliArgs) -> Self {
        if let Some(url) = &args.url {
            self.product_url = url.clone();
        }
        if let Some(out) = &args.out {
            self.download_folder = out.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<(), GrabError> {
        let parsed = url::Url::parse(&self.product_url)
            .map_err(|e| GrabError::Config(format!("product_url '{}': {}", self.product_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GrabError::Config(format!(
                "product_url must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        if self.ready_selector.trim().is_empty() {
            return Err(GrabError::Config("ready_selector is empty".to_string()));
        }
        for (field, name) in [("trigger_key", &self.trigger_key), ("exit_key", &self.exit_key)] {
            if hotkeys::parse_key(name).is_none() {
                return Err(GrabError::Config(format!("{} '{}' is not a known key", field, name)));
            }
        }
        if self.trigger_key.eq_ignore_ascii_case(&self.exit_key) {
            return Err(GrabError::Config(
                "trigger_key and exit_key must differ".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub url: Option<String>,
    pub out: Option<PathBuf>,
    pub setup: bool,
}

impl CliArgs {
    pub fn from_env() -> Self {
        Self::parse_from(std::env::args().skip(1))
    }

    /// Accepts `--flag value` and `--flag=value`. Unknown arguments are ignored.
    pub fn parse_from(args: impl IntoIterator<Item = String>) -> Self {
        let mut out = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(a) = args.next() {
            if a == "--setup" {
                out.setup = true;
                continue;
            }
            let (flag, inline) = match a.split_once('=') {
                Some((f, v)) => (f.to_string(), Some(v.to_string())),
                None => (a, None),
            };
            if !matches!(flag.as_str(), "--config" | "--url" | "--out") {
                continue;
            }
            let Some(value) = inline.or_else(|| args.next()) else {
                break;
            };
            match flag.as_str() {
                "--config" => out.config = Some(PathBuf::from(value)),
                "--url" => out.url = Some(value),
                "--out" => out.out = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        out
    }
}
