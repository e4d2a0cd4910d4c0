//! Dual-sink tracing setup: console gets INFO and above (overridable with
//! `RUST_LOG`), the log file only ever gets this program's ERROR records.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Target prefix shared by the library and the binary. Records from other
/// crates (chromiumoxide, hyper, ...) never reach the file sink.
pub const FILE_LOG_TARGET: &str = "review_grabber";

fn file_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(Targets::new().with_target(FILE_LOG_TARGET, LevelFilter::ERROR))
}

pub fn init_logging(log_file: &Path) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let (file, open_error) = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(f) => (Some(file_layer(Mutex::new(f))), None),
        Err(e) => (None, Some(e)),
    };

    let installed = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .is_ok();

    if installed {
        if let Some(e) = open_error {
            tracing::warn!(
                "could not open log file {}: {}; logging to console only",
                log_file.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_keeps_only_own_errors() {
        let path = std::env::temp_dir().join(format!(
            "review-grabber-log-{}.log",
            uuid::Uuid::new_v4()
        ));
        let file = std::fs::File::create(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(Mutex::new(file)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("product page loaded");
            tracing::warn!("download already in progress");
            tracing::error!("video download failed, response status 404");
            tracing::error!(target: "chromiumoxide::conn", "failed to deserialize WS response");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(contents.lines().count(), 1, "file sink got: {}", contents);
        assert!(contents.contains("response status 404"));
        assert!(contents.contains("ERROR"));
        assert!(!contents.contains("product page loaded"));
        assert!(!contents.contains("deserialize"));
    }
}
