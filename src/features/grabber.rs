//! The grabber workflow: open the product page, then turn every trigger
//! press into a scan of the network log and, on a match, a download.
//!
//! Every failure past browser launch is logged at ERROR and swallowed so
//! the tool keeps answering key presses.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdev::Key;
use reqwest::header::HeaderMap;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core::config::GrabberConfig;
use crate::core::types::{GrabError, TriggerOutcome};
use crate::features::download::{build_http_client, download_video, header_map};
use crate::features::hotkeys::{parse_key, HotkeyEvent, HotkeyListener};
use crate::scraping::browser_manager::{launch_session, BrowserSession};
use crate::scraping::network_log::NetworkLog;

/// Everything a trigger press needs. Shared with the spawned download tasks;
/// it never touches the browser directly, only the recorded network log.
pub struct TriggerHandler {
    network_log: NetworkLog,
    client: reqwest::Client,
    headers: HeaderMap,
    download_folder: PathBuf,
    video_load_delay: Duration,
    in_flight: Mutex<()>,
}

impl TriggerHandler {
    pub fn new(config: &GrabberConfig, network_log: NetworkLog) -> Result<Self, GrabError> {
        Ok(Self {
            network_log,
            client: build_http_client(config)?,
            headers: header_map(&config.request_headers)?,
            download_folder: config.download_folder.clone(),
            video_load_delay: config.video_load_delay,
            in_flight: Mutex::new(()),
        })
    }

    /// Wait for the player to request its segments, scan the log, download.
    /// A press that arrives while a download is running is reported as `Busy`.
    pub async fn try_download(&self) -> Result<TriggerOutcome, GrabError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return Ok(TriggerOutcome::Busy);
        };

        tokio::time::sleep(self.video_load_delay).await;

        let Some(url) = self.network_log.find_video_url().await else {
            return Ok(TriggerOutcome::NotFound);
        };

        let outcome =
            download_video(&self.client, &url, &self.headers, &self.download_folder).await?;
        Ok(TriggerOutcome::Saved(outcome))
    }

    /// Trigger-key entry point. Never returns an error.
    pub async fn download_current_video(&self) {
        match self.try_download().await {
            Ok(TriggerOutcome::Saved(outcome)) => info!(
                "video saved: {} ({} bytes)",
                outcome.path.display(),
                outcome.bytes_written
            ),
            Ok(TriggerOutcome::NotFound) => info!("primary video link not found"),
            Ok(TriggerOutcome::Busy) => warn!("download already in progress; trigger ignored"),
            Err(GrabError::HttpStatus(code)) => {
                error!("video download failed, response status {}", code)
            }
            Err(e) => error!("video download failed: {}", e),
        }
    }
}

/// Dispatch hotkey events until the exit key is pressed or `shutdown`
/// resolves. Downloads run as detached tasks and are abandoned on exit.
pub async fn monitor<F>(
    mut events: UnboundedReceiver<HotkeyEvent>,
    handler: Arc<TriggerHandler>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut listener_alive = true;

    loop {
        tokio::select! {
            event = events.recv(), if listener_alive => match event {
                Some(HotkeyEvent::Trigger) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.download_current_video().await;
                    });
                }
                Some(HotkeyEvent::Exit) => {
                    info!("exit key pressed");
                    break;
                }
                None => {
                    warn!("hotkey listener stopped; press Ctrl-C to exit");
                    listener_alive = false;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }
}

/// Run `work` unless `shutdown` resolves first.
async fn unless_shutdown<W, S>(work: W, shutdown: Pin<&mut S>) -> Option<W::Output>
where
    W: Future,
    S: Future<Output = ()>,
{
    tokio::select! {
        out = work => Some(out),
        _ = shutdown => None,
    }
}

pub struct Grabber {
    config: GrabberConfig,
    session: BrowserSession,
    handler: Arc<TriggerHandler>,
    trigger_key: Key,
    exit_key: Key,
}

impl Grabber {
    /// Create the download folder and launch the browser. Any error here is
    /// fatal to the program.
    pub async fn new(config: GrabberConfig) -> Result<Self, GrabError> {
        let trigger_key = parse_key(&config.trigger_key)
            .ok_or_else(|| GrabError::Config(format!("unknown key '{}'", config.trigger_key)))?;
        let exit_key = parse_key(&config.exit_key)
            .ok_or_else(|| GrabError::Config(format!("unknown key '{}'", config.exit_key)))?;

        tokio::fs::create_dir_all(&config.download_folder).await?;

        let session = launch_session(config.chrome_executable.as_deref()).await?;
        let handler = match TriggerHandler::new(&config, session.network_log.clone()) {
            Ok(h) => Arc::new(h),
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            config,
            session,
            handler,
            trigger_key,
            exit_key,
        })
    }

    async fn load_product_page(&self) -> Result<(), GrabError> {
        self.session.goto(&self.config.product_url).await?;
        tokio::time::sleep(self.config.page_load_delay).await;
        self.session
            .wait_for_selector(&self.config.ready_selector, self.config.ready_timeout)
            .await
    }

    /// Navigate and wait for the reviews to render. Failures are logged and
    /// the workflow carries on with whatever the page shows.
    pub async fn open_product_page(&self) {
        match self.load_product_page().await {
            Ok(()) => info!("product page loaded"),
            Err(e) => error!("failed to load product page: {}", e),
        }
    }

    /// Load the page, listen for hotkeys until exit, then close the browser.
    /// `shutdown` is honoured during the page load as well.
    pub async fn start_monitoring<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if unless_shutdown(self.open_product_page(), shutdown.as_mut())
            .await
            .is_none()
        {
            info!("shutdown requested while loading the product page");
            self.session.close().await;
            info!("program finished");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let listener = HotkeyListener::start(self.trigger_key, self.exit_key, tx);
        info!(
            "monitoring started. Press {} to download the open video, {} to exit.",
            self.config.trigger_key, self.config.exit_key
        );

        monitor(rx, Arc::clone(&self.handler), shutdown.as_mut()).await;

        listener.stop();
        self.session.close().await;
        info!("program finished");
    }
}
