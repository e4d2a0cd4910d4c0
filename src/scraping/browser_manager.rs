//! Native browser management using `chromiumoxide`.
//!
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Launching the visible, maximized browser session the grabber drives.
//! * Waiting for a CSS selector to show up on the page.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::config::ENV_CHROME_EXECUTABLE;
use crate::core::types::GrabError;
use crate::scraping::network_log::NetworkLog;

const PATH_CANDIDATES: &[&str] = &[
    "brave-browser",
    "brave",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `explicit` (config file `chrome_executable`)
/// 2. `CHROME_EXECUTABLE` env var
/// 3. PATH scan – finds package-manager installs on all platforms.
/// 4. OS-specific well-known install paths.
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
        warn!("configured browser not found at {}; falling back to discovery", p);
    }

    if let Ok(p) = std::env::var(ENV_CHROME_EXECUTABLE) {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    for exe in PATH_CANDIDATES {
        if let Ok(full) = which::which(exe) {
            return Some(full.to_string_lossy().to_string());
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Session config ───────────────────────────────────────────────────────────

/// Flags the grabber needs: a headed window that opens maximized, with
/// sandboxing and GPU acceleration turned off.
pub const SESSION_ARGS: &[&str] = &["--start-maximized", "--no-sandbox", "--disable-gpu"];

pub fn build_session_config(exe: &str) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .with_head()
        // Let the window decide its size so `--start-maximized` takes effect.
        .viewport(None::<Viewport>);

    for arg in SESSION_ARGS {
        builder = builder.arg(*arg);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A running browser with one tab whose network traffic is being recorded.
pub struct BrowserSession {
    browser: Browser,
    pub page: Page,
    pub network_log: NetworkLog,
    tasks: Vec<JoinHandle<()>>,
}

/// Launch the browser, open a blank tab and start recording its network log
/// before anything is navigated.
pub async fn launch_session(explicit_exe: Option<&str>) -> Result<BrowserSession, GrabError> {
    let exe = find_chrome_executable(explicit_exe).ok_or_else(|| {
        GrabError::BrowserLaunchFailed(
            "No browser found. Install Brave, Chrome, or Chromium. Set CHROME_EXECUTABLE if installed in a non-standard location."
                .to_string(),
        )
    })?;

    info!("launching browser session ({})", exe);
    let config =
        build_session_config(&exe).map_err(|e| GrabError::BrowserLaunchFailed(e.to_string()))?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| GrabError::BrowserLaunchFailed(format!("{}: {}", exe, e)))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    let setup: Result<(Page, NetworkLog, Vec<JoinHandle<()>>)> = async {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create page: {}", e))?;
        let network_log = NetworkLog::new();
        let listeners = network_log.attach(&page).await?;
        Ok((page, network_log, listeners))
    }
    .await;

    match setup {
        Ok((page, network_log, mut tasks)) => {
            tasks.push(handler_task);
            Ok(BrowserSession {
                browser,
                page,
                network_log,
                tasks,
            })
        }
        Err(e) => {
            browser.close().await.ok();
            handler_task.abort();
            Err(GrabError::BrowserLaunchFailed(e.to_string()))
        }
    }
}

impl BrowserSession {
    pub async fn goto(&self, url: &str) -> Result<(), GrabError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| GrabError::Navigation(e.to_string()))?;
        Ok(())
    }

    /// Poll for `selector` every 250 ms until it exists or `timeout` elapses.
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), GrabError> {
        wait_for_selector(&self.page, selector, timeout).await
    }

    /// Close the browser and stop the background CDP tasks.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("browser session closed");
    }
}

pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> Result<(), GrabError> {
    let poll = Duration::from_millis(250);
    let found = tokio::time::timeout(timeout, async {
        loop {
            if page.find_element(selector).await.is_ok() {
                return;
            }
            tokio::time::sleep(poll).await;
        }
    })
    .await;

    found.map_err(|_| GrabError::PageNotReady {
        selector: selector.to_string(),
        timeout_secs: timeout.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_args() {
        assert!(SESSION_ARGS.contains(&"--start-maximized"));
        assert!(SESSION_ARGS.contains(&"--no-sandbox"));
        assert!(SESSION_ARGS.contains(&"--disable-gpu"));
    }

    #[test]
    fn test_missing_explicit_executable_falls_back() {
        let found = find_chrome_executable(Some("/definitely/not/a/browser"));
        assert_ne!(found.as_deref(), Some("/definitely/not/a/browser"));
    }
}
