//! Pre-flight checklist: run with `--setup` for the full report, or read the
//! one-line summary logged at startup.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::config::GrabberConfig;
use crate::features::hotkeys::parse_key;
use crate::scraping::browser_manager::find_chrome_executable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl CheckStatus {
    pub fn is_fail(self) -> bool {
        matches!(self, CheckStatus::Fail)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionRequired {
    pub title: String,
    pub steps: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupCheck {
    pub id: String,
    pub title: String,
    pub status: CheckStatus,
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRequired>,
}

impl SetupCheck {
    fn new(id: &str, title: &str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            status,
            details: details.into(),
            actions: vec![],
        }
    }

    fn with_action(mut self, title: &str, steps: &[&str]) -> Self {
        self.actions.push(ActionRequired {
            title: title.to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetupReport {
    pub checks: Vec<SetupCheck>,
}

impl SetupReport {
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_fail())
    }

    pub fn summarize_for_logs(&self) -> String {
        let mut pass = 0;
        let mut warn_count = 0;
        let mut fail = 0;
        let mut skip = 0;
        for c in &self.checks {
            match c.status {
                CheckStatus::Pass => pass += 1,
                CheckStatus::Warn => warn_count += 1,
                CheckStatus::Fail => fail += 1,
                CheckStatus::Skip => skip += 1,
            }
        }
        format!(
            "setup: {} pass, {} warn, {} fail, {} skip",
            pass, warn_count, fail, skip
        )
    }

    pub fn print_action_required_blocks(&self) {
        for check in &self.checks {
            if check.actions.is_empty() {
                continue;
            }

            warn!(
                "\n=== ACTION REQUIRED: {} ===\n{}\n",
                check.title, check.details
            );
            for action in &check.actions {
                eprintln!("- {}", action.title);
                for step in &action.steps {
                    eprintln!("  • {}", step);
                }
                eprintln!();
            }
        }
    }
}

impl fmt::Display for SetupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "review-grabber pre-flight checklist")?;
        writeln!(f, "{}", "=".repeat(35))?;
        for c in &self.checks {
            writeln!(
                f,
                "[{:<4}] {}\n  {}",
                match c.status {
                    CheckStatus::Pass => "OK",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                    CheckStatus::Skip => "SKIP",
                },
                c.title,
                c.details.replace('\n', "\n  ")
            )?;
            for action in &c.actions {
                writeln!(f, "  Action: {}", action.title)?;
                for step in &action.steps {
                    writeln!(f, "    - {}", step)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub async fn check_all(config: &GrabberConfig) -> SetupReport {
    let mut report = SetupReport::default();

    report
        .checks
        .push(check_browser_installed(config.chrome_executable.as_deref()));
    report
        .checks
        .push(check_download_folder(&config.download_folder));
    report.checks.push(check_hotkeys(config));
    report.checks.push(check_display_env());
    report
        .checks
        .push(check_target_reachable(&config.product_url).await);

    report
}

fn check_browser_installed(explicit: Option<&str>) -> SetupCheck {
    const TITLE: &str = "Browser dependency (Brave/Chrome/Chromium)";
    match find_chrome_executable(explicit) {
        Some(exe) => SetupCheck::new(
            "browser_installed",
            TITLE,
            CheckStatus::Pass,
            format!("Using {}", exe),
        ),
        None => SetupCheck::new(
            "browser_installed",
            TITLE,
            CheckStatus::Fail,
            "No Brave/Chrome/Chromium executable found on PATH (or common install locations).",
        )
        .with_action(
            "Install Brave/Chrome/Chromium",
            &[
                "Ubuntu/Debian: `sudo apt-get update && sudo apt-get install -y chromium`",
                "Fedora: `sudo dnf install -y chromium`",
                "macOS / Windows: install Google Chrome from https://www.google.com/chrome/",
                "Or point CHROME_EXECUTABLE at an existing binary.",
            ],
        ),
    }
}

fn check_download_folder(folder: &Path) -> SetupCheck {
    const TITLE: &str = "Download folder";
    if let Err(e) = std::fs::create_dir_all(folder) {
        return SetupCheck::new(
            "download_folder",
            TITLE,
            CheckStatus::Fail,
            format!("Failed to create {}: {}", folder.display(), e),
        )
        .with_action(
            "Fix permissions",
            &["Create the folder manually or choose another one with --out."],
        );
    }

    let probe = folder.join(".write_test");
    if let Err(e) = std::fs::write(&probe, b"ok") {
        return SetupCheck::new(
            "download_folder",
            TITLE,
            CheckStatus::Fail,
            format!("Directory not writable: {} ({})", folder.display(), e),
        )
        .with_action(
            "Fix directory permissions",
            &["Ensure the user running review-grabber can write to the folder."],
        );
    }
    let _ = std::fs::remove_file(&probe);

    SetupCheck::new(
        "download_folder",
        TITLE,
        CheckStatus::Pass,
        format!("Writable: {}", folder.display()),
    )
}

fn check_hotkeys(config: &GrabberConfig) -> SetupCheck {
    const TITLE: &str = "Hotkeys";
    let unknown: Vec<&str> = [config.trigger_key.as_str(), config.exit_key.as_str()]
        .into_iter()
        .filter(|k| parse_key(k).is_none())
        .collect();

    if !unknown.is_empty() {
        return SetupCheck::new(
            "hotkeys",
            TITLE,
            CheckStatus::Fail,
            format!("Unknown key name(s): {}", unknown.join(", ")),
        )
        .with_action(
            "Use a supported key name",
            &["F1-F12, Escape, Space, Enter, Tab, Pause, Insert, Delete, Home, End, PageUp, PageDown, a-z, 0-9"],
        );
    }

    SetupCheck::new(
        "hotkeys",
        TITLE,
        CheckStatus::Pass,
        format!(
            "Trigger: {}, exit: {}",
            config.trigger_key, config.exit_key
        ),
    )
}

#[cfg(all(unix, not(target_os = "macos")))]
fn check_display_env() -> SetupCheck {
    const TITLE: &str = "Global keyboard hook (X11)";
    let display = std::env::var("DISPLAY").ok().filter(|v| !v.is_empty());
    let wayland = std::env::var("WAYLAND_DISPLAY").ok().filter(|v| !v.is_empty());

    match (display, wayland) {
        (Some(d), _) => SetupCheck::new(
            "display_env",
            TITLE,
            CheckStatus::Pass,
            format!("DISPLAY={}", d),
        ),
        (None, Some(_)) => SetupCheck::new(
            "display_env",
            TITLE,
            CheckStatus::Warn,
            "Wayland session without XWayland DISPLAY; global hotkeys may not fire.",
        )
        .with_action(
            "Run under X11 or XWayland",
            &["Log in with an X11 session, or make sure DISPLAY is exported."],
        ),
        (None, None) => SetupCheck::new(
            "display_env",
            TITLE,
            CheckStatus::Fail,
            "No DISPLAY detected; the headed browser and global hotkeys need a desktop session.",
        ),
    }
}

#[cfg(target_os = "macos")]
fn check_display_env() -> SetupCheck {
    SetupCheck::new(
        "display_env",
        "Global keyboard hook (Accessibility)",
        CheckStatus::Warn,
        "Global hotkeys need Accessibility permission for the launching terminal.",
    )
    .with_action(
        "Enable Accessibility permissions",
        &[
            "Open System Settings → Privacy & Security → Accessibility",
            "Enable the toggle for your terminal app and restart it",
        ],
    )
}

#[cfg(not(unix))]
fn check_display_env() -> SetupCheck {
    SetupCheck::new(
        "display_env",
        "Global keyboard hook",
        CheckStatus::Skip,
        "No extra requirements on this platform.",
    )
}

async fn check_target_reachable(url: &str) -> SetupCheck {
    const TITLE: &str = "Product page reachable";
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return SetupCheck::new(
                "target_reachable",
                TITLE,
                CheckStatus::Warn,
                format!("Failed to construct HTTP client: {}", e),
            );
        }
    };

    match client.get(url).send().await {
        Ok(resp) => SetupCheck::new(
            "target_reachable",
            TITLE,
            if resp.status().is_success() {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
            format!("{} returned status {}.", url, resp.status()),
        ),
        Err(e) => SetupCheck::new(
            "target_reachable",
            TITLE,
            CheckStatus::Warn,
            format!("Request to {} failed: {}", url, e),
        ),
    }
}
