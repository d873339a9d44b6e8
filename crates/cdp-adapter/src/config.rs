//! Browser launch and connection settings.

use frame_nav::NavConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use sw_lifecycle::LifecycleConfig;
use which::which;

/// Configuration for launching or connecting to Chromium.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    pub executable: PathBuf,
    /// Profile directory. A fresh temporary profile is used when unset.
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub default_deadline_ms: u64,
    /// Connect to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub no_sandbox: bool,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: None,
            headless: resolve_headless_default(),
            window_width: 640,
            window_height: 320,
            default_deadline_ms: 30_000,
            websocket_url: None,
            no_sandbox: flag_enabled("SWTK_DISABLE_SANDBOX"),
        }
    }
}

impl CdpConfig {
    /// Launch flags mirroring the harness's headless profile.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--disable-background-networking",
            "--disable-default-apps",
            "--disable-extensions",
            "--disable-sync",
            "--no-first-run",
            "--no-default-browser-check",
            "--remote-allow-origins=*",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        if self.headless {
            args.extend(
                ["--headless", "--disable-gpu", "--hide-scrollbars", "--mute-audio"]
                    .iter()
                    .map(|arg| arg.to_string()),
            );
        }
        args
    }
}

/// Settings shared by every tab client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fixture server root. Relative navigation targets resolve against it.
    pub root_url: String,
    pub navigation: NavConfig,
    pub lifecycle: LifecycleConfig,
    /// Flag lifecycle transitions that regress (logged, never enforced).
    pub audit_transitions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root_url: "http://localhost:4000".to_string(),
            navigation: NavConfig::default(),
            lifecycle: LifecycleConfig::default(),
            audit_transitions: true,
        }
    }
}

fn flag_enabled(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn resolve_headless_default() -> bool {
    match env::var("SWTK_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

/// Locate a Chrome/Chromium binary: `SWTK_CHROME`, then `PATH`, then well-known install paths.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("SWTK_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("SWTK_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    if skip_defaults {
        return None;
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .map(|root| PathBuf::from(root.trim()).join("Google/Chrome/Application/chrome.exe"))
            .collect()
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}
