//! Contract tests against a real Chromium. Ignored by default.
//!
//! ```bash
//! SWTK_CDP_CONTRACT=1 SWTK_CHROME=/usr/bin/chromium \
//!     cargo test -p cdp-adapter --test cdp_contract -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;

use cdp_adapter::{
    BrowserEnvironment, CdpConfig, CdpTransport, ChromiumTransport, ClientConfig, CommandTarget,
};
use serde_json::json;
use tempfile::TempDir;

fn contract_enabled() -> bool {
    env::var("SWTK_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn test_config() -> (CdpConfig, TempDir) {
    let profile = tempfile::tempdir().expect("create temporary chrome profile");
    let cfg = CdpConfig {
        headless: true,
        user_data_dir: Some(profile.path().into()),
        ..CdpConfig::default()
    };
    (cfg, profile)
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set SWTK_CDP_CONTRACT=1"]
async fn contract_browser_version() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (SWTK_CDP_CONTRACT not enabled)");
        return;
    }

    let (cfg, _profile) = test_config();
    let transport = ChromiumTransport::new(cfg);
    transport.start().await.expect("start transport");
    let version = transport
        .send_command(CommandTarget::Browser, "Browser.getVersion", json!({}))
        .await
        .expect("Browser.getVersion");
    assert!(version.get("product").is_some());
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set SWTK_CDP_CONTRACT=1"]
async fn contract_commit_only_navigation() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (SWTK_CDP_CONTRACT not enabled)");
        return;
    }

    let (cfg, _profile) = test_config();
    let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg));
    let env = Arc::new(BrowserEnvironment::new(transport, ClientConfig::default()));
    let client = env.start().await.expect("start environment");
    let result = client
        .navigate(Some("https://example.com/"))
        .await
        .expect("navigate");
    assert_eq!(result.url, "https://example.com/");
    assert!(result.document.is_some());
    env.shutdown().await;
}
