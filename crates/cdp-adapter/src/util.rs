use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

const STDERR_PREVIEW_LINES: usize = 8;

/// Wait for Chromium to announce its DevTools websocket on stderr.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut preview = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(url) = devtools_url_from_line(&line) {
                return Ok(url);
            }
            if preview.len() < STDERR_PREVIEW_LINES {
                preview.push(line);
            }
        }
        Err(anyhow!(
            "chromium exited before exposing devtools websocket url. stderr preview: {}",
            preview.join(" | ")
        ))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for chromium devtools websocket url"))?
}

/// `DevTools listening on ws://...` → the browser websocket URL.
pub fn devtools_url_from_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}

/// Resolve a harness-relative target against the fixture server root.
///
/// Absolute `http(s)` URLs pass through unchanged. Anything else is appended to `root_url`,
/// so `"/sw.html"` and `"sw.html"` both land under the root.
pub fn resolve_target_url(root_url: &str, target: Option<&str>) -> Result<String> {
    let Some(target) = target.filter(|target| !target.is_empty()) else {
        return Ok(root_url.to_string());
    };
    if target.starts_with("http://") || target.starts_with("https://") {
        let parsed = url::Url::parse(target)?;
        return Ok(parsed.to_string());
    }
    let base = url::Url::parse(root_url)?;
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        target.trim_start_matches('/')
    );
    Ok(url::Url::parse(&joined)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_devtools_url() {
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc-123";
        assert_eq!(
            devtools_url_from_line(line).as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc-123")
        );
        assert!(devtools_url_from_line("[WARNING] listening on nothing").is_none());
    }

    #[test]
    fn resolves_relative_targets_against_root() {
        let root = "http://localhost:4000";
        assert_eq!(resolve_target_url(root, None).unwrap(), root);
        assert_eq!(
            resolve_target_url(root, Some("/sw.html")).unwrap(),
            "http://localhost:4000/sw.html"
        );
        assert_eq!(
            resolve_target_url("http://localhost:4000/", Some("sw.html")).unwrap(),
            "http://localhost:4000/sw.html"
        );
        assert_eq!(
            resolve_target_url(root, Some("https://example.com/a")).unwrap(),
            "https://example.com/a"
        );
    }
}
