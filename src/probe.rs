//! Install a service worker into a page and report whether it took control.

use std::sync::Arc;

use anyhow::{Context, Result};
use cdp_adapter::PageClient;
use serde::Serialize;
use tracing::info;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub url: String,
    pub scope: Option<String>,
    pub version_id: String,
    #[serde(rename = "scriptURL")]
    pub script_url: String,
    pub controlled_clients: Vec<String>,
    /// Whether the document of the second navigation was served by the worker.
    pub from_service_worker: bool,
}

/// Navigate to `page`, register `script`, wait for activation, then navigate again.
/// Fails if the worker reported uncaught errors along the way.
pub async fn run_probe(
    client: Arc<PageClient>,
    page: Option<&str>,
    script: &str,
    scope: Option<&str>,
) -> Result<ProbeReport> {
    client.navigate(page).await.context("initial navigation")?;

    let registered = client
        .register_service_worker(script, scope)
        .await
        .context("registering service worker")?;
    info!(script, scope = %registered, "service worker registered");

    let active = client
        .wait_for_activated(None)
        .await
        .context("waiting for activation")?;

    let second = client.navigate(page).await.context("controlled navigation")?;
    client.ensure_no_errors().context("service worker reported errors")?;

    let version = client
        .tracker()
        .version(&active.version_id)
        .unwrap_or(active);

    Ok(ProbeReport {
        url: second.url,
        scope: registered.as_str().map(str::to_string),
        version_id: version.version_id.to_string(),
        script_url: version.script_url,
        controlled_clients: version
            .controlled_clients
            .iter()
            .map(ToString::to_string)
            .collect(),
        from_service_worker: second
            .document
            .map(|doc| doc.response.from_service_worker)
            .unwrap_or(false),
    })
}
