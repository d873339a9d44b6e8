//! One browser plus its initial tab, torn down as a unit.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdp_adapter::{BrowserEnvironment, CdpTransport, ChromiumTransport, ClientConfig, PageClient};
use tracing::{info, warn};

use crate::config::HarnessConfig;

pub struct TestSession {
    environment: Arc<BrowserEnvironment>,
    client: Arc<PageClient>,
}

impl TestSession {
    /// Launch (or connect to) Chromium as configured and attach to its first tab.
    pub async fn launch(config: &HarnessConfig) -> Result<Self> {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(config.chrome.clone()));
        Self::with_transport(transport, config.client_config()).await
    }

    pub async fn with_transport(
        transport: Arc<dyn CdpTransport>,
        config: ClientConfig,
    ) -> Result<Self> {
        let environment = Arc::new(BrowserEnvironment::new(transport, config));
        let client = match environment.start().await {
            Ok(client) => client,
            Err(err) => {
                environment.shutdown().await;
                return Err(err).context("starting browser environment");
            }
        };
        info!(target_id = %client.target_id(), "test session ready");
        Ok(Self {
            environment,
            client,
        })
    }

    /// Client of the tab that is currently active.
    pub fn client(&self) -> Arc<PageClient> {
        self.environment
            .active_client()
            .unwrap_or_else(|_| Arc::clone(&self.client))
    }

    pub fn environment(&self) -> &Arc<BrowserEnvironment> {
        &self.environment
    }

    pub async fn shutdown(self) {
        for client in self.environment.clients() {
            if let Err(err) = client.close().await {
                warn!(target_id = %client.target_id(), %err, "failed to close tab");
            }
        }
        self.environment.shutdown().await;
    }

    /// Run `body` against the active tab, then tear the session down whatever the outcome.
    pub async fn run<F, Fut, T>(self, body: F) -> Result<T>
    where
        F: FnOnce(Arc<PageClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = body(self.client()).await;
        self.shutdown().await;
        outcome
    }
}
