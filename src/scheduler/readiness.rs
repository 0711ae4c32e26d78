use super::StartGate;
use crate::core::{Result, SyncError};
use crate::wms::WmsClient;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Attempt counter shown in probe failure logs wraps after this many attempts.
const ATTEMPT_WRAP: u32 = 5;

/// Downstream health check used to release the start gate.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<bool>;
    fn describe(&self) -> String;
}

/// `GET {BaseUrl}{HealthPath}`; any 2xx is healthy.
pub struct HttpHealthCheck {
    client: Client,
    url: String,
}

impl HttpHealthCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::Config(format!("build health check client: {err}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReadinessCheck for HttpHealthCheck {
    async fn check(&self) -> Result<bool> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| SyncError::Wms(format!("health check {}: {err}", self.url)))?;
        Ok(response.status().is_success())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Uses the WMS ping endpoint when no dedicated health URL is configured.
pub struct WmsPingCheck(pub Arc<dyn WmsClient>);

#[async_trait]
impl ReadinessCheck for WmsPingCheck {
    async fn check(&self) -> Result<bool> {
        self.0.ping().await
    }

    fn describe(&self) -> String {
        "WMS ping".to_string()
    }
}

/// Polls `check` every `interval` until it succeeds, then releases `gate`.
/// Returns `false` if cancelled before the downstream became healthy.
pub async fn run_readiness_probe(
    check: &dyn ReadinessCheck,
    gate: &StartGate,
    interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    let endpoint = check.describe();
    let mut attempt = 0u32;
    loop {
        if gate.is_open() {
            return true;
        }
        attempt = attempt % ATTEMPT_WRAP + 1;

        let healthy = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            result = check.check() => result,
        };
        match healthy {
            Ok(true) => {
                if gate.release() {
                    info!(endpoint = %endpoint, "downstream API healthy, starting file processing");
                }
                return true;
            }
            Ok(false) => warn!(
                endpoint = %endpoint,
                attempt,
                max_attempts = ATTEMPT_WRAP,
                "downstream API not healthy yet"
            ),
            Err(err) => warn!(
                endpoint = %endpoint,
                attempt,
                max_attempts = ATTEMPT_WRAP,
                error = %err,
                "downstream API unreachable"
            ),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
