//! Rate sinks: destinations for the per-interval total rate of one instance.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// One delivered rate report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateReport {
    pub service: String,
    pub instance: String,
    pub rate: u64,
}

/// Destination for aggregate rates.
///
/// Callers treat delivery as fire-and-forget: an `Err` is logged by the caller
/// and never affects request handling or aggregation.
#[async_trait]
pub trait RateSink: Send + Sync {
    async fn report_rate(&self, service: &str, instance: &str, rate: u64) -> Result<()>;
}

/// No-op sink, used when no collector is configured.
pub struct NoopRateSink;

#[async_trait]
impl RateSink for NoopRateSink {
    async fn report_rate(&self, _: &str, _: &str, _: u64) -> Result<()> {
        Ok(())
    }
}

/// Returns a no-op rate sink.
pub fn noop_sink() -> Arc<dyn RateSink> {
    Arc::new(NoopRateSink)
}

/// In-memory sink for testing.
#[derive(Default)]
pub struct InMemoryRateSink {
    reports: Mutex<Vec<RateReport>>,
}

impl InMemoryRateSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reports(&self) -> Vec<RateReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateSink for InMemoryRateSink {
    async fn report_rate(&self, service: &str, instance: &str, rate: u64) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RateReport {
                service: service.to_string(),
                instance: instance.to_string(),
                rate,
            });
        Ok(())
    }
}

/// Sink that pushes to the cluster metrics collector with
/// `GET {base}/service/{service}/pod/{instance}/qps/{rate}`.
pub struct HttpRateSink {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRateSink {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::configuration_with_context(
                "rate sink URL cannot carry a path",
                ErrorContext::new()
                    .with_field_path("metrics_url")
                    .with_details(base_url.to_string())
                    .with_source("rate_sink"),
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn report_url(&self, service: &str, instance: &str, rate: u64) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base URLs are rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "service",
                service,
                "pod",
                instance,
                "qps",
                rate.to_string().as_str(),
            ]);
        }
        url
    }
}

#[async_trait]
impl RateSink for HttpRateSink {
    async fn report_rate(&self, service: &str, instance: &str, rate: u64) -> Result<()> {
        let url = self.report_url(service, instance, rate);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::runtime_with_context(
                format!("non ok status reporting qps: {} ({})", body, status.as_u16()),
                ErrorContext::new().with_source("rate_sink"),
            ));
        }
        Ok(())
    }
}
