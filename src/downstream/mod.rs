//! Downstream fan-out calls.
//!
//! A dependency call never fails with an [`Error`](crate::Error): every outcome,
//! including transport errors, is captured in a [`DependencyResult`] so the
//! request cycle can classify it and render it into the trace.

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyOutcome {
    /// Success status; body captured verbatim.
    Succeeded { body: String },
    /// The dependency answered with a non-success status.
    Status { code: u16 },
    /// Connection, timeout or other transport error.
    Transport { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResult {
    pub name: String,
    pub outcome: DependencyOutcome,
}

impl DependencyResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, DependencyOutcome::Succeeded { .. })
    }

    /// Text this dependency contributes to the request trace.
    pub fn trace_fragment(&self) -> String {
        match &self.outcome {
            DependencyOutcome::Succeeded { body } => format!("{} ", body),
            DependencyOutcome::Status { code } => format!("({} {})", self.name, code),
            DependencyOutcome::Transport { error } => format!("{:?} ", error),
        }
    }
}

/// One single-attempt call to a named dependency.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, name: &str) -> DependencyResult;
}

#[derive(Debug, Clone)]
enum Addressing {
    /// `http://{name}.{domain}/`
    ClusterDomain(String),
    /// `{base}/{name}`; every dependency served by one host.
    BaseUrl(Url),
}

/// HTTP dependency client with a fixed per-call timeout and no retries.
pub struct HttpDownstream {
    client: reqwest::Client,
    addressing: Addressing,
}

impl HttpDownstream {
    pub const DEFAULT_CLUSTER_DOMAIN: &'static str = "cascade-example.svc.cluster.local";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(cluster_domain: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            addressing: Addressing::ClusterDomain(cluster_domain.into()),
        })
    }

    /// Route every dependency to `{base}/{name}` instead of its cluster address.
    pub fn with_base_url_override(mut self, base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        self.addressing = Addressing::BaseUrl(base);
        Ok(self)
    }

    pub fn address(&self, name: &str) -> std::result::Result<Url, url::ParseError> {
        match &self.addressing {
            Addressing::ClusterDomain(domain) => Url::parse(&format!("http://{}.{}", name, domain)),
            Addressing::BaseUrl(base) => base.join(name),
        }
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(&self, name: &str) -> DependencyResult {
        let outcome = match self.address(name) {
            Err(e) => DependencyOutcome::Transport {
                error: format!("invalid address for {}: {}", name, e),
            },
            Ok(url) => match self.client.get(url).send().await {
                Err(e) => DependencyOutcome::Transport {
                    error: e.to_string(),
                },
                Ok(resp) if !resp.status().is_success() => DependencyOutcome::Status {
                    code: resp.status().as_u16(),
                },
                Ok(resp) => match resp.text().await {
                    Ok(body) => DependencyOutcome::Succeeded { body },
                    Err(e) => DependencyOutcome::Transport {
                        error: e.to_string(),
                    },
                },
            },
        };
        if let DependencyOutcome::Transport { error } = &outcome {
            tracing::debug!(dependency = name, %error, "dependency call failed");
        }
        DependencyResult {
            name: name.to_string(),
            outcome,
        }
    }
}
