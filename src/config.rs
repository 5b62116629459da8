use crate::node::CycleRequest;
use crate::work::WorkCost;
use crate::{Error, ErrorContext, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkMode {
    /// No synthetic work.
    None,
    /// Spin a core for `--op-weight-ms`.
    Burn,
    /// Sieve primes below `--prime-limit`.
    Prime,
}

/// Node configuration. Every flag can also be set through its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "cascade-node", version, about = "Synthetic service node for cascading-failure experiments")]
pub struct NodeConfig {
    /// The name of this service.
    #[arg(long, env = "SERVICE_NAME", default_value = "default")]
    pub service_name: String,

    /// Instance identity reported to the rate sink; generated when unset.
    #[arg(long, env = "POD_NAME")]
    pub instance_name: Option<String>,

    /// Concurrent requests admitted before the node answers 503.
    #[arg(long, env = "OPS_LIMIT", default_value_t = 1)]
    pub ops_limit: usize,

    /// Comma-separated list of downstream service dependencies.
    #[arg(long, env = "DEPENDENCIES", default_value = "")]
    pub dependencies: String,

    #[arg(long, env = "WORK", value_enum, default_value_t = WorkMode::Prime)]
    pub work: WorkMode,

    /// CPU burn per request, in milliseconds (burn mode).
    #[arg(long, env = "OP_WEIGHT_MS", default_value_t = 0)]
    pub op_weight_ms: u64,

    /// Sieve bound (prime mode).
    #[arg(long, env = "PRIME_LIMIT", default_value_t = 8_000_000)]
    pub prime_limit: usize,

    /// Suffix of downstream addresses: http://{name}.{domain}
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = "cascade-example.svc.cluster.local")]
    pub cluster_domain: String,

    #[arg(long, env = "DOWNSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub downstream_timeout_secs: u64,

    /// Base URL of the rate collector, or "none" to disable reporting.
    #[arg(
        long,
        env = "METRICS_URL",
        default_value = "http://metrics.cascade-example.svc.cluster.local"
    )]
    pub metrics_url: String,

    #[arg(long, env = "REPORT_INTERVAL_MS", default_value_t = 1000)]
    pub report_interval_ms: u64,

    /// Operations per second to generate against this node.
    #[arg(long, env = "GENERATE_OPS", default_value_t = 0)]
    pub generate_ops: u32,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
}

impl NodeConfig {
    /// Validate and fill derived defaults (the instance name).
    pub fn finalize(mut self) -> Result<Self> {
        if self.report_interval_ms == 0 {
            return Err(invalid("report_interval_ms", "must be greater than 0"));
        }
        if self.downstream_timeout_secs == 0 {
            return Err(invalid("downstream_timeout_secs", "must be greater than 0"));
        }
        if self.cluster_domain.trim().is_empty() {
            return Err(invalid("cluster_domain", "must not be empty"));
        }
        if self.instance_name.as_deref().map_or(true, str::is_empty) {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            self.instance_name = Some(format!("{}-{}", self.service_name, &suffix[..8]));
        }
        Ok(self)
    }

    pub fn instance_name(&self) -> &str {
        self.instance_name.as_deref().unwrap_or(&self.service_name)
    }

    /// Dependency names with surrounding whitespace and empty entries removed.
    pub fn dependency_list(&self) -> Vec<String> {
        self.dependencies
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn work_cost(&self) -> WorkCost {
        match self.work {
            WorkMode::None => WorkCost::Idle,
            WorkMode::Burn => WorkCost::Burn(Duration::from_millis(self.op_weight_ms)),
            WorkMode::Prime => WorkCost::Primes(self.prime_limit),
        }
    }

    pub fn cycle_request(&self) -> CycleRequest {
        CycleRequest::new(self.service_name.clone())
            .with_dependencies(self.dependency_list())
            .with_cost(self.work_cost())
    }

    pub fn metrics_url(&self) -> Option<&str> {
        let url = self.metrics_url.trim();
        if url.is_empty() || url.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(url)
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_secs(self.downstream_timeout_secs)
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid {}", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config"),
    )
}
