use super::aggregator::{OutcomeClass, OutcomeSnapshot};
use crate::Result;
use prometheus::{register_gauge_vec_with_registry, GaugeVec, Opts, Registry};

/// Exported gauges, one series per outcome class, labelled by status code.
///
/// - `{service}_qps{code}`: requests completed in the last interval
/// - `{service}_latency{code}`: mean latency (ms) in the last interval, 0 when idle
#[derive(Clone, Debug)]
pub struct OutcomeGauges {
    qps: GaugeVec,
    latency: GaugeVec,
}

impl OutcomeGauges {
    pub fn register(service: &str, registry: &Registry) -> Result<Self> {
        let subsystem = metric_subsystem(service);
        let qps = register_gauge_vec_with_registry!(
            Opts::new("qps", "Requests completed in the last reporting interval")
                .subsystem(subsystem.clone()),
            &["code"],
            registry
        )?;
        let latency = register_gauge_vec_with_registry!(
            Opts::new(
                "latency",
                "Mean request latency in milliseconds over the last reporting interval"
            )
            .subsystem(subsystem),
            &["code"],
            registry
        )?;
        Ok(Self { qps, latency })
    }

    pub fn publish(&self, snapshot: &OutcomeSnapshot) {
        for (class, totals) in snapshot.iter() {
            let code = class.status_code().to_string();
            self.qps
                .with_label_values(&[code.as_str()])
                .set(totals.rate() as f64);
            self.latency
                .with_label_values(&[code.as_str()])
                .set(totals.mean_latency_millis().unwrap_or(0.0));
        }
    }

    pub fn qps(&self, class: OutcomeClass) -> f64 {
        self.qps
            .with_label_values(&[class.status_code().to_string().as_str()])
            .get()
    }

    pub fn latency(&self, class: OutcomeClass) -> f64 {
        self.latency
            .with_label_values(&[class.status_code().to_string().as_str()])
            .get()
    }
}

/// Map a service name onto the metric-name alphabet `[a-zA-Z0-9_]`.
fn metric_subsystem(service: &str) -> String {
    let mut out: String = service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
