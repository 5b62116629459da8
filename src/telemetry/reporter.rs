use super::aggregator::{OutcomeAggregator, OutcomeClass, OutcomeSnapshot};
use super::gauges::OutcomeGauges;
use super::sink::{noop_sink, RateSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodic drain of an [`OutcomeAggregator`].
///
/// Each flush drains the aggregator, refreshes the exported gauges and hands the
/// total rate to the [`RateSink`] on a detached task, so a slow or unreachable
/// collector never delays the next flush.
pub struct Reporter {
    service: String,
    instance: String,
    aggregator: Arc<OutcomeAggregator>,
    gauges: Option<OutcomeGauges>,
    sink: Arc<dyn RateSink>,
    interval: Duration,
}

impl Reporter {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(
        service: impl Into<String>,
        instance: impl Into<String>,
        aggregator: Arc<OutcomeAggregator>,
    ) -> Self {
        Self {
            service: service.into(),
            instance: instance.into(),
            aggregator,
            gauges: None,
            sink: noop_sink(),
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_gauges(mut self, gauges: OutcomeGauges) -> Self {
        self.gauges = Some(gauges);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RateSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drain one window. Must be called from within a tokio runtime.
    pub fn flush(&self) -> OutcomeSnapshot {
        let snapshot = self.aggregator.drain_and_reset();
        let total = snapshot.total_rate();
        tracing::debug!(
            service = %self.service,
            total,
            success = snapshot.get(OutcomeClass::Success).count,
            overload = snapshot.get(OutcomeClass::Overload).count,
            failure = snapshot.get(OutcomeClass::Failure).count,
            "drained outcome window"
        );

        let sink = Arc::clone(&self.sink);
        let service = self.service.clone();
        let instance = self.instance.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.report_rate(&service, &instance, total).await {
                tracing::warn!("error reporting qps: {}", e);
            }
        });

        if let Some(gauges) = &self.gauges {
            gauges.publish(&snapshot);
        }
        snapshot
    }

    /// Start flushing every interval until `cancel` fires or the handle is stopped.
    pub fn spawn(self, cancel: CancellationToken) -> ReporterHandle {
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.flush();
                    }
                }
            }
            tracing::debug!(service = %self.service, "outcome reporter stopped");
        });
        ReporterHandle { cancel, join }
    }
}

pub struct ReporterHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ReporterHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the periodic task and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!("outcome reporter task failed: {}", e);
        }
    }
}
