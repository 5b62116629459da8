//! Built-in load generator: drives the node's own request cycle at a fixed rate.

use crate::node::{CycleRequest, ServiceNode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct LoadGenerator {
    node: Arc<ServiceNode>,
    request: Arc<CycleRequest>,
    ops_per_sec: u32,
}

impl LoadGenerator {
    pub fn new(node: Arc<ServiceNode>, request: Arc<CycleRequest>, ops_per_sec: u32) -> Self {
        Self {
            node,
            request,
            ops_per_sec,
        }
    }

    /// Tick period for a rate, clamped to at least 1ms; `None` when disabled.
    pub fn tick_interval(ops_per_sec: u32) -> Option<Duration> {
        if ops_per_sec == 0 {
            return None;
        }
        Some(Duration::from_millis((1000 / u64::from(ops_per_sec)).max(1)))
    }

    /// Spawn one request per tick until `cancel` fires. Requests are not
    /// awaited by the ticker, so slow cycles overlap like real clients.
    pub fn spawn(self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let period = Self::tick_interval(self.ops_per_sec)?;
        tracing::info!("generating {} ops/s", self.ops_per_sec);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let node = Arc::clone(&self.node);
                        let request = Arc::clone(&self.request);
                        tokio::spawn(async move {
                            let resp = node.handle_request(&request).await;
                            tracing::info!("{}", resp.trace);
                        });
                    }
                }
            }
        }))
    }
}
