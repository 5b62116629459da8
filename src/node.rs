//! The request cycle of one service node.
//!
//! ```text
//! Start -> AdmissionCheck -> Denied   -> Classify(Overload) -> Record -> Respond
//!                         -> Admitted -> SyntheticWork -> Fanout -> Classify
//!                                     -> Record -> Respond -> Released
//! ```
//!
//! Admission is held as a [`GatePermit`](crate::resilience::GatePermit) for the
//! whole admitted path, so the slot is released exactly once on every exit.

use crate::downstream::{DependencyResult, Downstream};
use crate::resilience::ConcurrencyGate;
use crate::telemetry::{OutcomeAggregator, OutcomeClass};
use crate::work::{SyntheticWork, WorkCost, WorkReport};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inputs of one request: who we are, whom we call, and what the work costs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRequest {
    pub service: String,
    pub dependencies: Vec<String>,
    pub cost: WorkCost,
}

impl CycleRequest {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            dependencies: Vec::new(),
            cost: WorkCost::Idle,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cost(mut self, cost: WorkCost) -> Self {
        self.cost = cost;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CycleResponse {
    /// Human-readable trace of the whole cycle.
    pub trace: String,
    pub status: u16,
    pub outcome: OutcomeClass,
    pub work: Option<WorkReport>,
    pub dependencies: Vec<DependencyResult>,
    pub elapsed: Duration,
}

/// Shared state and collaborators of one node.
///
/// Gate and aggregator are process-wide and injected, so several handlers (the
/// HTTP binding and the load generator) share the same admission budget and
/// the same outcome window.
pub struct ServiceNode {
    gate: Arc<ConcurrencyGate>,
    aggregator: Arc<OutcomeAggregator>,
    work: Arc<dyn SyntheticWork>,
    downstream: Arc<dyn Downstream>,
}

impl ServiceNode {
    pub fn new(
        gate: Arc<ConcurrencyGate>,
        aggregator: Arc<OutcomeAggregator>,
        work: Arc<dyn SyntheticWork>,
        downstream: Arc<dyn Downstream>,
    ) -> Self {
        Self {
            gate,
            aggregator,
            work,
            downstream,
        }
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    pub fn aggregator(&self) -> &Arc<OutcomeAggregator> {
        &self.aggregator
    }

    pub async fn handle_request(&self, request: &CycleRequest) -> CycleResponse {
        let start = Instant::now();
        let mut trace = format!("( {} ", request.service);

        let Some(_permit) = self.gate.enter() else {
            return self.finish(start, trace, OutcomeClass::Overload, None, Vec::new());
        };

        // A failed work step still fans out: every dependency of an admitted
        // request is attempted once.
        let work = self.run_work(request.cost).await;
        match &work {
            Some(report) => {
                trace.push_str(&format!("{} {:?} ", report.label, report.elapsed));
            }
            None => trace.push_str("aborted "),
        }

        // Sequential and unconditional: every dependency is attempted once.
        let mut dependencies = Vec::with_capacity(request.dependencies.len());
        for name in request.dependencies.iter().filter(|n| !n.is_empty()) {
            let result = self.downstream.call(name).await;
            trace.push_str(&result.trace_fragment());
            dependencies.push(result);
        }

        let outcome = if work.is_some() && dependencies.iter().all(DependencyResult::succeeded) {
            OutcomeClass::Success
        } else {
            OutcomeClass::Failure
        };
        self.finish(start, trace, outcome, work, dependencies)
        // _permit dropped here, after the outcome is recorded
    }

    /// `None` when the work panicked or was cancelled on the blocking pool.
    async fn run_work(&self, cost: WorkCost) -> Option<WorkReport> {
        let work = Arc::clone(&self.work);
        match tokio::task::spawn_blocking(move || work.run(cost)).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("synthetic work aborted: {}", e);
                None
            }
        }
    }

    fn finish(
        &self,
        start: Instant,
        mut trace: String,
        outcome: OutcomeClass,
        work: Option<WorkReport>,
        dependencies: Vec<DependencyResult>,
    ) -> CycleResponse {
        let elapsed = start.elapsed();
        self.aggregator.record(outcome, elapsed);

        let status = outcome.status_code();
        trace.push_str(&format!("{:?} {} )", elapsed, status));
        CycleResponse {
            trace,
            status,
            outcome,
            work,
            dependencies,
            elapsed,
        }
    }
}
