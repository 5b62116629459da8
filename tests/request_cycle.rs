//! Request cycle properties: admission, fan-out, classification and accounting.

use async_trait::async_trait;
use cascade_node::downstream::{DependencyOutcome, DependencyResult, Downstream};
use cascade_node::resilience::ConcurrencyGate;
use cascade_node::telemetry::{OutcomeAggregator, OutcomeClass};
use cascade_node::work::{SyntheticWork, WorkCost, WorkReport};
use cascade_node::{CycleRequest, ServiceNode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Records every call and answers with a per-dependency scripted outcome.
#[derive(Default)]
struct ScriptedDownstream {
    outcomes: HashMap<String, DependencyOutcome>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDownstream {
    fn with(mut self, name: &str, outcome: DependencyOutcome) -> Self {
        self.outcomes.insert(name.to_string(), outcome);
        self
    }
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downstream for ScriptedDownstream {
    async fn call(&self, name: &str) -> DependencyResult {
        self.calls.lock().unwrap().push(name.to_string());
        let outcome = self
            .outcomes
            .get(name)
            .cloned()
            .unwrap_or(DependencyOutcome::Succeeded {
                body: format!("( {} ok )", name),
            });
        DependencyResult {
            name: name.to_string(),
            outcome,
        }
    }
}

#[derive(Default)]
struct CountingWork {
    runs: AtomicUsize,
}

impl SyntheticWork for CountingWork {
    fn run(&self, cost: WorkCost) -> WorkReport {
        self.runs.fetch_add(1, Ordering::SeqCst);
        WorkReport {
            elapsed: Duration::ZERO,
            label: format!("{:?}", cost),
        }
    }
}

/// Holds every request inside the dependency call until released.
struct BlockingDownstream {
    entered: AtomicUsize,
    release: Semaphore,
}

#[async_trait]
impl Downstream for BlockingDownstream {
    async fn call(&self, name: &str) -> DependencyResult {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        DependencyResult {
            name: name.to_string(),
            outcome: DependencyOutcome::Succeeded { body: "ok".into() },
        }
    }
}

struct Fixture {
    node: ServiceNode,
    gate: Arc<ConcurrencyGate>,
    aggregator: Arc<OutcomeAggregator>,
    work: Arc<CountingWork>,
    downstream: Arc<ScriptedDownstream>,
}

fn fixture(capacity: usize, downstream: ScriptedDownstream) -> Fixture {
    let gate = Arc::new(ConcurrencyGate::new(capacity));
    let aggregator = Arc::new(OutcomeAggregator::new());
    let work = Arc::new(CountingWork::default());
    let downstream = Arc::new(downstream);
    let node = ServiceNode::new(
        Arc::clone(&gate),
        Arc::clone(&aggregator),
        work.clone(),
        downstream.clone(),
    );
    Fixture {
        node,
        gate,
        aggregator,
        work,
        downstream,
    }
}

#[tokio::test]
async fn test_leaf_request_succeeds() {
    let f = fixture(1, ScriptedDownstream::default());
    let resp = f
        .node
        .handle_request(&CycleRequest::new("leaf").with_cost(WorkCost::Primes(100)))
        .await;

    assert_eq!(resp.outcome, OutcomeClass::Success);
    assert_eq!(resp.status, 200);
    assert!(resp.trace.starts_with("( leaf Primes(100) "));
    assert_eq!(f.work.runs.load(Ordering::SeqCst), 1);
    assert!(f.downstream.calls().is_empty());
    assert_eq!(f.gate.snapshot().in_use, 0);
}

#[tokio::test]
async fn test_non_success_dependency_fails_request() {
    let f = fixture(
        1,
        ScriptedDownstream::default().with("payments", DependencyOutcome::Status { code: 503 }),
    );
    let req = CycleRequest::new("frontend").with_dependencies(["payments"]);
    let resp = f.node.handle_request(&req).await;

    assert_eq!(resp.outcome, OutcomeClass::Failure);
    assert_eq!(resp.status, 500);
    assert!(resp.trace.contains("payments"));
    assert!(resp.trace.contains("503"));
    assert_eq!(f.gate.snapshot().in_use, 0);
}

#[tokio::test]
async fn test_transport_error_fails_request_with_quoted_text() {
    let f = fixture(
        1,
        ScriptedDownstream::default().with(
            "inventory",
            DependencyOutcome::Transport {
                error: "connection refused".into(),
            },
        ),
    );
    let req = CycleRequest::new("frontend").with_dependencies(["inventory"]);
    let resp = f.node.handle_request(&req).await;

    assert_eq!(resp.outcome, OutcomeClass::Failure);
    assert!(resp.trace.contains("\"connection refused\""));
}

#[tokio::test]
async fn test_failed_dependency_does_not_short_circuit_fanout() {
    let f = fixture(
        1,
        ScriptedDownstream::default().with("a", DependencyOutcome::Status { code: 500 }),
    );
    let req = CycleRequest::new("frontend").with_dependencies(["a", "", "b", "c"]);
    let resp = f.node.handle_request(&req).await;

    assert_eq!(f.downstream.calls(), vec!["a", "b", "c"]);
    assert_eq!(resp.dependencies.len(), 3);
    assert_eq!(resp.outcome, OutcomeClass::Failure);

    // Bodies of the successful dependencies still reach the trace, in order.
    let b = resp.trace.find("( b ok )").unwrap();
    let c = resp.trace.find("( c ok )").unwrap();
    assert!(b < c);
}

#[tokio::test]
async fn test_all_dependencies_succeeding_is_success() {
    let f = fixture(1, ScriptedDownstream::default());
    let req = CycleRequest::new("frontend").with_dependencies(["a", "b"]);
    let resp = f.node.handle_request(&req).await;

    assert_eq!(resp.outcome, OutcomeClass::Success);
    assert!(resp.trace.contains("( a ok ) ( b ok ) "));
}

#[tokio::test]
async fn test_denied_request_skips_work_and_fanout() {
    let f = fixture(0, ScriptedDownstream::default());
    let req = CycleRequest::new("frontend").with_dependencies(["a", "b"]);
    let resp = f.node.handle_request(&req).await;

    assert_eq!(resp.outcome, OutcomeClass::Overload);
    assert_eq!(resp.status, 503);
    assert_eq!(f.work.runs.load(Ordering::SeqCst), 0);
    assert!(f.downstream.calls().is_empty());
    assert_eq!(f.gate.snapshot().in_use, 0);
}

#[tokio::test]
async fn test_every_request_is_recorded_exactly_once() {
    let f = fixture(
        1,
        ScriptedDownstream::default().with("bad", DependencyOutcome::Status { code: 500 }),
    );
    f.node.handle_request(&CycleRequest::new("x")).await;
    f.node
        .handle_request(&CycleRequest::new("x").with_dependencies(["bad"]))
        .await;
    f.node.handle_request(&CycleRequest::new("x")).await;

    let window = f.aggregator.drain_and_reset();
    assert_eq!(window.get(OutcomeClass::Success).count, 2);
    assert_eq!(window.get(OutcomeClass::Failure).count, 1);
    assert_eq!(window.get(OutcomeClass::Overload).count, 0);
    assert_eq!(window.get(OutcomeClass::Timeout).count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_plus_one_concurrent_requests() {
    const CAPACITY: usize = 3;

    let gate = Arc::new(ConcurrencyGate::new(CAPACITY));
    let aggregator = Arc::new(OutcomeAggregator::new());
    let downstream = Arc::new(BlockingDownstream {
        entered: AtomicUsize::new(0),
        release: Semaphore::new(0),
    });
    let node = Arc::new(ServiceNode::new(
        Arc::clone(&gate),
        Arc::clone(&aggregator),
        Arc::new(CountingWork::default()),
        downstream.clone(),
    ));
    let req = Arc::new(CycleRequest::new("frontend").with_dependencies(["slow"]));

    let mut held = Vec::new();
    for _ in 0..CAPACITY {
        let node = Arc::clone(&node);
        let req = Arc::clone(&req);
        held.push(tokio::spawn(async move { node.handle_request(&req).await }));
    }
    while downstream.entered.load(Ordering::SeqCst) < CAPACITY {
        tokio::task::yield_now().await;
    }
    assert_eq!(gate.snapshot().in_use, CAPACITY);

    // The (N+1)th is shed while N are in flight.
    let shed = node.handle_request(&req).await;
    assert_eq!(shed.outcome, OutcomeClass::Overload);

    // Releasing one admitted request frees exactly one slot.
    downstream.release.add_permits(1);
    while gate.snapshot().in_use != CAPACITY - 1 {
        tokio::task::yield_now().await;
    }
    assert_eq!(gate.snapshot().available, 1);

    downstream.release.add_permits(CAPACITY - 1);
    for h in held {
        assert_eq!(h.await.unwrap().outcome, OutcomeClass::Success);
    }
    assert_eq!(gate.snapshot().in_use, 0);

    let window = aggregator.drain_and_reset();
    assert_eq!(window.get(OutcomeClass::Success).count, CAPACITY as u64);
    assert_eq!(window.get(OutcomeClass::Overload).count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gate_is_empty_after_concurrent_burst() {
    let f = fixture(4, ScriptedDownstream::default());
    let node = Arc::new(f.node);
    let req = Arc::new(CycleRequest::new("burst").with_dependencies(["a"]));

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let node = Arc::clone(&node);
            let req = Arc::clone(&req);
            tokio::spawn(async move { node.handle_request(&req).await.outcome })
        })
        .collect();

    let mut admitted = 0;
    let mut shed = 0;
    for h in handles {
        match h.await.unwrap() {
            OutcomeClass::Success => admitted += 1,
            OutcomeClass::Overload => shed += 1,
            other => panic!("unexpected outcome {other}"),
        }
    }

    assert_eq!(admitted + shed, 64);
    assert_eq!(f.gate.snapshot().in_use, 0);
    assert_eq!(f.aggregator.drain_and_reset().total_rate(), 64);
}
