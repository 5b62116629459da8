//! # cascade-node
//!
//! Synthetic service node for reproducing cascading failures in a chain of
//! dependent services under load.
//!
//! ## Overview
//!
//! Each node accepts requests, spends a configurable amount of CPU, calls every
//! configured downstream node once, and classifies the request as success,
//! overload or failure. A downstream failure always becomes a local failure, so
//! overload at the bottom of a chain cascades upward.
//!
//! ## Key Features
//!
//! - **Admission control**: [`resilience::ConcurrencyGate`] sheds load once the
//!   configured concurrency is reached (503, never queued)
//! - **Outcome aggregation**: [`telemetry::OutcomeAggregator`] counts requests and
//!   latency per class, drained once per interval by [`telemetry::Reporter`]
//! - **Request cycle**: [`ServiceNode::handle_request`] ties admission, synthetic
//!   work, fan-out and classification together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cascade_node::downstream::HttpDownstream;
//! use cascade_node::resilience::ConcurrencyGate;
//! use cascade_node::telemetry::OutcomeAggregator;
//! use cascade_node::work::{CpuWork, WorkCost};
//! use cascade_node::{CycleRequest, ServiceNode};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> cascade_node::Result<()> {
//!     let node = ServiceNode::new(
//!         Arc::new(ConcurrencyGate::new(4)),
//!         Arc::new(OutcomeAggregator::new()),
//!         Arc::new(CpuWork),
//!         Arc::new(HttpDownstream::new("cascade-example.svc.cluster.local", Duration::from_secs(10))?),
//!     );
//!     let request = CycleRequest::new("frontend")
//!         .with_dependencies(["payments"])
//!         .with_cost(WorkCost::Primes(8_000_000));
//!
//!     let resp = node.handle_request(&request).await;
//!     println!("{} {}", resp.status, resp.trace);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Concurrency gate (load shedding) |
//! | [`telemetry`] | Outcome aggregation, gauges, rate reporting |
//! | [`node`] | The per-request state machine |
//! | [`work`] | Synthetic CPU work |
//! | [`downstream`] | Dependency calls |
//! | [`config`] | Command-line and environment configuration |
//! | [`server`] | HTTP binding |
//! | [`loadgen`] | Built-in load generator |

pub mod config;
pub mod downstream;
pub mod loadgen;
pub mod node;
pub mod resilience;
pub mod server;
pub mod telemetry;
pub mod work;

// Re-export main types for convenience
pub use config::NodeConfig;
pub use node::{CycleRequest, CycleResponse, ServiceNode};
pub use telemetry::{OutcomeAggregator, OutcomeClass};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
