//! Outcome telemetry: per-class aggregation, exported gauges and rate reporting.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`OutcomeAggregator`] | Lock-guarded counters with atomic drain-and-reset |
//! | [`OutcomeGauges`] | Prometheus gauges refreshed on every drain |
//! | [`RateSink`] | Destination for the total rate of one instance |
//! | [`Reporter`] | Periodic drain task with explicit start/stop |
//!
//! ```rust
//! use cascade_node::telemetry::{OutcomeAggregator, OutcomeClass};
//! use std::time::Duration;
//!
//! let aggregator = OutcomeAggregator::new();
//! aggregator.record(OutcomeClass::Success, Duration::from_millis(100));
//! aggregator.record(OutcomeClass::Success, Duration::from_millis(300));
//!
//! let window = aggregator.drain_and_reset();
//! assert_eq!(window.get(OutcomeClass::Success).count, 2);
//! assert_eq!(window.get(OutcomeClass::Success).mean_latency_millis(), Some(200.0));
//! assert!(aggregator.drain_and_reset().is_empty());
//! ```

pub mod aggregator;
pub mod gauges;
pub mod reporter;
pub mod sink;

pub use aggregator::{OutcomeAggregator, OutcomeClass, OutcomeSnapshot, OutcomeTotals};
pub use gauges::OutcomeGauges;
pub use reporter::{Reporter, ReporterHandle};
pub use sink::{noop_sink, HttpRateSink, InMemoryRateSink, NoopRateSink, RateReport, RateSink};
