//! Admission control for the service node.
//!
//! The only resilience primitive here is a hard concurrency gate: once the
//! configured number of requests is in flight, further requests are shed
//! immediately instead of being queued.
//!
//! ```rust
//! use cascade_node::resilience::ConcurrencyGate;
//!
//! let gate = ConcurrencyGate::new(1);
//! {
//!     let _permit = gate.enter().expect("first request is admitted");
//!     assert!(gate.enter().is_none()); // shed
//! }
//! assert!(gate.enter().is_some()); // slot released on drop
//! ```

pub mod concurrency_gate;

pub use concurrency_gate::{ConcurrencyGate, GatePermit, GateSnapshot};
