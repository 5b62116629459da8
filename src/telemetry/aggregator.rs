use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Bucket for every completed or rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    Overload,
    /// Reserved for a caller-side timeout detector; the request cycle never produces it.
    Timeout,
    Failure,
}

impl OutcomeClass {
    pub const ALL: [OutcomeClass; 4] = [
        OutcomeClass::Success,
        OutcomeClass::Overload,
        OutcomeClass::Timeout,
        OutcomeClass::Failure,
    ];

    /// HTTP status code reported for this class.
    pub fn status_code(self) -> u16 {
        match self {
            OutcomeClass::Success => 200,
            OutcomeClass::Overload => 503,
            OutcomeClass::Timeout => 504,
            OutcomeClass::Failure => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::Overload => "overload",
            OutcomeClass::Timeout => "timeout",
            OutcomeClass::Failure => "failure",
        }
    }

    fn index(self) -> usize {
        match self {
            OutcomeClass::Success => 0,
            OutcomeClass::Overload => 1,
            OutcomeClass::Timeout => 2,
            OutcomeClass::Failure => 3,
        }
    }
}

impl std::fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count and latency sum of one class over one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutcomeTotals {
    pub count: u64,
    pub sum_millis: f64,
}

impl OutcomeTotals {
    /// Requests in the window. The window is fixed, so this doubles as the per-interval rate.
    pub fn rate(&self) -> u64 {
        self.count
    }

    pub fn mean_latency_millis(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum_millis / self.count as f64)
        }
    }
}

/// Consistent view of all four classes taken in one critical section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutcomeSnapshot {
    totals: [OutcomeTotals; 4],
}

impl OutcomeSnapshot {
    pub fn get(&self, class: OutcomeClass) -> OutcomeTotals {
        self.totals[class.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutcomeClass, OutcomeTotals)> + '_ {
        OutcomeClass::ALL.iter().map(move |c| (*c, self.get(*c)))
    }

    /// Sum of the counts of every class.
    pub fn total_rate(&self) -> u64 {
        self.totals.iter().map(|t| t.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rate() == 0
    }
}

/// Per-outcome counters with drain-and-reset semantics.
///
/// One lock guards all eight fields, so a [`drain_and_reset`](Self::drain_and_reset)
/// and a concurrent [`record`](Self::record) never interleave at field level.
#[derive(Debug, Default)]
pub struct OutcomeAggregator {
    state: Mutex<OutcomeSnapshot>,
}

impl OutcomeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OutcomeSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, class: OutcomeClass, elapsed: Duration) {
        let millis = elapsed.as_millis() as f64;
        let mut st = self.lock();
        let t = &mut st.totals[class.index()];
        t.count += 1;
        t.sum_millis += millis;
    }

    /// Snapshot every class and reset all of them to zero.
    pub fn drain_and_reset(&self) -> OutcomeSnapshot {
        std::mem::take(&mut *self.lock())
    }

    /// Read the current window without resetting it.
    pub fn peek(&self) -> OutcomeSnapshot {
        *self.lock()
    }
}
