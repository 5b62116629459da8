use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
}

#[derive(Debug)]
struct State {
    in_use: usize,
}

/// Fixed-capacity admission gate.
///
/// - Admits while `in_use < capacity`, denies immediately otherwise (no queue)
/// - Capacity 0 denies everything
/// - Every admission must be paired with exactly one release; prefer
///   [`ConcurrencyGate::enter`], whose permit releases on drop
pub struct ConcurrencyGate {
    capacity: usize,
    state: Mutex<State>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State { in_use: 0 }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // The critical sections below cannot panic, so a poisoned lock still
    // guards a consistent counter.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit one request if a slot is free. Denial has no side effects.
    pub fn try_acquire(&self) -> bool {
        let mut st = self.lock();
        if st.in_use < self.capacity {
            st.in_use += 1;
            true
        } else {
            false
        }
    }

    /// Free one slot taken by a successful [`try_acquire`](Self::try_acquire).
    pub fn release(&self) {
        let mut st = self.lock();
        match st.in_use.checked_sub(1) {
            Some(n) => st.in_use = n,
            None => tracing::warn!("concurrency gate released without a matching admission"),
        }
    }

    /// Scoped admission: the returned permit releases its slot when dropped,
    /// on every exit path including unwinding.
    pub fn enter(&self) -> Option<GatePermit<'_>> {
        self.try_acquire().then_some(GatePermit { gate: self })
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let in_use = self.lock().in_use;
        GateSnapshot {
            capacity: self.capacity,
            in_use,
            available: self.capacity.saturating_sub(in_use),
        }
    }
}

/// One admitted slot of a [`ConcurrencyGate`].
#[must_use = "dropping the permit releases the slot immediately"]
pub struct GatePermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
