//! Synthetic CPU work.
//!
//! A request "costs" CPU by running one of the [`WorkCost`] kinds. The work is
//! blocking and CPU-bound; async callers should run it on the blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How much synthetic work one request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkCost {
    /// No work at all.
    #[default]
    Idle,
    /// Sleep for the duration while a helper thread spins on a core.
    Burn(Duration),
    /// Sieve primes below the bound and keep the largest.
    Primes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReport {
    pub elapsed: Duration,
    /// Short rendering for the request trace (the cost, or the prime found).
    pub label: String,
}

/// Pluggable synthetic work.
pub trait SyntheticWork: Send + Sync {
    fn run(&self, cost: WorkCost) -> WorkReport;
}

/// Default CPU-consuming implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuWork;

impl SyntheticWork for CpuWork {
    fn run(&self, cost: WorkCost) -> WorkReport {
        let start = Instant::now();
        let label = match cost {
            WorkCost::Idle => format!("{:?}", Duration::ZERO),
            WorkCost::Burn(d) => {
                burn_cpu(d);
                format!("{:?}", d)
            }
            WorkCost::Primes(limit) => largest_prime(limit).to_string(),
        };
        WorkReport {
            elapsed: start.elapsed(),
            label,
        }
    }
}

/// Keep one core busy for `duration`. Zero is a no-op.
pub fn burn_cpu(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let spinner = thread::spawn(move || {
        while !flag.load(Ordering::Relaxed) {
            std::hint::spin_loop();
        }
    });
    thread::sleep(duration);
    done.store(true, Ordering::Relaxed);
    if spinner.join().is_err() {
        tracing::warn!("cpu burn helper thread panicked");
    }
}

/// Largest prime strictly below `limit`, or 0 if there is none.
///
/// Sieve of Atkin; about 0.1 cpu-seconds for a limit of 8,000,000.
pub fn largest_prime(limit: usize) -> usize {
    if limit <= 2 {
        return 0;
    }
    let mut is_prime = vec![false; limit + 1];

    let mut x = 1;
    while x * x <= limit {
        let mut y = 1;
        while y * y <= limit {
            let n = 4 * x * x + y * y;
            if n <= limit && (n % 12 == 1 || n % 12 == 5) {
                is_prime[n] = !is_prime[n];
            }
            let n = 3 * x * x + y * y;
            if n <= limit && n % 12 == 7 {
                is_prime[n] = !is_prime[n];
            }
            if x > y {
                let n = 3 * x * x - y * y;
                if n <= limit && n % 12 == 11 {
                    is_prime[n] = !is_prime[n];
                }
            }
            y += 1;
        }
        x += 1;
    }

    // Eliminate multiples of squares of primes.
    let mut n = 5;
    while n * n <= limit {
        if is_prime[n] {
            let sq = n * n;
            let mut k = sq;
            while k <= limit {
                is_prime[k] = false;
                k += sq;
            }
        }
        n += 1;
    }

    is_prime[2] = true;
    if limit >= 3 {
        is_prime[3] = true;
    }

    (2..limit).rev().find(|&p| is_prime[p]).unwrap_or(0)
}
