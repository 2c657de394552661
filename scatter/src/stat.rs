//! Broker statistics: five monotonic counters with swap-on-read snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counter deltas accumulated since the previous snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stat {
    /// Fan-out jobs started.
    pub inquire: u64,
    /// Non-timeout failures before the store write.
    pub inquire_fail: u64,
    /// Downstream calls that exceeded their endpoint timeout.
    pub inquire_timeout: u64,
    /// Store writes that timed out.
    pub store_timeout: u64,
    /// Fan-out jobs the worker pool rejected.
    pub worker_fail: u64,
}

/// The live counters. Updates are atomic increments; [`Counters::snapshot`]
/// atomically swaps each counter to zero, so monitoring reads a
/// non-decaying delta stream and no increment is ever lost or seen twice.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    inquire: AtomicU64,
    inquire_fail: AtomicU64,
    inquire_timeout: AtomicU64,
    store_timeout: AtomicU64,
    worker_fail: AtomicU64,
}

impl Counters {
    pub(crate) fn incr_inquire(&self) {
        self.inquire.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_inquire_fail(&self) {
        self.inquire_fail.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_inquire_timeout(&self) {
        self.inquire_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_store_timeout(&self) {
        self.store_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_worker_fail(&self) {
        self.worker_fail.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Stat {
        Stat {
            inquire: self.inquire.swap(0, Ordering::Relaxed),
            inquire_fail: self.inquire_fail.swap(0, Ordering::Relaxed),
            inquire_timeout: self.inquire_timeout.swap(0, Ordering::Relaxed),
            store_timeout: self.store_timeout.swap(0, Ordering::Relaxed),
            worker_fail: self.worker_fail.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn snapshot_returns_deltas_and_resets() {
        let counters = Counters::default();
        counters.incr_inquire();
        counters.incr_inquire();
        counters.incr_worker_fail();

        let first = counters.snapshot();
        assert_eq!(first.inquire, 2);
        assert_eq!(first.worker_fail, 1);
        assert_eq!(first.inquire_fail, 0);

        assert_eq!(counters.snapshot(), Stat::default());
    }

    #[test]
    fn increments_from_many_threads_are_all_observed() {
        let counters = Arc::new(Counters::default());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.incr_inquire();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(counters.snapshot().inquire, 8000);
    }
}
