//! Atomics and wait hints, swapped for loom's instrumented versions when
//! building with `--cfg loom`.

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicU64, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicU64, Ordering};

#[cfg(not(loom))]
pub(crate) use crossbeam_utils::Backoff;

/// Stand-in for `crossbeam_utils::Backoff` under loom: every wait loop must
/// pass through the loom scheduler or the model cannot make progress.
#[cfg(loom)]
pub(crate) struct Backoff;

#[cfg(loom)]
impl Backoff {
    pub(crate) fn new() -> Self {
        Backoff
    }

    pub(crate) fn snooze(&self) {
        loom::thread::yield_now();
    }
}
