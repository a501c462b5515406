//! Synchronization primitives for the engine's rendezvous protocol.
//!
//! Two pieces, both purpose-built rather than general:
//!
//! - [`VipMutex`] lets a control-thread operation pause the real-time loop
//!   deterministically: the run loop calls [`VipMutex::wait`] at the top of
//!   every cycle and blocks while any [`VipGuard`] is outstanding. It is not
//!   an exclusive lock; exclusivity over the registries comes from a separate
//!   mutex shared by the same callers.
//! - [`HybridBarrier`] is a two-mode rendezvous: participants spin by default
//!   (lowest latency), and switch to a condition-variable wait only after an
//!   explicit yield request. The last participant of a cycle wakes all
//!   waiters and clears the yield flag, restoring spin mode.
//!
//! A barrier cycle may only begin once every participant has returned from
//! the previous one. The engine guarantees this by alternating between two
//! barriers per block, never reusing one back-to-back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crossbeam_utils::Backoff;

/// Counts "VIP" control-thread operations that want the run loop paused at
/// the next batch boundary.
#[derive(Default)]
pub struct VipMutex {
    count: Mutex<usize>,
    cv: Condvar,
}

impl VipMutex {
    /// Creates a mutex with no outstanding VIP operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a VIP operation for the lifetime of the returned guard.
    pub fn lock(&self) -> VipGuard<'_> {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        VipGuard { mutex: self }
    }

    /// Blocks until no VIP operations are outstanding.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cv.wait(count).unwrap();
        }
    }
}

/// RAII registration of one VIP operation.
pub struct VipGuard<'a> {
    mutex: &'a VipMutex,
}

impl Drop for VipGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.mutex.count.lock().unwrap();
        *count -= 1;
        drop(count);
        self.mutex.cv.notify_all();
    }
}

/// A rendezvous barrier that spins until all participants arrive, unless a
/// yield has been requested, in which case late participants block on a
/// condition variable and the cycle's last arriver wakes them.
pub struct HybridBarrier {
    count: AtomicUsize,
    total: AtomicUsize,
    yield_requested: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl HybridBarrier {
    /// Creates a barrier for a single participant (trivial rendezvous).
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            total: AtomicUsize::new(1),
            yield_requested: AtomicBool::new(false),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Reconfigures the participant count. Callers must guarantee that no
    /// participant is inside [`wait`](Self::wait) when this runs; the engine
    /// does so by resizing only between batches with all workers joined.
    pub fn set_total(&self, total: usize) {
        assert!(total >= 1, "barrier requires at least one participant");
        self.total.store(total, Ordering::SeqCst);
    }

    /// Asks the current cycle's waiters to block on the condition variable
    /// instead of spinning. Cleared by the cycle's last arriver.
    pub fn request_yield(&self) {
        self.yield_requested.store(true, Ordering::SeqCst);
    }

    /// Rendezvous: returns once all participants of this cycle have arrived.
    pub fn wait(&self) {
        let total = self.total.load(Ordering::SeqCst);
        let id = self.count.fetch_add(1, Ordering::SeqCst) + 1;

        // Last arriver ends the cycle and wakes any yielded waiters.
        if id == total {
            self.count.store(0, Ordering::SeqCst);
            if self.yield_requested.load(Ordering::SeqCst) {
                let guard = self.lock.lock().unwrap();
                self.cv.notify_all();
                self.yield_requested.store(false, Ordering::SeqCst);
                drop(guard);
            }
            return;
        }

        // Spin until the cycle ends or a yield is requested.
        let backoff = Backoff::new();
        while !self.yield_requested.load(Ordering::SeqCst) {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            backoff.spin();
        }

        // Yield mode: block until the last arriver resets the count.
        let mut guard = self.lock.lock().unwrap();
        while self.count.load(Ordering::SeqCst) != 0 {
            guard = self.cv.wait(guard).unwrap();
        }
    }
}

impl Default for HybridBarrier {
    fn default() -> Self {
        Self::new()
    }
}
