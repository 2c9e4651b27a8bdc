use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use crate::scheduler::{self, Thread};

/// One-shot event a process fires when it exits.
///
/// Waiters sleep in the scheduler until the event fires. Firing it twice is
/// a bug in the caller and panics.
pub struct ExitSignal {
    fired: AtomicBool,
    /// Threads asleep in [`ExitSignal::wait`]. Drained by the signal.
    waiters: Mutex<Vec<Arc<Thread>>>,
}

impl ExitSignal {
    pub const fn new() -> Self {
        ExitSignal {
            fired: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Fire the event and wake every waiter. Anything written before this
    /// call is visible to every waiter that returns from
    /// [`ExitSignal::wait`].
    pub fn signal(&self) {
        let already = self.fired.swap(true, Ordering::AcqRel);
        assert!(!already, "exit signal fired twice");

        let waiters = core::mem::take(&mut *self.waiters.lock());
        for thread in &waiters {
            scheduler::wake(thread);
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Block the calling thread until [`ExitSignal::signal`] has run.
    ///
    /// The thread is off the run queue while it waits.
    pub fn wait(&self) {
        if self.is_signaled() {
            return;
        }
        let Some(current) = scheduler::current_thread() else {
            panic!("waiting for an exit outside any thread");
        };

        loop {
            {
                // `signal` sets the flag before draining the list, so a
                // waiter queued here is either seen or woken.
                let mut waiters = self.waiters.lock();
                if self.is_signaled() {
                    return;
                }
                if !waiters.iter().any(|t| Arc::ptr_eq(t, &current)) {
                    waiters.push(current.clone());
                }
            }
            scheduler::block_current();
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}
