use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::process::Process;

/// Unique thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId {
    fn next() -> Self {
        static NEXT_TID: AtomicU64 = AtomicU64::new(1);
        ThreadId(NEXT_TID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A schedulable thread as far as the process core cares: an identity and
/// the process it currently belongs to.
///
/// The owner is also read from the context-switch path to find "the current
/// process", so it is only touched with interrupts masked on this CPU.
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    owner: Mutex<Option<Arc<Process>>>,
}

impl Thread {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Thread {
            id: ThreadId::next(),
            name: String::from(name),
            owner: Mutex::new(None),
        })
    }

    /// Process this thread is attached to, if any.
    pub fn process(&self) -> Option<Arc<Process>> {
        super::without_interrupts(|| self.owner.lock().clone())
    }

    /// Swap the owning process, returning the previous one.
    pub(crate) fn set_process(&self, proc: Option<Arc<Process>>) -> Option<Arc<Process>> {
        super::without_interrupts(|| core::mem::replace(&mut *self.owner.lock(), proc))
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
