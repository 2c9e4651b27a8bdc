//! Host stand-ins for the VFS, VM and scheduler.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::{ProcError, ProcResult};
use crate::fs::Vnode;
use crate::memory::AddressSpace;
use crate::scheduler::{self, Platform, Thread};

/// Vnode that counts its references and how often it was closed.
pub struct MockVnode {
    refs: Mutex<usize>,
    closes: AtomicUsize,
}

impl MockVnode {
    /// A node as a VFS open returns it: one reference, held by the caller.
    pub fn opened() -> Arc<Self> {
        Arc::new(MockVnode {
            refs: Mutex::new(1),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn refs(&self) -> usize {
        *self.refs.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Vnode for MockVnode {
    fn incref(&self) {
        let mut refs = self.refs.lock();
        assert!(*refs > 0, "incref on a closed vnode");
        *refs += 1;
    }

    fn decref(&self) {
        let mut refs = self.refs.lock();
        assert!(*refs > 0, "decref on a closed vnode");
        *refs -= 1;
        if *refs == 0 {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Address space that bumps a shared counter when destroyed.
pub struct MockAddrSpace {
    drops: Arc<AtomicUsize>,
    fail_clone: bool,
}

impl MockAddrSpace {
    pub fn new() -> (Box<dyn AddressSpace>, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let addrspace = MockAddrSpace {
            drops: drops.clone(),
            fail_clone: false,
        };
        (Box::new(addrspace), drops)
    }

    /// One whose copy always runs out of memory.
    pub fn failing() -> Box<dyn AddressSpace> {
        Box::new(MockAddrSpace {
            drops: Arc::new(AtomicUsize::new(0)),
            fail_clone: true,
        })
    }
}

impl AddressSpace for MockAddrSpace {
    fn try_clone(&self) -> ProcResult<Box<dyn AddressSpace>> {
        if self.fail_clone {
            return Err(ProcError::OutOfMemory);
        }
        Ok(Box::new(MockAddrSpace {
            drops: self.drops.clone(),
            fail_clone: false,
        }))
    }
}

impl Drop for MockAddrSpace {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

std::thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = RefCell::new(None);
    static DEACTIVATIONS: Cell<usize> = Cell::new(0);
    static BLOCKS: Cell<usize> = Cell::new(0);
}

lazy_static! {
    /// Host thread playing each kernel thread, for waking it.
    static ref HOST_THREADS: Mutex<BTreeMap<u64, std::thread::Thread>> =
        Mutex::new(BTreeMap::new());
}

/// Every host thread plays one CPU.
struct HostPlatform;

impl Platform for HostPlatform {
    fn block_current(&self) {
        BLOCKS.with(|n| n.set(n.get() + 1));
        // Park tokens give the wake-before-block behaviour the core relies on.
        std::thread::park();
    }

    fn wake(&self, thread: &Arc<Thread>) {
        if let Some(host) = HOST_THREADS.lock().get(&thread.id.0) {
            host.unpark();
        }
    }

    fn current_thread(&self) -> Option<Arc<Thread>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    fn deactivate_address_space(&self) {
        DEACTIVATIONS.with(|n| n.set(n.get() + 1));
    }
}

static HOST: HostPlatform = HostPlatform;

pub fn install_platform() {
    scheduler::install(&HOST);
}

/// Pretend `thread` is running on the calling host thread.
pub fn set_current(thread: Option<Arc<Thread>>) {
    if let Some(thread) = &thread {
        HOST_THREADS
            .lock()
            .insert(thread.id.0, std::thread::current());
    }
    CURRENT.with(|current| *current.borrow_mut() = thread);
}

/// Run the calling host thread as a fresh kernel thread named `name`.
pub fn enter_thread(name: &str) -> Arc<Thread> {
    install_platform();
    let thread = Thread::new(name);
    set_current(Some(thread.clone()));
    thread
}

pub fn deactivations() -> usize {
    DEACTIVATIONS.with(|n| n.get())
}

/// How often the calling host thread went to sleep in the scheduler.
pub fn blocks() -> usize {
    BLOCKS.with(|n| n.get())
}
