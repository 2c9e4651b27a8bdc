//! Process control structure and its lifecycle.
//!
//! A process is created and registered, gains and loses threads, records an
//! exit status, and is finally destroyed by whoever waits on it. Between
//! exit and destruction it is a zombie: its pid is still taken and lookups
//! still find it.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use spin::Mutex;

use super::table::ProcessTable;
use crate::error::{ProcError, ProcResult};
use crate::fs::{FdTable, Vnode};
use crate::memory::AddressSpace;
use crate::scheduler::{self, Thread};
use crate::sync::ExitSignal;

/// Process identifier. Pid 0 is the kernel and is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    pub const KERNEL: ProcessId = ProcessId(0);

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `parent` values that are not a pid.
const NO_PARENT: u32 = 0;
const ORPHANED: u32 = u32::MAX;

/// Fields guarded by the process lock. Only pointer-sized work happens
/// under it.
struct ProcessInner {
    num_threads: usize,
    addrspace: Option<Box<dyn AddressSpace>>,
    cwd: Option<Arc<dyn Vnode>>,
    exited: bool,
    status: i32,
}

pub struct Process {
    pid: AtomicU32,
    name: String,
    /// Parent pid, `NO_PARENT` until linked, `ORPHANED` once the parent
    /// went away. Written without the process lock so the registry can
    /// orphan children while holding only its own lock.
    parent: AtomicU32,
    inner: Mutex<ProcessInner>,
    files: FdTable,
    exit: ExitSignal,
    destroyed: AtomicBool,
}

impl Process {
    fn alloc(name: &str) -> ProcResult<Process> {
        let mut owned = String::new();
        owned
            .try_reserve_exact(name.len())
            .map_err(|_| ProcError::OutOfMemory)?;
        owned.push_str(name);

        Ok(Process {
            pid: AtomicU32::new(ProcessId::KERNEL.0),
            name: owned,
            parent: AtomicU32::new(NO_PARENT),
            inner: Mutex::new(ProcessInner {
                num_threads: 0,
                addrspace: None,
                cwd: None,
                exited: false,
                status: 0,
            }),
            files: FdTable::new()?,
            exit: ExitSignal::new(),
            destroyed: AtomicBool::new(false),
        })
    }

    /// The kernel's own process. It keeps pid 0 and never enters a table.
    pub(super) fn new_kernel() -> ProcResult<Arc<Process>> {
        Ok(Arc::new(Self::alloc("[kernel]")?))
    }

    /// Build a process and give it a pid in `table`.
    ///
    /// If the table is full the half-built process is dropped and nothing
    /// stays behind.
    pub fn create(table: &ProcessTable, name: &str) -> ProcResult<Arc<Process>> {
        let proc = Arc::new(Self::alloc(name)?);
        match table.register(&proc) {
            Ok(pid) => {
                log::debug!("process {} ({}) created", pid, name);
                Ok(proc)
            }
            Err(e) => {
                log::warn!("cannot create process '{}': {}", name, e);
                Err(e)
            }
        }
    }

    /// Create a process for a new program. It starts without an address
    /// space and shares `origin`'s working directory.
    pub fn create_runprogram(
        table: &ProcessTable,
        name: &str,
        origin: &Process,
    ) -> ProcResult<Arc<Process>> {
        let proc = Self::create(table, name)?;
        // Nobody else can see `proc` yet, but keep to the lock discipline.
        proc.inner.lock().cwd = origin.cwd();
        Ok(proc)
    }

    pub fn pid(&self) -> ProcessId {
        ProcessId(self.pid.load(Ordering::Acquire))
    }

    pub(super) fn assign_pid(&self, pid: ProcessId) {
        self.pid.store(pid.0, Ordering::Release);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_kernel(&self) -> bool {
        self.pid() == ProcessId::KERNEL
    }

    pub fn files(&self) -> &FdTable {
        &self.files
    }

    pub fn parent(&self) -> Option<ProcessId> {
        match self.parent.load(Ordering::Acquire) {
            NO_PARENT | ORPHANED => None,
            pid => Some(ProcessId(pid)),
        }
    }

    /// Link a freshly created process to its parent. Works once.
    pub fn set_parent(&self, parent: ProcessId) {
        assert!(parent != ProcessId::KERNEL, "the kernel is nobody's parent");
        let linked = self
            .parent
            .compare_exchange(NO_PARENT, parent.0, Ordering::AcqRel, Ordering::Acquire);
        assert!(linked.is_ok(), "process {} already had a parent", self.pid());
    }

    /// Drop the parent link if it points at `parent`. Once orphaned a
    /// process never gets a parent again.
    pub(super) fn orphan_if_child_of(&self, parent: ProcessId) -> bool {
        self.parent
            .compare_exchange(parent.0, ORPHANED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn thread_count(&self) -> usize {
        self.inner.lock().num_threads
    }

    pub fn is_exited(&self) -> bool {
        self.inner.lock().exited
    }

    /// Status recorded at exit, or `None` while still running.
    pub fn exit_status(&self) -> Option<i32> {
        let inner = self.inner.lock();
        inner.exited.then_some(inner.status)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Working directory, with a new vnode reference for the caller.
    pub fn cwd(&self) -> Option<Arc<dyn Vnode>> {
        let inner = self.inner.lock();
        inner.cwd.as_ref().map(|vn| {
            vn.incref();
            vn.clone()
        })
    }

    /// Replace the working directory. `cwd` must carry a reference for this
    /// process; the old directory's reference is dropped.
    pub fn set_cwd(&self, cwd: Option<Arc<dyn Vnode>>) {
        let old = core::mem::replace(&mut self.inner.lock().cwd, cwd);
        if let Some(old) = old {
            old.decref();
        }
    }

    /// Look at the address space without taking it away.
    pub fn with_addrspace<R>(&self, f: impl FnOnce(Option<&dyn AddressSpace>) -> R) -> R {
        let inner = self.inner.lock();
        f(inner.addrspace.as_deref())
    }

    /// Install a new address space and hand back the old one for the
    /// caller to keep or drop.
    pub fn set_addrspace(
        &self,
        addrspace: Option<Box<dyn AddressSpace>>,
    ) -> Option<Box<dyn AddressSpace>> {
        core::mem::replace(&mut self.inner.lock().addrspace, addrspace)
    }

    /// Make `thread` belong to this process.
    pub fn attach_thread(self: &Arc<Self>, thread: &Thread) {
        assert!(!self.is_destroyed(), "attaching a thread to a destroyed process");
        assert!(
            thread.process().is_none(),
            "thread {:?} already belongs to a process",
            thread.id
        );
        self.inner.lock().num_threads += 1;
        thread.set_process(Some(self.clone()));
    }

    /// Take `thread` away from its process. Returns that process and how
    /// many threads it has left.
    pub fn detach_thread(thread: &Thread) -> (Arc<Process>, usize) {
        let Some(proc) = thread.process() else {
            panic!("thread {:?} has no process", thread.id);
        };
        let left = {
            let mut inner = proc.inner.lock();
            assert!(inner.num_threads > 0, "process {} has no threads", proc.pid());
            inner.num_threads -= 1;
            inner.num_threads
        };
        thread.set_process(None);
        (proc, left)
    }

    /// Record the exit status and wake whoever waits on this process.
    ///
    /// The process stays registered until a waiter reaps it.
    pub fn signal_exit(&self, status: i32) {
        {
            let mut inner = self.inner.lock();
            assert!(!inner.exited, "process {} exited twice", self.pid());
            inner.exited = true;
            inner.status = status;
        }
        log::debug!("process {} exited with status {}", self.pid(), status);
        self.exit.signal();
    }

    /// Block until the process exits, destroy it, and return its status.
    ///
    /// Waiters already blocked when the exit fires all see the same status
    /// and exactly one of them tears the process down. Waiting on a process
    /// that is already destroyed is a bug.
    pub fn wait(self: Arc<Self>, table: &ProcessTable) -> i32 {
        assert!(!self.is_destroyed(), "waiting on destroyed process {}", self.pid());
        match Arc::clone(&self).try_wait(table) {
            Some(status) => status,
            None => panic!("process {} destroyed under its waiter", self.pid()),
        }
    }

    /// Like [`Process::wait`], but a process that another waiter already
    /// reaped yields `None`. For callers that found it through a lookup
    /// that may have gone stale.
    pub fn try_wait(self: Arc<Self>, table: &ProcessTable) -> Option<i32> {
        assert!(!self.is_kernel(), "waiting on the kernel process");
        if self.is_destroyed() {
            return None;
        }

        self.exit.wait();
        let status = self.inner.lock().status;
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.teardown(table);
        }
        Some(status)
    }

    /// Threads asleep in [`Process::wait`].
    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.exit.waiter_count()
    }

    /// Free everything the process owns and give its pid back.
    ///
    /// Must run once, with no threads left.
    pub fn destroy(self: Arc<Self>, table: &ProcessTable) {
        assert!(!self.is_kernel(), "destroying the kernel process");
        let already = self.destroyed.swap(true, Ordering::AcqRel);
        assert!(!already, "process {} destroyed twice", self.pid());
        self.teardown(table);
    }

    fn teardown(&self, table: &ProcessTable) {
        let pid = self.pid();
        let cwd = {
            let mut inner = self.inner.lock();
            assert_eq!(inner.num_threads, 0, "destroying process {} with live threads", pid);
            inner.cwd.take()
        };
        if let Some(cwd) = cwd {
            cwd.decref();
        }

        // If this is the address space loaded on our CPU, unhook it before
        // dropping it, or a context switch could load it again.
        let is_current = scheduler::current_process()
            .map_or(false, |cur| core::ptr::eq(&*cur, self));
        let addrspace = self.set_addrspace(None);
        if is_current && addrspace.is_some() {
            scheduler::deactivate_address_space();
        }
        drop(addrspace);

        table.detach_children(pid);
        table.release(pid);
        self.files.close_all();
        log::debug!("process {} ({}) destroyed", pid, self.name);
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid())
            .field("name", &self.name)
            .field("parent", &self.parent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{OpenFile, OpenFlags};
    use crate::testing::{self, MockAddrSpace, MockVnode};
    use std::thread;

    #[test]
    fn test_create_assigns_pid() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "init").unwrap();
        assert_eq!(p.pid(), ProcessId(1));
        assert_eq!(p.name(), "init");
        assert_eq!(p.thread_count(), 0);
        assert!(p.parent().is_none());
        assert!(p.exit_status().is_none());
        assert_eq!(p.files().open_count(), 0);
    }

    #[test]
    fn test_create_fails_when_full() {
        let table = ProcessTable::new(1);
        let _p = Process::create(&table, "a").unwrap();
        assert_eq!(Process::create(&table, "b").unwrap_err(), ProcError::TableFull);
        assert!(table.is_full());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_attach_detach_thread() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "worker").unwrap();
        let t1 = Thread::new("t1");
        let t2 = Thread::new("t2");

        p.attach_thread(&t1);
        p.attach_thread(&t2);
        assert_eq!(p.thread_count(), 2);
        assert!(Arc::ptr_eq(&t1.process().unwrap(), &p));

        let (owner, left) = Process::detach_thread(&t1);
        assert!(Arc::ptr_eq(&owner, &p));
        assert_eq!(left, 1);
        assert!(t1.process().is_none());
        assert_eq!(p.thread_count(), 1);
    }

    #[test]
    #[should_panic(expected = "has no process")]
    fn test_detach_unattached_thread_panics() {
        let t = Thread::new("stray");
        Process::detach_thread(&t);
    }

    #[test]
    #[should_panic(expected = "with live threads")]
    fn test_destroy_running_process_panics() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "busy").unwrap();
        let t = Thread::new("t");
        p.attach_thread(&t);
        p.destroy(&table);
    }

    #[test]
    #[should_panic(expected = "destroying the kernel process")]
    fn test_destroy_kernel_panics() {
        let table = ProcessTable::new(4);
        table.kernel().clone().destroy(&table);
    }

    #[test]
    #[should_panic(expected = "waiting on the kernel process")]
    fn test_wait_on_kernel_panics() {
        let table = ProcessTable::new(4);
        table.kernel().clone().wait(&table);
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_double_destroy_panics() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "x").unwrap();
        p.clone().destroy(&table);
        p.destroy(&table);
    }

    #[test]
    #[should_panic(expected = "waiting on destroyed process")]
    fn test_wait_after_destroy_panics() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "x").unwrap();
        p.clone().destroy(&table);
        p.wait(&table);
    }

    #[test]
    #[should_panic(expected = "exited twice")]
    fn test_double_exit_panics() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "x").unwrap();
        p.signal_exit(0);
        p.signal_exit(1);
    }

    #[test]
    fn test_addrspace_swap_returns_old() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "vm").unwrap();
        let (first, first_drops) = MockAddrSpace::new();
        let (second, second_drops) = MockAddrSpace::new();

        assert!(p.set_addrspace(Some(first)).is_none());
        assert!(p.with_addrspace(|a| a.is_some()));
        let old = p.set_addrspace(Some(second));
        assert!(old.is_some());
        assert_eq!(testing::count(&first_drops), 0);
        drop(old);
        assert_eq!(testing::count(&first_drops), 1);

        p.destroy(&table);
        assert_eq!(testing::count(&second_drops), 1);
    }

    #[test]
    fn test_destroy_current_deactivates_first() {
        testing::install_platform();
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "self").unwrap();
        let (addrspace, drops) = MockAddrSpace::new();
        p.set_addrspace(Some(addrspace));

        // Make `p` the current process, then drop the thread count back to
        // zero while leaving the owner link in place the way the exit path
        // sees it just before the final switch.
        let t = Thread::new("main");
        p.attach_thread(&t);
        testing::set_current(Some(t.clone()));
        p.inner.lock().num_threads = 0;

        let before = testing::deactivations();
        p.clone().destroy(&table);
        assert_eq!(testing::deactivations(), before + 1);
        assert_eq!(testing::count(&drops), 1);
        testing::set_current(None);
        t.set_process(None);
    }

    #[test]
    fn test_runprogram_inherits_cwd() {
        let table = ProcessTable::new(4);
        let dir = MockVnode::opened();
        table.kernel().set_cwd(Some(dir.clone() as Arc<dyn Vnode>));

        let p = Process::create_runprogram(&table, "sh", table.kernel()).unwrap();
        assert_eq!(dir.refs(), 2);
        assert!(p.cwd().is_some());
        // `cwd()` handed us a reference of our own.
        dir.decref();

        p.destroy(&table);
        assert_eq!(dir.refs(), 1);
        table.kernel().set_cwd(None);
        assert!(dir.is_closed());
    }

    #[test]
    fn test_destroy_closes_files() {
        let table = ProcessTable::new(4);
        let p = Process::create(&table, "io").unwrap();
        let vn = MockVnode::opened();
        p.files().install(OpenFile::new(vn.clone(), OpenFlags::O_RDONLY)).unwrap();

        p.destroy(&table);
        assert!(vn.is_closed());
        assert!(table.lookup(ProcessId(1)).is_none());
    }

    #[test]
    fn test_wait_collects_status_and_reaps() {
        testing::enter_thread("reaper");
        let table = Arc::new(ProcessTable::new(4));
        let child = Process::create(&table, "child").unwrap();
        let pid = child.pid();

        let exiting = child.clone();
        let handle = thread::spawn(move || {
            thread::yield_now();
            exiting.signal_exit(7);
        });

        assert_eq!(child.clone().wait(&table), 7);
        handle.join().unwrap();
        assert!(child.is_destroyed());
        assert!(table.lookup(pid).is_none());
    }

    #[test]
    fn test_try_wait_on_reaped_process_is_none() {
        testing::enter_thread("reaper");
        let table = ProcessTable::new(4);
        let child = Process::create(&table, "child").unwrap();
        let stale = table.lookup(child.pid()).unwrap();
        child.signal_exit(5);

        assert_eq!(child.try_wait(&table), Some(5));
        // A second reaper holding an old lookup result loses quietly.
        assert_eq!(stale.clone().try_wait(&table), None);
        assert!(stale.is_destroyed());
    }

    #[test]
    fn test_parent_link_is_one_shot() {
        let table = ProcessTable::new(4);
        let parent = Process::create(&table, "p").unwrap();
        let child = Process::create(&table, "c").unwrap();
        child.set_parent(parent.pid());
        assert_eq!(child.parent(), Some(parent.pid()));

        assert!(child.orphan_if_child_of(parent.pid()));
        assert!(child.parent().is_none());
        assert!(!child.orphan_if_child_of(parent.pid()));
    }
}
