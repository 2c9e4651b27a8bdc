//! Process Table
//!
//! Bounded map from pid to process. The table lock covers pointer work on
//! the slots only; nothing in here takes a process lock while holding it.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

use super::process::{Process, ProcessId};
use crate::config::{MAX_PROC, PID_MIN};
use crate::error::{ProcError, ProcResult};

struct Slots {
    /// Indexed by pid; entry 0 stays empty.
    procs: Vec<Option<Arc<Process>>>,
    /// Pid handed out most recently. The next search starts after it.
    last: usize,
    /// Set when a registration found no free pid, cleared on release.
    /// Another CPU may clear it right after it is read, so it is only a hint.
    full: bool,
}

pub struct ProcessTable {
    slots: Mutex<Slots>,
    capacity: usize,
    kernel: Arc<Process>,
}

/// Read-only view of one process, as `ps` prints it.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub name: String,
    pub threads: usize,
    pub exited: bool,
}

impl ProcessTable {
    /// Empty table handing out pids `PID_MIN..=capacity`.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity >= PID_MIN as usize && capacity < u32::MAX as usize,
            "bad process table capacity {}",
            capacity
        );
        let kernel = match Process::new_kernel() {
            Ok(kernel) => kernel,
            Err(e) => panic!("creating the kernel process failed: {}", e),
        };
        let mut procs = Vec::with_capacity(capacity + 1);
        procs.resize(capacity + 1, None);

        ProcessTable {
            slots: Mutex::new(Slots {
                procs,
                last: 0,
                full: false,
            }),
            capacity,
            kernel,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The kernel's process. It is not in the table.
    pub fn kernel(&self) -> &Arc<Process> {
        &self.kernel
    }

    fn in_range(&self, pid: ProcessId) -> bool {
        pid.0 >= PID_MIN && pid.0 as usize <= self.capacity
    }

    /// Give `proc` the first free pid after the last one handed out,
    /// wrapping around once.
    pub(super) fn register(&self, proc: &Arc<Process>) -> ProcResult<ProcessId> {
        let mut slots = self.slots.lock();
        let mut i = slots.last;
        for _ in 0..self.capacity {
            i = if i >= self.capacity { PID_MIN as usize } else { i + 1 };
            if slots.procs[i].is_none() {
                slots.procs[i] = Some(proc.clone());
                slots.last = i;
                let pid = ProcessId(i as u32);
                proc.assign_pid(pid);
                return Ok(pid);
            }
        }
        slots.full = true;
        Err(ProcError::TableFull)
    }

    /// Process holding `pid`, if any. Unknown and out-of-range pids are
    /// simply absent.
    pub fn lookup(&self, pid: ProcessId) -> Option<Arc<Process>> {
        if !self.in_range(pid) {
            return None;
        }
        let proc = self.slots.lock().procs[pid.0 as usize].clone();
        if let Some(p) = &proc {
            assert_eq!(p.pid(), pid, "process table slot holds the wrong pid");
        }
        proc
    }

    /// Free `pid`. Only the code tearing the process down may call this.
    pub(super) fn release(&self, pid: ProcessId) {
        assert!(self.in_range(pid), "releasing invalid pid {}", pid);
        let old = {
            let mut slots = self.slots.lock();
            slots.full = false;
            slots.procs[pid.0 as usize].take()
        };
        assert!(old.is_some(), "releasing free pid {}", pid);
    }

    /// Forget `parent` as the parent of every process that has it.
    pub fn detach_children(&self, parent: ProcessId) {
        assert!(self.in_range(parent), "invalid parent pid {}", parent);
        let slots = self.slots.lock();
        for proc in slots.procs.iter().flatten() {
            if proc.orphan_if_child_of(parent) {
                log::trace!("process {} orphaned by {}", proc.pid(), parent);
            }
        }
    }

    /// Whether the last registration failed for lack of a pid.
    pub fn is_full(&self) -> bool {
        self.slots.lock().full
    }

    /// Number of pids in use, zombies included.
    pub fn len(&self) -> usize {
        self.slots.lock().procs.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered process, in pid order.
    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        let procs: Vec<Arc<Process>> = {
            let slots = self.slots.lock();
            slots.procs.iter().flatten().cloned().collect()
        };
        procs
            .iter()
            .map(|p| ProcessInfo {
                pid: p.pid(),
                parent: p.parent(),
                name: String::from(p.name()),
                threads: p.thread_count(),
                exited: p.is_exited(),
            })
            .collect()
    }
}

lazy_static! {
    pub static ref PROCESS_TABLE: ProcessTable = ProcessTable::new(MAX_PROC);
}
