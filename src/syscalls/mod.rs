//! Process system calls, after argument marshaling.
//!
//! Each call takes the thread that trapped in; its process is the caller.
//! Errors come back as [`ProcError`] for the trap handler to turn into an
//! errno.

use alloc::sync::Arc;

use crate::error::{ProcError, ProcResult};
use crate::process::{Process, ProcessId, ProcessTable};
use crate::scheduler::Thread;

/// Wait status for a normal exit with `code`.
pub const fn mkwait_exit(code: i32) -> i32 {
    (code & 0xff) << 2
}

/// Exit code from a wait status built by [`mkwait_exit`].
pub const fn wexitstatus(status: i32) -> i32 {
    (status >> 2) & 0xff
}

fn caller(thread: &Thread) -> Arc<Process> {
    match thread.process() {
        Some(proc) => proc,
        None => panic!("syscall from thread {:?} with no process", thread.id),
    }
}

/// sys_getpid: pid of the calling process.
pub fn sys_getpid(thread: &Thread) -> ProcessId {
    caller(thread).pid()
}

/// sys_getppid: parent of the calling process, if it still has one.
pub fn sys_getppid(thread: &Thread) -> Option<ProcessId> {
    caller(thread).parent()
}

/// sys_fork: duplicate the calling process.
///
/// The child gets a copy of the address space, shares every open file and
/// the working directory, and has no threads yet; the scheduler attaches
/// one that returns 0 to user mode.
pub fn sys_fork(table: &ProcessTable, thread: &Thread) -> ProcResult<Arc<Process>> {
    let parent = caller(thread);
    if table.is_full() {
        return Err(ProcError::TableFull);
    }

    let child = Process::create_runprogram(table, parent.name(), &parent)?;
    let addrspace = parent.with_addrspace(|addrspace| addrspace.map(|a| a.try_clone()).transpose());
    let addrspace = match addrspace {
        Ok(addrspace) => addrspace,
        Err(e) => {
            log::warn!("sys_fork: copying address space of {} failed: {}", parent.pid(), e);
            child.destroy(table);
            return Err(e);
        }
    };
    child.set_addrspace(addrspace);
    parent.files().duplicate_into(child.files());
    if !parent.is_kernel() {
        child.set_parent(parent.pid());
    }

    log::debug!("sys_fork: process {} created child {}", parent.pid(), child.pid());
    Ok(child)
}

/// sys__exit: take the calling thread out of its process.
///
/// The thread must not run user code again; the scheduler reaps it after
/// this returns. When the last thread leaves, its `code` becomes the exit
/// status, the children are orphaned and the parent is woken. The process
/// then stays a zombie until its parent waits.
pub fn sys_exit(table: &ProcessTable, thread: &Thread, code: i32) {
    let (proc, left) = Process::detach_thread(thread);
    if left > 0 {
        log::debug!("sys_exit: process {} has {} threads left", proc.pid(), left);
        return;
    }
    if !proc.is_kernel() {
        table.detach_children(proc.pid());
    }
    proc.signal_exit(mkwait_exit(code));
}

/// sys_waitpid: wait for child `pid` to exit, reap it, and return its
/// pid and wait status.
pub fn sys_waitpid(
    table: &ProcessTable,
    thread: &Thread,
    pid: ProcessId,
    options: i32,
) -> ProcResult<(ProcessId, i32)> {
    if options != 0 {
        return Err(ProcError::InvalidArgument);
    }
    let parent = caller(thread);
    let child = table.lookup(pid).ok_or(ProcError::NoSuchProcess)?;
    if child.parent() != Some(parent.pid()) || parent.is_kernel() {
        return Err(ProcError::NotChild);
    }
    // Another thread of the caller may have reaped it since the lookup.
    let status = child.try_wait(table).ok_or(ProcError::NoSuchProcess)?;
    Ok((pid, status))
}
