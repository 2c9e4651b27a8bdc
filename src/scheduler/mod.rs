//! Hooks into the thread scheduler.
//!
//! Scheduling itself lives outside this crate. The kernel installs a
//! [`Platform`] once at boot and the process core calls back into it to
//! put threads to sleep and wake them, to find the running thread, and to
//! flush the MMU.

pub mod thread;

use alloc::sync::Arc;
use spin::Once;

pub use thread::{Thread, ThreadId};
use crate::process::Process;

/// Services the rest of the kernel provides to the process core.
pub trait Platform: Sync {
    /// Take the current thread off the run queue until [`Platform::wake`]
    /// names it. A wake that arrives before the block makes it return at
    /// once. It may also return spuriously; callers recheck their condition.
    fn block_current(&self);

    /// Make `thread` runnable again, or cancel its next block.
    fn wake(&self, thread: &Arc<Thread>);

    /// Thread running on the local CPU, if any.
    fn current_thread(&self) -> Option<Arc<Thread>>;

    /// Make the MMU forget whatever address space is loaded on this CPU.
    fn deactivate_address_space(&self);
}

static PLATFORM: Once<&'static dyn Platform> = Once::new();

/// Register the kernel's scheduler hooks. Only the first call has effect.
pub fn install(platform: &'static dyn Platform) {
    PLATFORM.call_once(|| platform);
}

/// Sleep until woken. Blocking before the scheduler is installed is a bug.
pub fn block_current() {
    match PLATFORM.get() {
        Some(platform) => platform.block_current(),
        None => panic!("blocking before the scheduler is installed"),
    }
}

pub fn wake(thread: &Arc<Thread>) {
    if let Some(platform) = PLATFORM.get() {
        platform.wake(thread);
    }
}

pub fn current_thread() -> Option<Arc<Thread>> {
    PLATFORM.get().and_then(|platform| platform.current_thread())
}

/// Process owning the thread on this CPU.
pub fn current_process() -> Option<Arc<Process>> {
    current_thread().and_then(|thread| thread.process())
}

pub fn deactivate_address_space() {
    if let Some(platform) = PLATFORM.get() {
        platform.deactivate_address_space();
    }
}

/// Run `f` with the context-switch path held off on this CPU.
#[cfg(all(target_os = "none", target_arch = "x86_64"))]
pub(crate) fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Hosted builds have no interrupts to mask; the owner lock alone
/// excludes the scheduler.
#[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
pub(crate) fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
