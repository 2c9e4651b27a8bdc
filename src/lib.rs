//! Process lifecycle core for the AtomicOS kernel.
//!
//! Creates and registers processes, tracks their threads and resources,
//! runs the exit/wait handshake between a child and its parent, and keeps
//! the per-process tables of shared open files.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod process;
pub mod scheduler;
#[cfg(target_arch = "x86_64")]
pub mod serial;
pub mod sync;
pub mod syscalls;

#[cfg(test)]
mod testing;

pub use error::{ProcError, ProcResult};
pub use process::{Process, ProcessId, ProcessTable, PROCESS_TABLE};

/// Bring up the process core. `platform` provides the scheduler hooks.
pub fn init(platform: &'static dyn scheduler::Platform) {
    #[cfg(target_arch = "x86_64")]
    serial::init(log::LevelFilter::Info);

    scheduler::install(platform);
    process::bootstrap();
    log::info!("AtomicOS process core initialized.");
}
