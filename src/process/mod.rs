pub mod process;
pub mod table;

pub use process::{Process, ProcessId};
pub use table::{ProcessInfo, ProcessTable, PROCESS_TABLE};

/// Bring up the global process table and its kernel process.
pub fn bootstrap() {
    lazy_static::initialize(&PROCESS_TABLE);
    log::info!(
        "Process table initialized: {} pids, kernel process '{}'.",
        PROCESS_TABLE.capacity(),
        PROCESS_TABLE.kernel().name()
    );
}
