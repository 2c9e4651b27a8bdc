//! Compile-time tunables for the process core.

/// Highest pid handed out; pids live in `PID_MIN..=MAX_PROC`.
pub const MAX_PROC: usize = 100;

/// Lowest pid a user process can receive. Pid 0 belongs to the kernel.
pub const PID_MIN: u32 = 1;

/// Number of descriptor slots in every per-process file table.
pub const OPEN_MAX: usize = 128;

pub const STDIN_FILENO: usize = 0;
pub const STDOUT_FILENO: usize = 1;
pub const STDERR_FILENO: usize = 2;

/// First descriptor `FdTable::install` will hand out; 0..=2 are stdio.
pub const FIRST_USER_FD: usize = STDERR_FILENO + 1;
