use core::fmt;

/// Errno values as seen by user programs.
pub const ENOMEM: i32 = 3;
pub const EINVAL: i32 = 8;
pub const ENPROC: i32 = 12;
pub const ESRCH: i32 = 15;
pub const ECHILD: i32 = 16;
pub const EMFILE: i32 = 28;
pub const EBADF: i32 = 30;

/// Recoverable process-core errors.
///
/// Broken invariants (destroying a running process, double exit, waiting
/// on the kernel) are not represented here; those panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    OutOfMemory,
    TableFull,
    FdTableFull,
    BadDescriptor,
    NoSuchProcess,
    NotChild,
    InvalidArgument,
}

impl ProcError {
    pub fn errno(&self) -> i32 {
        match self {
            ProcError::OutOfMemory => ENOMEM,
            ProcError::TableFull => ENPROC,
            ProcError::FdTableFull => EMFILE,
            ProcError::BadDescriptor => EBADF,
            ProcError::NoSuchProcess => ESRCH,
            ProcError::NotChild => ECHILD,
            ProcError::InvalidArgument => EINVAL,
        }
    }
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcError::OutOfMemory => write!(f, "Out of memory"),
            ProcError::TableFull => write!(f, "Too many processes in system"),
            ProcError::FdTableFull => write!(f, "Too many open files in process"),
            ProcError::BadDescriptor => write!(f, "Bad file number"),
            ProcError::NoSuchProcess => write!(f, "No such process"),
            ProcError::NotChild => write!(f, "No child processes"),
            ProcError::InvalidArgument => write!(f, "Invalid argument"),
        }
    }
}

pub type ProcResult<T> = Result<T, ProcError>;
