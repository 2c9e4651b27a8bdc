use alloc::boxed::Box;

use crate::error::ProcResult;

/// A user address space, owned by exactly one process at a time.
///
/// Dropping the box destroys the address space. The process core never
/// shares one; it only moves the box in and out of a process.
pub trait AddressSpace: Send {
    /// Copy this address space for a forked child.
    fn try_clone(&self) -> ProcResult<Box<dyn AddressSpace>>;
}
