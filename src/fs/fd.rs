//! Per-process file descriptor tables.
//!
//! Copying one table into another takes three locks: the global copy lock,
//! then the source table, then the destination table. The guard types below
//! only let you request them in that order, and dropping the final guard
//! releases them in reverse.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use super::file::{OpenFile, OpenFlags};
use super::vnode::Vnode;
use crate::config::{FIRST_USER_FD, OPEN_MAX, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use crate::error::{ProcError, ProcResult};

type Slots = Vec<Option<Arc<OpenFile>>>;

/// Serializes every table-to-table copy in the system.
static FD_COPY_LOCK: Mutex<()> = Mutex::new(());

/// Proof that the global copy lock is held.
pub struct CopyOrder<'a> {
    _global: MutexGuard<'a, ()>,
}

impl<'a> CopyOrder<'a> {
    pub fn acquire() -> Self {
        CopyOrder { _global: FD_COPY_LOCK.lock() }
    }

    /// Second step: lock the table being copied from.
    pub fn lock_source(self, src: &'a FdTable) -> SourceLocked<'a> {
        SourceLocked {
            src: src.slots.lock(),
            order: self,
        }
    }
}

/// Global copy lock plus the source table lock.
pub struct SourceLocked<'a> {
    src: MutexGuard<'a, Slots>,
    order: CopyOrder<'a>,
}

impl<'a> SourceLocked<'a> {
    /// Last step: lock the table being copied into.
    pub fn lock_dest(self, dst: &'a FdTable) -> BothLocked<'a> {
        BothLocked {
            dst: dst.slots.lock(),
            src: self.src,
            _order: self.order,
        }
    }
}

/// All three copy locks. Fields drop top to bottom: destination, source,
/// then the global lock.
pub struct BothLocked<'a> {
    dst: MutexGuard<'a, Slots>,
    src: MutexGuard<'a, Slots>,
    _order: CopyOrder<'a>,
}

impl BothLocked<'_> {
    /// Point the destination at every open file of the source, taking a
    /// reference for each. Returns how many slots were copied.
    fn copy_slots(&mut self) -> usize {
        let mut copied = 0;
        for (dst, src) in self.dst.iter_mut().zip(self.src.iter()) {
            if let Some(file) = src {
                assert!(dst.is_none(), "copying over a populated descriptor");
                file.retain();
                *dst = Some(file.clone());
                copied += 1;
            }
        }
        copied
    }
}

/// Fixed-size table of open files indexed by descriptor number.
pub struct FdTable {
    slots: Mutex<Slots>,
}

impl FdTable {
    /// Allocate an empty table of `OPEN_MAX` slots.
    pub fn new() -> ProcResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(OPEN_MAX)
            .map_err(|_| ProcError::OutOfMemory)?;
        slots.resize(OPEN_MAX, None);
        Ok(FdTable { slots: Mutex::new(slots) })
    }

    pub fn capacity(&self) -> usize {
        OPEN_MAX
    }

    /// Put `file` in the lowest free slot at or above `FIRST_USER_FD`.
    ///
    /// The table takes over the caller's reference on `file`.
    pub fn install(&self, file: Arc<OpenFile>) -> ProcResult<usize> {
        let mut slots = self.slots.lock();
        let fd = (FIRST_USER_FD..OPEN_MAX)
            .find(|&fd| slots[fd].is_none())
            .ok_or(ProcError::FdTableFull)?;
        slots[fd] = Some(file);
        Ok(fd)
    }

    /// Put `file` at exactly `fd`, closing whatever was there.
    pub fn install_at(&self, fd: usize, file: Arc<OpenFile>) -> ProcResult<()> {
        if fd >= OPEN_MAX {
            return Err(ProcError::BadDescriptor);
        }
        let mut slots = self.slots.lock();
        if let Some(old) = slots[fd].replace(file) {
            old.release();
        }
        Ok(())
    }

    /// Open file behind `fd`.
    pub fn get(&self, fd: usize) -> ProcResult<Arc<OpenFile>> {
        self.slots
            .lock()
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(ProcError::BadDescriptor)
    }

    /// Empty `fd`, dropping its reference on the open file.
    pub fn close(&self, fd: usize) -> ProcResult<()> {
        let mut slots = self.slots.lock();
        let file = slots
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .ok_or(ProcError::BadDescriptor)?;
        if file.release() {
            log::trace!("fd {}: last reference closed", fd);
        }
        Ok(())
    }

    /// Make `new` refer to the same open file as `old`.
    pub fn dup2(&self, old: usize, new: usize) -> ProcResult<usize> {
        if new >= OPEN_MAX {
            return Err(ProcError::BadDescriptor);
        }
        let mut slots = self.slots.lock();
        let file = slots
            .get(old)
            .and_then(|slot| slot.clone())
            .ok_or(ProcError::BadDescriptor)?;
        if old == new {
            return Ok(new);
        }
        file.retain();
        if let Some(prev) = slots[new].replace(file) {
            prev.release();
        }
        Ok(new)
    }

    /// Give stdin, stdout and stderr one shared open file on the console.
    ///
    /// `console` must carry one vnode reference for the new open file.
    pub fn attach_console(&self, console: Arc<dyn Vnode>) -> ProcResult<()> {
        let file = OpenFile::new(console, OpenFlags::O_RDWR);
        self.install_at(STDIN_FILENO, file.clone())?;
        file.retain();
        self.install_at(STDOUT_FILENO, file.clone())?;
        file.retain();
        self.install_at(STDERR_FILENO, file)
    }

    pub fn open_count(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// Close every populated slot.
    pub fn close_all(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if let Some(file) = slot.take() {
                file.release();
            }
        }
    }

    /// Share every open file of `self` with `dest`, as fork does.
    ///
    /// Only for filling the table of a freshly created process: every
    /// descriptor populated in `self` must be empty in `dest`, and `dest`
    /// must not be `self`. Breaking either panics.
    pub fn duplicate_into(&self, dest: &FdTable) -> usize {
        assert!(
            !core::ptr::eq(self, dest),
            "duplicating a descriptor table into itself"
        );
        let mut locked = CopyOrder::acquire().lock_source(self).lock_dest(dest);
        let copied = locked.copy_slots();
        drop(locked);
        log::trace!("duplicated {} descriptors", copied);
        copied
    }
}
