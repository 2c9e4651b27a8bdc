use alloc::sync::Arc;
use bitflags::bitflags;
use spin::Mutex;

use super::vnode::Vnode;

bitflags! {
    /// Flags an open file was created with.
    ///
    /// The low two bits are the access mode rather than independent flags;
    /// use [`OpenFlags::access_mode`] to read them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0;
        const O_WRONLY = 1;
        const O_RDWR = 2;
        const O_ACCMODE = 3;
        const O_CREAT = 4;
        const O_EXCL = 8;
        const O_TRUNC = 16;
        const O_APPEND = 32;
    }
}

impl OpenFlags {
    pub fn access_mode(&self) -> u32 {
        self.bits() & Self::O_ACCMODE.bits()
    }
}

/// Mutable part of an open file, always accessed under its lock.
struct OpenFileState {
    offset: u64,
    /// Number of descriptor slots referencing this file.
    refs: usize,
}

/// An open file shared between descriptor tables.
///
/// Every populated descriptor slot pointing here accounts for one entry in
/// `refs` and one reference on the vnode. When `refs` reaches zero the file
/// is dead: the vnode reference it held is gone and no slot may use it again.
pub struct OpenFile {
    vnode: Arc<dyn Vnode>,
    flags: OpenFlags,
    state: Mutex<OpenFileState>,
}

impl OpenFile {
    /// Wrap a vnode that the caller has already referenced once (the usual
    /// result of a VFS open). The new file starts with one reference.
    pub fn new(vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Arc<Self> {
        Arc::new(OpenFile {
            vnode,
            flags,
            state: Mutex::new(OpenFileState { offset: 0, refs: 1 }),
        })
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn readable(&self) -> bool {
        self.flags.access_mode() != OpenFlags::O_WRONLY.bits()
    }

    pub fn writable(&self) -> bool {
        self.flags.access_mode() != OpenFlags::O_RDONLY.bits()
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().refs == 0
    }

    pub fn offset(&self) -> u64 {
        self.state.lock().offset
    }

    pub fn seek(&self, pos: u64) {
        let mut state = self.state.lock();
        assert!(state.refs > 0, "seek on a closed file");
        state.offset = pos;
    }

    /// Move the offset forward after a transfer and return the new position.
    pub fn advance(&self, n: u64) -> u64 {
        let mut state = self.state.lock();
        assert!(state.refs > 0, "I/O on a closed file");
        state.offset = state.offset.saturating_add(n);
        state.offset
    }

    /// Account for one more descriptor slot referencing this file.
    pub fn retain(&self) {
        let mut state = self.state.lock();
        assert!(state.refs > 0, "retain on a closed file");
        self.vnode.incref();
        state.refs += 1;
    }

    /// Drop one descriptor slot's reference. Returns `true` when that was the
    /// last one and the file has been closed.
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        assert!(state.refs > 0, "release on a closed file");
        state.refs -= 1;
        self.vnode.decref();
        state.refs == 0
    }
}

impl core::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OpenFile")
            .field("flags", &self.flags)
            .field("offset", &state.offset)
            .field("refs", &state.refs)
            .finish()
    }
}
