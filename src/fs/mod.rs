pub mod vnode;
pub mod file;
pub mod fd;

pub use fd::FdTable;
pub use file::{OpenFile, OpenFlags};
pub use vnode::Vnode;
