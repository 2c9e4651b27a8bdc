/// A file node owned by the VFS layer.
///
/// The VFS keeps its own reference count on every node; the process core
/// only ever moves that count up and down. When `decref` drops the last
/// reference the VFS closes the node.
pub trait Vnode: Send + Sync {
    /// Take one more reference on this node.
    fn incref(&self);

    /// Drop one reference, closing the node if it was the last.
    fn decref(&self);
}
