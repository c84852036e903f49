// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! The capability interface the embedding pipeline implements: a resume
//! closure, a caller-origin tag, and the operation-kind table.

use std::fmt;

/// Classification input: what kind of filesystem operation this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    // HI
    Open,
    Stat,
    Fstat,
    Lookup,
    Access,
    Readlink,
    Opendir,
    Statfs,
    Readdir,
    Readdirp,
    GetActiveLk,
    SetActiveLk,
    // NORMAL
    Create,
    Flush,
    Lk,
    Inodelk,
    Finodelk,
    Entrylk,
    Fentrylk,
    Lease,
    Unlink,
    Setattr,
    Fsetattr,
    Mknod,
    Mkdir,
    Rmdir,
    Symlink,
    Rename,
    Link,
    Setxattr,
    Getxattr,
    Fgetxattr,
    Fsetxattr,
    Removexattr,
    Fremovexattr,
    // LO
    Read,
    Write,
    Fsync,
    Truncate,
    Ftruncate,
    Fsyncdir,
    Xattrop,
    Fxattrop,
    Rchecksum,
    Fallocate,
    Discard,
    Zerofill,
    // Silent pass-through: bypasses the scheduler entirely.
    Forget,
    Release,
    Releasedir,
    Getspec,
    /// Anything the classifier doesn't recognize. Always rejected with
    /// `Error::InvalidKind`.
    Other(&'static str),
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Other(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A caller-origin tag, carrying the pseudo-PID a request arrived with.
/// Internal/background callers use non-positive pseudo-PIDs; a real client
/// connection always has a strictly positive PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerOrigin {
    pid: i64,
}

/// The boundary below which a caller is considered internal/background.
pub const CLIENT_PID_THRESHOLD: i64 = 0;

impl CallerOrigin {
    pub fn client(pid: i64) -> Self {
        CallerOrigin { pid }
    }

    pub fn internal() -> Self {
        CallerOrigin { pid: -1 }
    }

    /// True when `enable-least-priority` should force this caller's
    /// operations onto the `Least` band regardless of kind.
    pub fn is_low_trust(&self) -> bool {
        self.pid < CLIENT_PID_THRESHOLD
    }
}

/// The continuation that forwards an operation to the next pipeline stage.
/// Implemented by the embedder; invoked by exactly one worker thread, at
/// most once, outside the scheduler lock.
pub trait Resume: Send {
    fn run(self: Box<Self>);
}

/// Blanket impl so a plain closure can be used directly as a continuation.
impl<F> Resume for F
where
    F: FnOnce() + Send,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// An opaque packaged request plus resume closure. Ownership transfers
/// enqueue -> dequeue -> run; never shared, never cloned.
pub struct DeferredOp {
    kind: OpKind,
    resume: Box<dyn Resume>,
}

impl DeferredOp {
    pub fn new(kind: OpKind, resume: Box<dyn Resume>) -> Self {
        DeferredOp { kind, resume }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Invokes the captured continuation on the calling thread, consuming
    /// the deferred operation.
    pub fn run(self) {
        self.resume.run();
    }
}

impl fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredOp").field("kind", &self.kind).finish()
    }
}
