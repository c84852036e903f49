// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Maps an operation kind (plus caller trust) to a priority band.

use crate::band::Band;
use crate::error::Error;
use crate::op::{CallerOrigin, OpKind};

/// Outcome of classification: either a real band to enqueue on, or a
/// bypass signal for the silent pass-through lifecycle callbacks that
/// never touch the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Band(Band),
    /// Lifecycle callback (`forget`/`release`/`releasedir`/`getspec`):
    /// run inline, never queued.
    Bypass,
}

/// Classifies `kind` given whether the caller is low-trust and whether
/// `enable-least-priority` is on. Rules applied in order:
///
/// 1. Low-trust caller + `enable-least-priority` -> forced onto `Least`,
///    regardless of kind. The low-trust check short-circuits before the
///    kind table even for the lifecycle callbacks below.
/// 2. Otherwise, the fixed table below.
pub fn classify(
    kind: OpKind,
    caller: CallerOrigin,
    least_priority_enabled: bool,
) -> Result<Classification, Error> {
    if least_priority_enabled && caller.is_low_trust() {
        return Ok(Classification::Band(Band::Least));
    }

    use OpKind::*;
    let band = match kind {
        Open | Stat | Fstat | Lookup | Access | Readlink | Opendir | Statfs | Readdir
        | Readdirp | GetActiveLk | SetActiveLk => Band::Hi,

        Create | Flush | Lk | Inodelk | Finodelk | Entrylk | Fentrylk | Lease | Unlink
        | Setattr | Fsetattr | Mknod | Mkdir | Rmdir | Symlink | Rename | Link | Setxattr
        | Getxattr | Fgetxattr | Fsetxattr | Removexattr | Fremovexattr => Band::Normal,

        Read | Write | Fsync | Truncate | Ftruncate | Fsyncdir | Xattrop | Fxattrop
        | Rchecksum | Fallocate | Discard | Zerofill => Band::Lo,

        Forget | Release | Releasedir | Getspec => return Ok(Classification::Bypass),

        Other(name) => return Err(Error::InvalidKind(name)),
    };
    Ok(Classification::Band(band))
}
