// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Per-operation forwarding wrappers.
//!
//! Each filesystem operation gets a one-line function over
//! [`Pool::submit_op`]; none of them carry any logic of their own, they
//! exist so an embedder can call
//! `io_threads::forward::submit_write(pool, caller, resume)` instead of
//! naming the `OpKind` explicitly at every call site.

use std::sync::Arc;

use crate::error::Error;
use crate::op::{CallerOrigin, OpKind, Resume};
use crate::pool::Pool;

macro_rules! forwarders {
    ($($fn_name:ident => $kind:ident),+ $(,)?) => {
        $(
            #[doc = concat!("Classify as `OpKind::", stringify!($kind), "` and enqueue.")]
            pub fn $fn_name(
                pool: &Arc<Pool>,
                caller: CallerOrigin,
                resume: Box<dyn Resume>,
            ) -> Result<(), Error> {
                pool.submit_op(OpKind::$kind, caller, resume)
            }
        )+
    };
}

forwarders! {
    submit_open => Open,
    submit_stat => Stat,
    submit_fstat => Fstat,
    submit_lookup => Lookup,
    submit_access => Access,
    submit_readlink => Readlink,
    submit_opendir => Opendir,
    submit_statfs => Statfs,
    submit_readdir => Readdir,
    submit_readdirp => Readdirp,
    submit_get_active_lk => GetActiveLk,
    submit_set_active_lk => SetActiveLk,

    submit_create => Create,
    submit_flush => Flush,
    submit_lk => Lk,
    submit_inodelk => Inodelk,
    submit_finodelk => Finodelk,
    submit_entrylk => Entrylk,
    submit_fentrylk => Fentrylk,
    submit_lease => Lease,
    submit_unlink => Unlink,
    submit_setattr => Setattr,
    submit_fsetattr => Fsetattr,
    submit_mknod => Mknod,
    submit_mkdir => Mkdir,
    submit_rmdir => Rmdir,
    submit_symlink => Symlink,
    submit_rename => Rename,
    submit_link => Link,
    submit_setxattr => Setxattr,
    submit_getxattr => Getxattr,
    submit_fgetxattr => Fgetxattr,
    submit_fsetxattr => Fsetxattr,
    submit_removexattr => Removexattr,
    submit_fremovexattr => Fremovexattr,

    submit_read => Read,
    submit_write => Write,
    submit_fsync => Fsync,
    submit_truncate => Truncate,
    submit_ftruncate => Ftruncate,
    submit_fsyncdir => Fsyncdir,
    submit_xattrop => Xattrop,
    submit_fxattrop => Fxattrop,
    submit_rchecksum => Rchecksum,
    submit_fallocate => Fallocate,
    submit_discard => Discard,
    submit_zerofill => Zerofill,

    submit_forget => Forget,
    submit_release => Release,
    submit_releasedir => Releasedir,
    submit_getspec => Getspec,
}
