// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Priority-scheduled, dynamically-sized I/O worker pool core.
//!
//! This crate is a pass-through stage in a layered storage pipeline: a
//! caller thread classifies an incoming operation into one of four
//! priority bands ([`Band`]), the scheduler places it on that band's FIFO
//! queue, and a worker thread eventually dequeues it and invokes the
//! caller-supplied resume continuation.
//!
//! The crate owns scheduling only. The embedding pipeline, the shape of a
//! filesystem operation, and the resume/unwind machinery that actually
//! forwards work to the next stage are external: this crate only consumes
//! a [`Resume`](op::Resume) continuation and a `report_failure` callback
//! supplied at [`Pool::new`](pool::Pool::new) time.

pub mod band;
pub mod classify;
pub mod config;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod op;
pub mod pool;
mod throttle;
mod watchdog;
mod worker;

pub use band::Band;
pub use config::Config;
pub use error::Error;
pub use op::{CallerOrigin, DeferredOp, OpKind, Resume};
pub use pool::{Pool, PoolDump};
