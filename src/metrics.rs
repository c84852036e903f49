// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Observability only: nothing in the scheduler depends on these values.
//! Mirrors `file_system::rate_limiter`'s `lazy_static!` + `prometheus`
//! registration pattern.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec};

lazy_static! {
    /// Current `queue_sizes[band]`, updated on every enqueue/dequeue.
    pub static ref IOT_QUEUE_SIZE_GAUGE_VEC: IntGaugeVec = register_int_gauge_vec!(
        "io_threads_queue_size",
        "Current number of queued operations per priority band",
        &["band"]
    )
    .unwrap();

    /// Current `ac_iot_limit[band]`, updated on init, reconfigure and
    /// watchdog-driven raises.
    pub static ref IOT_BAND_LIMIT_GAUGE_VEC: IntGaugeVec = register_int_gauge_vec!(
        "io_threads_band_concurrency_limit",
        "Current per-band in-flight concurrency cap",
        &["band"]
    )
    .unwrap();

    /// Live worker count, sampled on every scale-up and worker exit.
    pub static ref IOT_WORKER_COUNT_GAUGE_VEC: IntGaugeVec = register_int_gauge_vec!(
        "io_threads_worker_count",
        "Live worker threads",
        &["state"]
    )
    .unwrap();

    /// Count of watchdog-observed stalls that crossed `STALL_THRESHOLD` and
    /// triggered a cap raise, per band.
    pub static ref IOT_WATCHDOG_STALL_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "io_threads_watchdog_stalls_total",
        "Watchdog-detected stalls that raised a band's concurrency cap",
        &["band"]
    )
    .unwrap();

    /// Count of watchdog fatal escalations (should stay at zero in a
    /// healthy deployment).
    pub static ref IOT_WATCHDOG_ESCALATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "io_threads_watchdog_escalations_total",
        "Watchdog decay-threshold escalations that raised a fatal signal",
        &["band"]
    )
    .unwrap();
}
