// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Tunables, with defaults and validation bounds, plus live reconfiguration
//! support.

use serde::{Deserialize, Serialize};

use crate::band::{Band, BAND_COUNT};
use crate::error::Error;

/// Minimum live worker count (`IOT_MIN_THREADS`). Workers below this floor
/// never voluntarily exit on idle timeout.
pub const MIN_THREADS: usize = 1;

/// Upper bound accepted for `thread_count` and the per-band thread caps.
/// A generous but finite ceiling (see DESIGN.md for why 64 was chosen).
pub const MAX_THREADS: usize = 64;

pub const MIN_FOP_PER_THREAD: i64 = 0;
pub const MAX_FOP_PER_THREAD: i64 = 100_000;

/// Seconds in one rate-limiter window.
pub const THROTTLE_WINDOW_SECS: u64 = 1;

/// Consecutive-stall count before the watchdog raises a band's cap.
pub const STALL_THRESHOLD: u32 = 5;

/// Decay-window constants for the watchdog's per-band threshold.
pub const THRESH_SECONDS: u64 = 604_800; // one week
pub const THRESH_EVENTS: u64 = 3;

/// Live, reconfigurable tunables. Everything here may be changed after
/// [`crate::pool::Pool::new`] via [`crate::pool::Pool::reconfigure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `thread-count`: the hard ceiling on live workers (`max_count`).
    pub thread_count: usize,
    /// `fops-per-thread-ratio`: backlog-per-worker the scheduler tolerates
    /// before growing. Zero means "always consider growing".
    pub fops_per_thread_ratio: i64,
    /// `high-prio-threads`: `ac_iot_limit[Hi]`.
    pub high_prio_threads: usize,
    /// `normal-prio-threads`: `ac_iot_limit[Normal]`.
    pub normal_prio_threads: usize,
    /// `low-prio-threads`: `ac_iot_limit[Lo]`.
    pub low_prio_threads: usize,
    /// `least-prio-threads`: `ac_iot_limit[Least]`.
    pub least_prio_threads: usize,
    /// `enable-least-priority`: force low-trust callers onto `Least`.
    pub enable_least_priority: bool,
    /// `idle-time`: seconds a worker waits with no work before exiting
    /// (subject to `MIN_THREADS`).
    pub idle_time_secs: u64,
    /// `least-rate-limit`: ops per `THROTTLE_WINDOW` on the `Least` band.
    /// Zero disables throttling.
    pub least_rate_limit: u32,
    /// `watchdog-secs`: watchdog poll base. Zero disables the watchdog.
    pub watchdog_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            thread_count: 16,
            fops_per_thread_ratio: 20,
            high_prio_threads: 16,
            normal_prio_threads: 16,
            low_prio_threads: 16,
            least_prio_threads: 1,
            enable_least_priority: true,
            idle_time_secs: 120,
            least_rate_limit: 0,
            watchdog_secs: 0,
        }
    }
}

impl Config {
    /// Per-band `ac_iot_limit` initial values, in [`crate::band::ALL_BANDS`]
    /// order.
    pub fn ac_iot_limits(&self) -> [usize; BAND_COUNT] {
        let mut limits = [0usize; BAND_COUNT];
        limits[Band::Hi.index()] = self.high_prio_threads;
        limits[Band::Normal.index()] = self.normal_prio_threads;
        limits[Band::Lo.index()] = self.low_prio_threads;
        limits[Band::Least.index()] = self.least_prio_threads;
        limits
    }

    /// Validates each field against its allowed `min`/`max` range. Called
    /// from `Pool::new` and `reconfigure`.
    pub fn validate(&self) -> Result<(), Error> {
        let in_thread_range = |v: usize| (MIN_THREADS..=MAX_THREADS).contains(&v);
        if !in_thread_range(self.thread_count) {
            return Err(Error::InitFailure(format!(
                "thread-count {} out of range [{}, {}]",
                self.thread_count, MIN_THREADS, MAX_THREADS
            )));
        }
        for (name, v) in [
            ("high-prio-threads", self.high_prio_threads),
            ("normal-prio-threads", self.normal_prio_threads),
            ("low-prio-threads", self.low_prio_threads),
            ("least-prio-threads", self.least_prio_threads),
        ] {
            if !in_thread_range(v) {
                return Err(Error::InitFailure(format!(
                    "{} {} out of range [{}, {}]",
                    name, v, MIN_THREADS, MAX_THREADS
                )));
            }
        }
        if !(MIN_FOP_PER_THREAD..=MAX_FOP_PER_THREAD).contains(&self.fops_per_thread_ratio) {
            return Err(Error::InitFailure(format!(
                "fops-per-thread-ratio {} out of range [{}, {}]",
                self.fops_per_thread_ratio, MIN_FOP_PER_THREAD, MAX_FOP_PER_THREAD
            )));
        }
        if self.idle_time_secs == 0 {
            return Err(Error::InitFailure(
                "idle-time must be at least 1 second".into(),
            ));
        }
        Ok(())
    }
}
