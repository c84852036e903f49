// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Token-bucket-style rate limiter on the `Least` band.
//!
//! Called only when a worker is about to dequeue a `Least` item, under the
//! scheduler's main mutex plus this module's own lock, kept distinct from
//! the main mutex on purpose (see DESIGN.md).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::THROTTLE_WINDOW_SECS;

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Don't consume; the caller should sleep until this deadline and
    /// re-scan.
    DeferUntil(Instant),
}

#[derive(Debug)]
struct Window {
    /// Window start. `None` means the window has never been initialized.
    sample_time: Option<Instant>,
    sample_cnt: u32,
    /// Previous window's final count, exposed for introspection.
    cached_rate: u32,
}

/// Sliding-window counter producing a defer-until timestamp once the
/// configured rate is exceeded. `rate_limit == 0` disables throttling.
#[derive(Debug)]
pub struct Throttle {
    rate_limit: AtomicU32,
    window: Mutex<Window>,
}

impl Throttle {
    pub fn new(rate_limit: u32) -> Self {
        Throttle {
            rate_limit: AtomicU32::new(rate_limit),
            window: Mutex::new(Window {
                sample_time: None,
                sample_cnt: 0,
                cached_rate: 0,
            }),
        }
    }

    /// Reconfigurable live, like the other `Config` fields.
    pub fn set_rate_limit(&self, rate_limit: u32) {
        self.rate_limit.store(rate_limit, Ordering::Relaxed);
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limit.load(Ordering::Relaxed)
    }

    pub fn cached_rate(&self) -> u32 {
        self.window.lock().cached_rate
    }

    /// Accepts or defers a single `Least` dequeue attempt against the
    /// current window.
    pub fn check(&self, now: Instant) -> Decision {
        let mut w = self.window.lock();

        // Step 1: first call ever, initialize the window and accept
        // without counting this op against it.
        if w.sample_time.is_none() {
            w.sample_time = Some(now);
            return Decision::Accept;
        }
        let sample_time = w.sample_time.unwrap();

        // Step 2: roll the window over if it has fully elapsed.
        let window_len = Duration::from_secs(THROTTLE_WINDOW_SECS);
        if now.saturating_duration_since(sample_time) >= window_len {
            w.cached_rate = w.sample_cnt;
            w.sample_cnt = 0;
            w.sample_time = Some(now);
        }

        // Step 3: over budget -> defer without consuming.
        let rate_limit = self.rate_limit();
        if rate_limit > 0 && w.sample_cnt >= rate_limit {
            let wake_at = w.sample_time.unwrap() + window_len;
            return Decision::DeferUntil(wake_at);
        }

        // Step 4: accept and count it.
        w.sample_cnt += 1;
        Decision::Accept
    }
}
