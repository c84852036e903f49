// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Stall detection and decay-based escalation.
//!
//! The watchdog is a constant-space approximation of "more than
//! `THRESH_EVENTS` stall events within `THRESH_SECONDS`": each band carries
//! a seconds-counter that decays linearly with wall-clock time and jumps by
//! `THRESH_SECONDS` on every stall event. See the worked examples on
//! [`Threshold::apply_event`] for how that constant-space trick behaves.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::band::{Band, ALL_BANDS, BAND_COUNT};
use crate::config::{STALL_THRESHOLD, THRESH_EVENTS, THRESH_SECONDS};
use crate::metrics::{IOT_WATCHDOG_ESCALATION_COUNTER, IOT_WATCHDOG_STALL_COUNTER_VEC};

/// A per-band decaying stall counter.
#[derive(Debug, Clone, Copy)]
pub struct Threshold {
    value: u64,
    update_time: Option<Instant>,
}

impl Threshold {
    pub fn new() -> Self {
        Threshold {
            value: 0,
            update_time: None,
        }
    }

    /// Applies a stall event at `now`. Returns `true` if this event pushed
    /// the band over the escalation limit (the caller then raises the
    /// fatal signal).
    ///
    /// Worked examples (exact, not illustrative — the decay arithmetic
    /// below is deterministic):
    ///
    /// (a) Two events close together, then one more almost a week later.
    /// The first two events push the counter to `2*THRESH_SECONDS` plus a
    /// bit. At the third event, it decays to `THRESH_SECONDS` plus a bit
    /// and then gains another `THRESH_SECONDS`, exceeding the threshold.
    ///
    /// (b) One event, then two more almost a week later: by the second and
    /// third events the counter is already non-zero, so adding
    /// `2*THRESH_SECONDS` exceeds again.
    ///
    /// (c) Three events spaced three days apart: decays to roughly
    /// `4/7*THRESH_SECONDS` then `8/7*THRESH_SECONDS` before the third
    /// event tips it over.
    pub fn apply_event(&mut self, now: Instant) -> bool {
        if self.value > 0 {
            if let Some(update_time) = self.update_time {
                let delta = now.saturating_duration_since(update_time).as_secs();
                // Careful about underflow: clamp to zero rather than wrap.
                self.value = self.value.saturating_sub(delta);
            }
        }
        self.value += THRESH_SECONDS;
        self.update_time = Some(now);

        let limit = THRESH_SECONDS * (THRESH_EVENTS - 1);
        self.value >= limit
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-band watchdog bookkeeping that lives for the lifetime of the
/// watchdog thread: consecutive-stall counters and decay thresholds. Not
/// shared with worker threads; only the watchdog reads and writes it.
pub struct WatchdogState {
    bad_times: [u32; BAND_COUNT],
    thresholds: [Threshold; BAND_COUNT],
}

impl WatchdogState {
    pub fn new() -> Self {
        WatchdogState {
            bad_times: [0; BAND_COUNT],
            thresholds: [Threshold::new(); BAND_COUNT],
        }
    }

    /// One tick of the watchdog's per-band scan, operating on
    /// a snapshot of `queue_marked`/`queue_sizes` taken under the
    /// scheduler lock. Returns the bands whose cap should be raised by the
    /// caller (still holding the lock) and whether any band's decay
    /// counter crossed the fatal threshold.
    pub fn tick(
        &mut self,
        queue_marked: &[bool; BAND_COUNT],
        queue_sizes: &[usize; BAND_COUNT],
        now: Instant,
    ) -> TickOutcome {
        let mut raise = [false; BAND_COUNT];
        let mut fatal_band: Option<Band> = None;

        for band in ALL_BANDS {
            let i = band.index();
            if queue_marked[i] {
                self.bad_times[i] += 1;
                if self.bad_times[i] >= STALL_THRESHOLD {
                    IOT_WATCHDOG_STALL_COUNTER_VEC
                        .with_label_values(&[band.introspection_name()])
                        .inc();
                    if self.thresholds[i].apply_event(now) {
                        IOT_WATCHDOG_ESCALATION_COUNTER
                            .with_label_values(&[band.introspection_name()])
                            .inc();
                        fatal_band.get_or_insert(band);
                    }
                    raise[i] = true;
                    self.bad_times[i] = 0;
                }
            } else {
                self.bad_times[i] = 0;
            }
        }

        let mut next_marked = [false; BAND_COUNT];
        for band in ALL_BANDS {
            let i = band.index();
            next_marked[i] = queue_sizes[i] > 0;
        }

        TickOutcome {
            raise,
            next_marked,
            fatal_band,
        }
    }
}

impl Default for WatchdogState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TickOutcome {
    /// Bands whose `ac_iot_limit` should be incremented by 1.
    pub raise: [bool; BAND_COUNT],
    /// The value `queue_marked` should be reset to for the next tick.
    pub next_marked: [bool; BAND_COUNT],
    /// Set if a band's decay counter crossed the fatal escalation limit
    /// this tick.
    pub fatal_band: Option<Band>,
}

/// Watchdog poll interval: `max(watchdog_secs / 5, 1)` seconds.
pub fn poll_interval(watchdog_secs: u64) -> Duration {
    Duration::from_secs((watchdog_secs / 5).max(1))
}

/// Cancellation handle: the watchdog checks this at the top of every loop
/// iteration rather than relying on OS-level thread cancellation, which
/// Rust's std threads don't expose. Bumping the generation is how shutdown
/// tells a running watchdog loop to exit and be joined.
#[derive(Debug, Default)]
pub struct WatchdogHandle {
    generation: AtomicU32,
}

impl WatchdogHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumping the generation tells any running watchdog loop for a prior
    /// generation to exit at its next wakeup.
    pub fn stop(&self) -> u32 {
        self.generation.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_generation(&self) -> u32 {
        self.generation.load(Ordering::SeqCst)
    }
}
