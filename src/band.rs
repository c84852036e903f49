// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! Priority bands and their total dequeue order.

use std::fmt;

/// One of the four priority classes used for scheduling, plus the
/// `Unspec` sentinel used only before an operation has been classified.
///
/// Dequeue scans bands in declaration order, so `Hi` is tried first and
/// `Least` last: `Hi > Normal > Lo > Least`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Hi,
    Normal,
    Lo,
    Least,
    /// Not yet classified. Never queued; `classify` always resolves to one
    /// of the four real bands or rejects the operation outright.
    Unspec,
}

/// Total count of real (non-sentinel) bands. Used to size the per-band
/// arrays held by the scheduler state.
pub const BAND_COUNT: usize = 4;

/// Bands in dequeue-scan order, highest priority first.
pub const ALL_BANDS: [Band; BAND_COUNT] = [Band::Hi, Band::Normal, Band::Lo, Band::Least];

impl Band {
    /// Dense index into the per-band arrays (`queue_sizes`, `ac_iot_limit`,
    /// ...). Panics on `Unspec`, which is never stored.
    pub fn index(self) -> usize {
        match self {
            Band::Hi => 0,
            Band::Normal => 1,
            Band::Lo => 2,
            Band::Least => 3,
            Band::Unspec => unreachable!("Unspec band is never indexed"),
        }
    }

    /// The name exposed through `IO_THREADS_QUEUE_SIZE_KEY` introspection.
    pub fn introspection_name(self) -> &'static str {
        match self {
            Band::Hi => "fast",
            Band::Normal => "normal",
            Band::Lo => "slow",
            Band::Least => "least priority",
            Band::Unspec => "unspecified",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.introspection_name())
    }
}
