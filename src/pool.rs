// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! The shared scheduler state, enqueue/growth, dequeue, and pool lifecycle.

use std::collections::VecDeque;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::band::{Band, ALL_BANDS, BAND_COUNT};
use crate::classify::{classify, Classification};
use crate::config::{Config, MIN_THREADS};
use crate::error::Error;
use crate::metrics::{
    IOT_BAND_LIMIT_GAUGE_VEC, IOT_QUEUE_SIZE_GAUGE_VEC, IOT_WORKER_COUNT_GAUGE_VEC,
};
use crate::op::{CallerOrigin, DeferredOp, OpKind, Resume};
use crate::throttle::{Decision, Throttle};
use crate::watchdog::{self, WatchdogHandle, WatchdogState};
use crate::worker;

/// A spawned worker's default stack size, set via `thread::Builder`.
pub const WORKER_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Scheduler state guarded by [`Shared::inner`].
pub(crate) struct Inner {
    pub reqs: [VecDeque<DeferredOp>; BAND_COUNT],
    pub queue_sizes: [usize; BAND_COUNT],
    pub queue_size: usize,
    pub ac_iot_count: [usize; BAND_COUNT],
    pub ac_iot_limit: [usize; BAND_COUNT],
    pub queue_marked: [bool; BAND_COUNT],
    pub curr_count: usize,
    pub sleep_count: usize,
    pub max_count: usize,
    pub idle_time: Duration,
    pub fops_per_thread_ratio: i64,
    pub least_priority: bool,
    pub down: bool,
}

impl Inner {
    fn from_config(config: &Config) -> Self {
        Inner {
            reqs: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
            queue_sizes: [0; BAND_COUNT],
            queue_size: 0,
            ac_iot_count: [0; BAND_COUNT],
            ac_iot_limit: config.ac_iot_limits(),
            queue_marked: [false; BAND_COUNT],
            curr_count: 0,
            sleep_count: 0,
            max_count: config.thread_count,
            idle_time: Duration::from_secs(config.idle_time_secs),
            fops_per_thread_ratio: config.fops_per_thread_ratio,
            least_priority: config.enable_least_priority,
            down: false,
        }
    }
}

/// Outcome of [`Shared::dequeue`].
pub(crate) enum DequeueOutcome {
    Op(DeferredOp, Band),
    /// Work exists but every non-empty band is at its concurrency cap.
    /// There is nothing to wait on (no band is due to unblock at a known
    /// time), so the worker loop idle-waits the same way it does on an
    /// empty queue rather than busy-spinning the lock.
    Empty,
    DeferUntil(Instant),
}

/// State shared by the pool handle, every worker thread, and the watchdog
/// thread. Lives behind an `Arc`; workers hold a clone, not a reference,
/// so the pool can be dropped while workers finish draining.
pub(crate) struct Shared {
    pub inner: Mutex<Inner>,
    pub cv: Condvar,
    pub throttle: Throttle,
    pub watchdog: WatchdogHandle,
    pub watchdog_secs: AtomicU64,
    report_failure: Box<dyn Fn(OpKind, Error) + Send + Sync>,
    self_weak: std::sync::Weak<Shared>,
}

impl Shared {
    fn enqueue(&self, band: Band, op: DeferredOp) {
        let mut inner = self.inner.lock();
        let i = band.index();
        inner.reqs[i].push_back(op);
        inner.queue_sizes[i] += 1;
        inner.queue_size += 1;
        IOT_QUEUE_SIZE_GAUGE_VEC
            .with_label_values(&[band.introspection_name()])
            .set(inner.queue_sizes[i] as i64);

        let active = inner.curr_count.saturating_sub(inner.sleep_count);
        let should_grow = inner.fops_per_thread_ratio == 0
            || active == 0
            || (inner.queue_size / active) as i64 > inner.fops_per_thread_ratio
                && active < inner.max_count;

        if should_grow {
            self.cv.notify_one();
            self.scale_up(&mut inner);
        }
    }

    /// Spawns up to the computed scale, called with `inner` already locked.
    fn scale_up(&self, inner: &mut Inner) {
        let mut sum = 0usize;
        for band in ALL_BANDS {
            let i = band.index();
            sum += inner.queue_sizes[i].min(inner.ac_iot_limit[i]);
        }
        let scale = sum.clamp(MIN_THREADS, inner.max_count);

        if inner.curr_count < scale {
            let to_spawn = scale - inner.curr_count;
            for _ in 0..to_spawn {
                match self.spawn_worker() {
                    Ok(()) => inner.curr_count += 1,
                    Err(err) => {
                        slog_global::warn!(
                            "failed to spawn io-threads worker, will retry on next submit";
                            "error" => format!("{}", err),
                        );
                        break;
                    }
                }
            }
            IOT_WORKER_COUNT_GAUGE_VEC
                .with_label_values(&["live"])
                .set(inner.curr_count as i64);
        }
    }

    fn spawn_worker(&self) -> std::io::Result<()> {
        let shared = self
            .self_weak
            .upgrade()
            .expect("Shared outlives every thread spawned from it");
        thread::Builder::new()
            .name("io-threads-worker".into())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || worker::run(shared))?;
        Ok(())
    }

    /// Scans bands in priority order and detaches the first eligible head,
    /// called with `inner` already locked.
    pub(crate) fn dequeue(&self, inner: &mut Inner, now: Instant) -> DequeueOutcome {
        for band in ALL_BANDS {
            let i = band.index();
            if inner.reqs[i].is_empty() || inner.ac_iot_count[i] >= inner.ac_iot_limit[i] {
                continue;
            }
            if band == Band::Least {
                if let Decision::DeferUntil(wake_at) = self.throttle.check(now) {
                    return DequeueOutcome::DeferUntil(wake_at);
                }
            }
            let op = inner.reqs[i]
                .pop_front()
                .expect("band checked non-empty above");
            inner.queue_sizes[i] -= 1;
            inner.queue_size -= 1;
            inner.ac_iot_count[i] += 1;
            inner.queue_marked[i] = false;
            return DequeueOutcome::Op(op, band);
        }
        DequeueOutcome::Empty
    }

    pub(crate) fn report_failure(&self, kind: OpKind, err: Error) {
        (self.report_failure)(kind, err);
    }
}

/// Handle to a running priority worker pool. Cheap to clone (wraps an
/// `Arc`); `Pool::shutdown` may be called from any clone.
pub struct Pool {
    shared: Arc<Shared>,
    watchdog_join: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Snapshot returned by [`Pool::priv_dump`], the periodic state-dump hook.
#[derive(Debug, Clone)]
pub struct PoolDump {
    pub max_count: usize,
    pub curr_count: usize,
    pub sleep_count: usize,
    pub idle_time: Duration,
    pub stack_size: usize,
    pub ac_iot_limit: [usize; BAND_COUNT],
    pub cached_least_rate: u32,
    pub configured_least_rate_limit: u32,
}

impl Pool {
    /// Builds the pool, validates `config`, and spawns the initial worker
    /// wave plus the watchdog thread (only if `config.watchdog_secs > 0`).
    /// Fails with [`Error::InitFailure`] before any thread is spawned if
    /// `config` is invalid.
    pub fn new(
        config: Config,
        report_failure: impl Fn(OpKind, Error) + Send + Sync + 'static,
    ) -> Result<Arc<Pool>, Error> {
        config.validate()?;

        let watchdog_secs = config.watchdog_secs;
        let throttle = Throttle::new(config.least_rate_limit);
        let inner = Inner::from_config(&config);

        let shared = Arc::new_cyclic(|weak| Shared {
            inner: Mutex::new(inner),
            cv: Condvar::new(),
            throttle,
            watchdog: WatchdogHandle::new(),
            watchdog_secs: AtomicU64::new(watchdog_secs),
            report_failure: Box::new(report_failure),
            self_weak: weak.clone(),
        });

        {
            let mut inner = shared.inner.lock();
            shared.scale_up(&mut inner);
        }

        // Optional; enabled when `watchdog_secs > 0` (spec.md §4.8). A
        // disabled watchdog spawns no thread at all rather than idling in a
        // no-op poll loop; `reconfigure` spawns one on demand if the pool is
        // later turned on live.
        let watchdog_join = if watchdog_secs > 0 {
            Some(spawn_watchdog(&shared)?)
        } else {
            None
        };

        for band in ALL_BANDS {
            IOT_BAND_LIMIT_GAUGE_VEC
                .with_label_values(&[band.introspection_name()])
                .set(shared.inner.lock().ac_iot_limit[band.index()] as i64);
        }

        Ok(Arc::new(Pool {
            shared,
            watchdog_join: Mutex::new(watchdog_join),
        }))
    }

    /// The one generic submission entry point. Classifies `kind`
    /// given `caller`, then either runs `resume` inline (silent
    /// pass-through kinds), enqueues it, or reports failure through the
    /// embedder's callback and returns the same error.
    pub fn submit_op(
        &self,
        kind: OpKind,
        caller: CallerOrigin,
        resume: Box<dyn Resume>,
    ) -> Result<(), Error> {
        let least_priority = self.shared.inner.lock().least_priority;
        match classify(kind, caller, least_priority) {
            Ok(Classification::Bypass) => {
                resume.run();
                Ok(())
            }
            Ok(Classification::Band(band)) => {
                self.shared.enqueue(band, DeferredOp::new(kind, resume));
                Ok(())
            }
            Err(err) => {
                self.shared.report_failure(kind, err.clone());
                Err(err)
            }
        }
    }

    /// Applies `config` live. Per-band caps, the growth ratio,
    /// low-trust routing, idle timeout, and the LEAST rate limit all take
    /// effect on the next scheduling decision. The watchdog is started on
    /// demand the first time `watchdog_secs` goes from `0` to positive
    /// (or after a prior watchdog thread has already exited because it was
    /// disabled); it stops itself on its next wakeup if `watchdog_secs`
    /// goes back to `0`.
    pub fn reconfigure(&self, config: Config) -> Result<(), Error> {
        config.validate()?;

        {
            let mut inner = self.shared.inner.lock();
            inner.max_count = config.thread_count;
            inner.ac_iot_limit = config.ac_iot_limits();
            inner.least_priority = config.enable_least_priority;
            inner.idle_time = Duration::from_secs(config.idle_time_secs);
            inner.fops_per_thread_ratio = config.fops_per_thread_ratio;
            self.shared.scale_up(&mut inner);
        }
        self.shared.throttle.set_rate_limit(config.least_rate_limit);
        self.shared
            .watchdog_secs
            .store(config.watchdog_secs, Ordering::Relaxed);

        if config.watchdog_secs > 0 {
            let mut watchdog_join = self.watchdog_join.lock();
            let needs_spawn = match watchdog_join.as_ref() {
                None => true,
                Some(handle) => handle.is_finished(),
            };
            if needs_spawn {
                *watchdog_join = Some(spawn_watchdog(&self.shared)?);
            }
        }

        for band in ALL_BANDS {
            IOT_BAND_LIMIT_GAUGE_VEC
                .with_label_values(&[band.introspection_name()])
                .set(config.ac_iot_limits()[band.index()] as i64);
        }
        Ok(())
    }

    /// Idempotent. Sets the shutdown latch, wakes every waiter, and blocks
    /// until the last worker has exited. Safe to call more than once and
    /// safe to call from [`Drop`].
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.down {
                return;
            }
            inner.down = true;
            self.shared.cv.notify_all();
            while inner.curr_count != 0 {
                self.shared.cv.wait(&mut inner);
            }
        }

        self.shared.watchdog.stop();
        if let Some(handle) = self.watchdog_join.lock().take() {
            let _ = handle.join();
        }
    }

    /// The `IO_THREADS_QUEUE_SIZE_KEY` inline introspection read. Never
    /// queued; answered directly under the lock.
    pub fn queue_size_snapshot(&self) -> HashMap<&'static str, usize> {
        let inner = self.shared.inner.lock();
        ALL_BANDS
            .iter()
            .map(|b| (b.introspection_name(), inner.queue_sizes[b.index()]))
            .collect()
    }

    /// The periodic state-dump hook.
    pub fn priv_dump(&self) -> PoolDump {
        let inner = self.shared.inner.lock();
        PoolDump {
            max_count: inner.max_count,
            curr_count: inner.curr_count,
            sleep_count: inner.sleep_count,
            idle_time: inner.idle_time,
            stack_size: WORKER_STACK_SIZE,
            ac_iot_limit: inner.ac_iot_limit,
            cached_least_rate: self.shared.throttle.cached_rate(),
            configured_least_rate_limit: self.shared.throttle.rate_limit(),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns a watchdog thread bound to `shared`'s current generation. Callers
/// (`Pool::new`, `Pool::reconfigure`) only invoke this when `watchdog_secs`
/// is positive; the thread stops itself on its next wakeup if that later
/// goes back to `0` rather than idling forever (spec.md §4.8: "Optional;
/// enabled when `watchdog_secs > 0`").
fn spawn_watchdog(shared: &Arc<Shared>) -> Result<thread::JoinHandle<()>, Error> {
    let shared = shared.clone();
    let generation = shared.watchdog.current_generation();
    thread::Builder::new()
        .name("io-threads-watchdog".into())
        .spawn(move || run_watchdog(shared, generation))
        .map_err(|e| Error::InitFailure(e.to_string()))
}

fn run_watchdog(shared: Arc<Shared>, generation: u32) {
    let mut state = WatchdogState::new();
    loop {
        if shared.watchdog.current_generation() != generation {
            return;
        }
        let watchdog_secs = shared.watchdog_secs.load(Ordering::Relaxed);
        if watchdog_secs == 0 {
            // Disabled via a live reconfigure: stop on demand instead of
            // idling in a no-op poll loop. `reconfigure` spawns a fresh
            // watchdog thread (a fresh generation's worth of state) if it's
            // turned back on later.
            return;
        }
        thread::sleep(watchdog::poll_interval(watchdog_secs));

        if shared.watchdog.current_generation() != generation {
            return;
        }
        if shared.watchdog_secs.load(Ordering::Relaxed) == 0 {
            return;
        }

        let mut inner = shared.inner.lock();
        if inner.down {
            return;
        }
        let now = Instant::now();
        let outcome = state.tick(&inner.queue_marked, &inner.queue_sizes, now);
        for band in ALL_BANDS {
            let i = band.index();
            if outcome.raise[i] {
                inner.ac_iot_limit[i] += 1;
                slog_global::warn!(
                    "io-threads watchdog raised band concurrency cap after repeated stalls";
                    "band" => band.introspection_name(),
                    "new_limit" => inner.ac_iot_limit[i],
                );
                IOT_BAND_LIMIT_GAUGE_VEC
                    .with_label_values(&[band.introspection_name()])
                    .set(inner.ac_iot_limit[i] as i64);
            }
        }
        inner.queue_marked = outcome.next_marked;
        drop(inner);

        if let Some(band) = outcome.fatal_band {
            slog_global::crit!(
                "io-threads watchdog escalation: band repeatedly stalled beyond the decay threshold";
                "band" => band.introspection_name(),
            );
            unsafe {
                libc::raise(libc::SIGTRAP);
            }
        }
    }
}
