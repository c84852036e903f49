// Copyright 2026 The io-threads Authors. Licensed under Apache-2.0.
//! A single worker thread's lifecycle: SELECTING, IDLE-WAIT, RUNNING,
//! EXITING.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::band::Band;
use crate::metrics::IOT_WORKER_COUNT_GAUGE_VEC;
use crate::pool::{DequeueOutcome, Shared};

/// Entry point run on a freshly spawned worker thread. Returns when this
/// worker has exited (idle timeout below the floor being the only
/// voluntary path, or drain-on-shutdown).
pub(crate) fn run(shared: Arc<Shared>) {
    let mut held_band: Option<Band> = None;

    loop {
        let mut inner = shared.inner.lock();

        if let Some(band) = held_band.take() {
            inner.ac_iot_count[band.index()] -= 1;
        }

        let mut exiting = false;
        while inner.queue_size == 0 {
            if inner.down {
                exiting = true;
                break;
            }

            let deadline = Instant::now() + inner.idle_time;
            inner.sleep_count += 1;
            let timed_out = shared.cv.wait_until(&mut inner, deadline).timed_out();
            inner.sleep_count -= 1;

            if inner.down || timed_out {
                exiting = true;
                break;
            }
        }

        if exiting {
            if inner.down || inner.curr_count > crate::config::MIN_THREADS {
                inner.curr_count -= 1;
                let remaining = inner.curr_count;
                if remaining == 0 {
                    shared.cv.notify_all();
                }
                drop(inner);
                IOT_WORKER_COUNT_GAUGE_VEC
                    .with_label_values(&["live"])
                    .set(remaining as i64);
                return;
            }
            // Below the floor and not draining: stay alive, go select again.
        }

        match shared.dequeue(&mut inner, Instant::now()) {
            DequeueOutcome::Op(op, band) => {
                held_band = Some(band);
                drop(inner);
                op.run();
                // loop: release band credit at top of next iteration
            }
            DequeueOutcome::DeferUntil(wake_at) => {
                shared.cv.wait_until(&mut inner, wake_at);
                // inner dropped at end of scope; loop back to SELECTING
            }
            DequeueOutcome::Empty => {
                // Every non-empty band is at its concurrency cap (e.g. a
                // live reconfigure just lowered a band's limit below the
                // number of workers already competing for it). There's no
                // known wake time to wait on, so fall back to the same
                // bounded idle-wait as the empty-queue case rather than
                // busy-spinning the lock: whichever worker frees a band
                // credit notifies the condvar, or this worker times out and
                // re-evaluates its exit eligibility.
                let deadline = Instant::now() + inner.idle_time;
                inner.sleep_count += 1;
                shared.cv.wait_until(&mut inner, deadline);
                inner.sleep_count -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::op::{CallerOrigin, OpKind};
    use crate::pool::Pool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn worker_drains_fifo_order_within_a_band() {
        let pool = Pool::new(Config::default(), |_, _: Error| {}).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.submit_op(OpKind::Write, CallerOrigin::client(1), Box::new(move || {
                tx.send(i).unwrap();
            }))
            .unwrap();
        }
        drop(tx);
        let mut seen = Vec::new();
        while let Ok(v) = rx.recv_timeout(Duration::from_secs(5)) {
            seen.push(v);
            if seen.len() == 10 {
                break;
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        pool.shutdown();
    }

    #[test]
    fn idle_worker_above_minimum_exits_after_timeout() {
        let mut config = Config::default();
        config.thread_count = 4;
        config.idle_time_secs = 1;
        config.fops_per_thread_ratio = 0; // always grow toward backlog-driven scale
        let pool = Pool::new(config, |_, _: Error| {}).unwrap();

        let gate = Arc::new(std::sync::Barrier::new(5));
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let gate = gate.clone();
            let done = done.clone();
            pool.submit_op(
                OpKind::Read,
                CallerOrigin::client(1),
                Box::new(move || {
                    gate.wait();
                    done.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }
        gate.wait();
        while done.load(Ordering::SeqCst) < 4 {
            std::thread::sleep(Duration::from_millis(10));
        }

        std::thread::sleep(Duration::from_secs(3));
        assert_eq!(pool.priv_dump().curr_count, crate::config::MIN_THREADS);
        pool.shutdown();
    }
}
