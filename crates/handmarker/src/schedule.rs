//! Fixed-rate scheduling with cooperative cancellation.

use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// A cloneable flag requesting that long-running loops return.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Every clone of this flag observes the request.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Invokes a callback at a fixed interval.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Creates a ticker firing `hz` times per second.
    ///
    /// `hz` must be non-zero.
    pub fn from_hz(hz: u32) -> Self {
        Self::new(Duration::from_secs(1) / hz)
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `tick` once per interval until `shutdown` is requested or `tick` returns
    /// [`ControlFlow::Break`].
    ///
    /// `shutdown` is checked before every tick, so `tick` is never invoked once shutdown has been
    /// requested. If a tick takes longer than the interval, the deadlines it overran are skipped
    /// rather than run back to back.
    ///
    /// Returns the number of ticks that were run.
    pub fn run(&mut self, shutdown: &Shutdown, mut tick: impl FnMut() -> ControlFlow<()>) -> u64 {
        let mut ticks = 0;
        let mut deadline = Instant::now();
        loop {
            if shutdown.is_requested() {
                log::debug!("ticker stopped after {ticks} ticks");
                return ticks;
            }

            ticks += 1;
            if tick().is_break() {
                return ticks;
            }

            deadline = next_deadline(deadline + self.interval, Instant::now(), self.interval);
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
    }
}

/// Returns `deadline` if it still lies ahead of `now`, otherwise the first deadline on the same
/// grid of `interval`s that comes after `now`.
fn next_deadline(deadline: Instant, now: Instant, interval: Duration) -> Instant {
    if deadline >= now {
        return deadline;
    }

    let behind = (now - deadline).as_nanos();
    let interval_nanos = interval.as_nanos();
    if interval_nanos == 0 {
        return now;
    }
    log::trace!(
        "tick overran, skipping {} deadlines",
        behind / interval_nanos + 1
    );
    let into_interval = u64::try_from(behind % interval_nanos).unwrap_or(u64::MAX);
    now + interval.saturating_sub(Duration::from_nanos(into_interval))
}
