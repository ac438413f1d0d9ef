//! State shared by the two workers of one run.
//!
//! [`Shared`] is the single owner of the slot array, both step counters and
//! the cancellation flags. Workers hold it through an `Arc` and never copy any
//! of it.

use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use core::time::Duration;

use rand::Rng;

use crate::cfg::atomic::{AtomicBool, AtomicUsize};
use crate::error::{Error, Result};
use crate::exclusion::Exclusion;
use crate::slots::SlotArray;

/// Number of workers in a run.
pub(crate) const WORKERS: usize = 2;

/// The run state seen by both roles.
pub struct Shared<E> {
    slots: SlotArray,
    exclusion: E,
    producer_steps: AtomicUsize,
    consumer_steps: AtomicUsize,
    signal: Signal,
}

impl<E: Exclusion> Shared<E> {
    /// Creates the state for a run over `len` slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: SlotArray::new(len),
            exclusion: E::new(),
            producer_steps: AtomicUsize::new(0),
            consumer_steps: AtomicUsize::new(0),
            signal: Signal::new(),
        }
    }
}

impl<E> Shared<E> {
    /// The slot array under test.
    pub fn slots(&self) -> &SlotArray {
        &self.slots
    }

    /// The policy wrapping every step.
    pub fn exclusion(&self) -> &E {
        &self.exclusion
    }

    /// Number of committed tail advances.
    pub fn producer_steps(&self) -> usize {
        self.producer_steps.load(Relaxed)
    }

    /// Number of completed drains.
    pub fn consumer_steps(&self) -> usize {
        self.consumer_steps.load(Relaxed)
    }

    /// Records a committed tail advance and returns the new count.
    pub(crate) fn count_producer_step(&self) -> usize {
        self.producer_steps.fetch_add(1, Relaxed) + 1
    }

    /// Records a completed drain and returns the new count.
    pub(crate) fn count_consumer_step(&self) -> usize {
        self.consumer_steps.fetch_add(1, Relaxed) + 1
    }

    /// Returns `true` once the head drainer observed a violation.
    ///
    /// May be read without holding the step lock.
    pub fn is_race_detected(&self) -> bool {
        self.signal.raced.load(Acquire)
    }

    /// Returns `true` once the harness stopped the run from outside.
    pub fn is_halted(&self) -> bool {
        self.signal.halted.load(Acquire)
    }

    /// Returns `true` if workers must stop scheduling steps.
    pub fn is_cancelled(&self) -> bool {
        self.is_race_detected() || self.is_halted()
    }

    /// Marks the run as corrupted and wakes every suspended worker.
    ///
    /// Must be called from within the step that observed the violation.
    pub(crate) fn raise_race(&self) {
        self.signal.raise(&self.signal.raced);
    }

    /// Stops the run without a verdict and wakes every suspended worker.
    pub fn halt(&self) {
        self.signal.raise(&self.signal.halted);
    }

    /// Suspends the calling worker for `duration`.
    ///
    /// Returns [`Error::Interrupted`] if the run is, or becomes, cancelled
    /// before the time is up.
    pub fn suspend(&self, duration: Duration) -> Result<()> {
        self.signal.suspend(duration, || self.is_cancelled())
    }

    /// Suspends the calling worker for a random interval in `[0, bound)`.
    ///
    /// This is the idle backoff between bursts and drains.
    pub fn suspend_idle<G>(&self, rng: &mut G, bound: Duration) -> Result<()>
    where
        G: Rng + ?Sized,
    {
        let idle = if bound.is_zero() { Duration::ZERO } else { rng.gen_range(Duration::ZERO..bound) };
        self.suspend(idle)
    }

    /// Records that one worker left its loop.
    pub(crate) fn worker_exited(&self) {
        self.signal.exited.fetch_add(1, AcqRel);
        self.signal.notify();
    }

    /// Returns `true` once both workers left their loops.
    pub fn workers_exited(&self) -> bool {
        self.signal.exited.load(Acquire) >= WORKERS
    }
}

/// Cancellation flags plus the means to wake suspended workers.
struct Signal {
    raced: AtomicBool,
    halted: AtomicBool,
    exited: AtomicUsize,
    #[cfg(not(all(loom, test)))]
    gate: parking_lot::Mutex<()>,
    #[cfg(not(all(loom, test)))]
    wake: parking_lot::Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            raced: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            exited: AtomicUsize::new(0),
            #[cfg(not(all(loom, test)))]
            gate: parking_lot::Mutex::new(()),
            #[cfg(not(all(loom, test)))]
            wake: parking_lot::Condvar::new(),
        }
    }

    fn raise(&self, flag: &AtomicBool) {
        flag.store(true, Release);
        self.notify();
    }
}

#[cfg(not(all(loom, test)))]
impl Signal {
    fn notify(&self) {
        // Taking the gate orders this wakeup after any waiter's condition check.
        let _gate = self.gate.lock();
        self.wake.notify_all();
    }

    fn suspend<C>(&self, duration: Duration, cancelled: C) -> Result<()>
    where
        C: Fn() -> bool,
    {
        if !duration.is_zero() {
            let mut gate = self.gate.lock();
            self.wake.wait_while_for(&mut gate, |_| !cancelled(), duration);
        }
        if cancelled() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Blocks until `done` holds or `timeout` elapses. Returns the final value
    /// of `done`.
    fn wait_until<C>(&self, timeout: Option<Duration>, done: C) -> bool
    where
        C: Fn() -> bool,
    {
        let mut gate = self.gate.lock();
        match timeout {
            Some(timeout) => {
                self.wake.wait_while_for(&mut gate, |_| !done(), timeout);
            }
            None => self.wake.wait_while(&mut gate, |_| !done()),
        }
        done()
    }
}

// Loom has no notion of time: a suspension is a scheduling point.
#[cfg(all(loom, test))]
impl Signal {
    fn notify(&self) {}

    fn suspend<C>(&self, _duration: Duration, cancelled: C) -> Result<()>
    where
        C: Fn() -> bool,
    {
        crate::cfg::thread::yield_now();
        if cancelled() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

#[cfg(not(all(loom, test)))]
impl<E> Shared<E> {
    /// Blocks the harness until both workers exit, the run is cancelled, or
    /// `timeout` elapses.
    ///
    /// Returns `false` on timeout.
    pub(crate) fn wait_workers(&self, timeout: Option<Duration>) -> bool {
        self.signal.wait_until(timeout, || self.is_cancelled() || self.workers_exited())
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::Shared;
    use crate::error::Error;
    use crate::exclusion::Unguarded;

    #[test]
    fn counters_start_at_zero() {
        let shared = Shared::<Unguarded>::new(3);
        assert_eq!(shared.producer_steps(), 0);
        assert_eq!(shared.consumer_steps(), 0);
        assert_eq!(shared.count_producer_step(), 1);
        assert_eq!(shared.count_consumer_step(), 1);
        assert!(!shared.is_cancelled());
    }

    #[test]
    fn suspend_sleeps_for_real() {
        let shared = Shared::<Unguarded>::new(1);
        let start = Instant::now();
        shared.suspend(Duration::from_millis(20)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn suspend_after_cancel_is_interrupted() {
        let shared = Shared::<Unguarded>::new(1);
        shared.raise_race();
        assert!(matches!(shared.suspend(Duration::ZERO), Err(Error::Interrupted)));
        assert!(shared.is_race_detected());
        assert!(!shared.is_halted());
    }

    #[test]
    fn halt_wakes_suspended_worker() {
        let shared = Arc::new(Shared::<Unguarded>::new(1));
        let worker = thread::spawn({
            let shared = Arc::clone(&shared);
            move || {
                let start = Instant::now();
                let result = shared.suspend(Duration::from_secs(30));
                (result, start.elapsed())
            }
        });
        thread::sleep(Duration::from_millis(20));
        shared.halt();
        let (result, elapsed) = worker.join().unwrap();
        assert!(matches!(result, Err(Error::Interrupted)));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn wait_workers_times_out() {
        let shared = Shared::<Unguarded>::new(1);
        assert!(!shared.wait_workers(Some(Duration::from_millis(10))));
        shared.worker_exited();
        shared.worker_exited();
        assert!(shared.wait_workers(Some(Duration::from_millis(10))));
    }
}
