//! Strategies that determine how a thread waits while the MCS lock is held
//! somewhere else.
//!
//! The lock in [`lock`] waits in two places: a queued thread waiting for its
//! predecessor to hand the lock over, and a releasing thread waiting for a
//! successor that has swapped itself into the queue but not yet linked to it.
//! Both waits are short busy loops, and the policy applied on each iteration
//! is selected with the `R: Relax` type parameter.
//!
//! The experiment holds the lock across the tail advancer's induced delay, so
//! the head drainer may wait for tens of milliseconds. [`Yield`] is the policy
//! used by [`Guarded`] by default for that reason.
//!
//! [`lock`]: crate::lock
//! [`Guarded`]: crate::exclusion::Guarded

use crate::cfg::{hint, thread};

/// A trait implemented by spinning relax strategies.
pub trait Relax {
    /// Initialize the state for the relaxing operation, if any.
    fn new() -> Self;

    /// Perform the relaxing operation during a period of contention.
    fn relax(&mut self);
}

/// A strategy that rapidly spins while informing the CPU that it should power
/// down non-essential components via [`core::hint::spin_loop`].
///
/// Most schedulers cannot tell spinning apart from useful work. Prefer
/// [`Yield`] whenever the critical section may sleep.
#[derive(Debug)]
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// A strategy that yields the current time slice to the scheduler in favour
/// of other threads or processes.
#[derive(Debug)]
pub struct Yield;

impl Relax for Yield {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline]
    fn relax(&mut self) {
        thread::yield_now();
    }
}

/// A strategy that, as [`Spin`], will run a busy-wait spin-loop, except this
/// implementation will perform exponential backoff, and after a threshold
/// yield back to the scheduler.
// Exponential backoff is based on the crossbeam-utils implementation.
#[derive(Debug)]
pub struct SpinBackoff {
    step: u32,
}

impl SpinBackoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
}

impl Relax for SpinBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    fn relax(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..1 << self.step {
                hint::spin_loop();
            }
        } else {
            thread::yield_now();
        }
        if self.step <= Self::YIELD_LIMIT {
            self.step += 1;
        }
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{Relax, SpinBackoff};

    #[test]
    fn backoff_step_is_bounded() {
        let mut relax = SpinBackoff::new();
        for _ in 0..64 {
            relax.relax();
        }
        assert_eq!(relax.step, SpinBackoff::YIELD_LIMIT + 1);
    }
}
