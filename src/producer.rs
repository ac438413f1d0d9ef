//! The tail advancer, the producer role of the experiment.
//!
//! Each step reads the tail cell, suspends for the configured delay, reads the
//! tail again and only writes `(tail + 1) % n` back if the value did not
//! change in the meantime. That re-check is a stale check-then-act: it does
//! not prevent the race, since a shift may still land between the second read
//! and the write, and it stays exactly as weak in the unsynchronized run.

use rand::Rng;
use tracing::{info, trace};

use crate::cfg::sync::Arc;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exclusion::Exclusion;
use crate::state::Shared;

/// What one producer step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The tail cell was advanced to `value`; `count` advances so far.
    Advanced {
        /// The value written to the tail cell.
        value: u32,
        /// Producer steps committed, this one included.
        count: usize,
    },
    /// The tail changed during the delay and the write was skipped.
    Skipped {
        /// Tail value read before the delay.
        expected: u32,
        /// Tail value read after the delay.
        found: u32,
    },
}

/// Repeatedly advances the tail cell in bursts.
pub struct TailAdvancer<E> {
    shared: Arc<Shared<E>>,
    config: Config,
}

impl<E: Exclusion> TailAdvancer<E> {
    /// Creates the producer role of a run.
    pub fn new(shared: Arc<Shared<E>>, config: &Config) -> Self {
        Self { shared, config: config.clone() }
    }

    /// Runs one read, delay, re-check and write sequence on the tail cell,
    /// as a single critical section of the run's [`Exclusion`].
    ///
    /// Returns [`Error::Interrupted`] without writing if the run is
    /// cancelled during the delay.
    pub fn step(&self) -> Result<StepOutcome> {
        let shared = &*self.shared;
        shared.exclusion().critical(|| -> Result<StepOutcome> {
            let slots = shared.slots();
            let next_in = slots.read_tail();
            shared.suspend(self.config.delay)?;
            let found = slots.read_tail();
            if found != next_in {
                return Ok(StepOutcome::Skipped { expected: next_in, found });
            }
            // `validate` keeps the slot count within `u32`.
            let value = ((next_in as usize + 1) % slots.len()) as u32;
            slots.write_tail(value);
            let count = shared.count_producer_step();
            Ok(StepOutcome::Advanced { value, count })
        })
    }

    /// Attempts `burst` steps, stopping early once the run is cancelled or
    /// the budget is reached.
    ///
    /// Returns the number of committed advances.
    pub fn run_burst(&self) -> usize {
        let mut advanced = 0;
        for _ in 0..self.config.burst {
            if self.should_stop() {
                break;
            }
            match self.step() {
                Ok(StepOutcome::Advanced { value, count }) => {
                    info!(count, value, "so far okay: tail advanced");
                    advanced += 1;
                }
                Ok(StepOutcome::Skipped { expected, found }) => {
                    trace!(expected, found, "tail moved during delay, step skipped");
                }
                // The loop condition decides whether to go on.
                Err(Error::Interrupted) => trace!("producer step interrupted"),
                Err(err) => trace!(%err, "producer step failed"),
            }
        }
        advanced
    }

    /// Runs bursts separated by random idle intervals until the run is
    /// cancelled or the budget is reached.
    pub fn run<G>(&self, rng: &mut G)
    where
        G: Rng + ?Sized,
    {
        while !self.should_stop() {
            self.run_burst();
            if self.shared.suspend_idle(rng, self.config.idle).is_err() {
                trace!("producer idle interrupted");
            }
        }
    }

    /// Polled before every step. The cancellation flags are read lock-free,
    /// the step counter only inside the run's [`Exclusion`].
    fn should_stop(&self) -> bool {
        let shared = &*self.shared;
        shared.is_cancelled()
            || shared.exclusion().critical(|| self.config.budget_reached(shared.producer_steps()))
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::time::Duration;
    use std::sync::Arc;

    use rand::rngs::mock::StepRng;

    use super::{StepOutcome, TailAdvancer};
    use crate::config::Config;
    use crate::error::Error;
    use crate::exclusion::{Guarded, Unguarded};
    use crate::state::Shared;
    use crate::test::Counting;

    fn config(slots: usize) -> Config {
        Config::default().with_slots(slots).with_delay(Duration::ZERO).with_idle(Duration::ZERO)
    }

    #[test]
    fn step_advances_tail_modulo_len() {
        let config = config(3);
        let shared = Arc::new(Shared::<Unguarded>::new(config.slots));
        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        let values: Vec<_> = (0..4)
            .map(|_| match producer.step().unwrap() {
                StepOutcome::Advanced { value, .. } => value,
                skipped => panic!("unexpected {skipped:?}"),
            })
            .collect();
        assert_eq!(values, [1, 2, 0, 1]);
        assert_eq!(shared.producer_steps(), 4);
    }

    #[test]
    fn single_slot_tail_stays_zero() {
        let config = config(1);
        let shared = Arc::new(Shared::<Guarded>::new(config.slots));
        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        assert_eq!(producer.step().unwrap(), StepOutcome::Advanced { value: 0, count: 1 });
        assert_eq!(shared.slots().read_head(), 0);
    }

    #[test]
    fn cancelled_step_does_not_write() {
        let config = config(4).with_delay(Duration::from_millis(1));
        let shared = Arc::new(Shared::<Unguarded>::new(config.slots));
        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        shared.halt();
        assert!(matches!(producer.step(), Err(Error::Interrupted)));
        assert_eq!(shared.slots().snapshot(), [0; 4]);
        assert_eq!(shared.producer_steps(), 0);
    }

    #[test]
    fn burst_is_capped_by_budget() {
        let config = config(10).with_burst(5).with_budget(3);
        let shared = Arc::new(Shared::<Guarded>::new(config.slots));
        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        assert_eq!(producer.run_burst(), 3);
        assert_eq!(producer.run_burst(), 0);
        assert_eq!(shared.slots().read_tail(), 3);
    }

    #[test]
    fn budget_poll_enters_exclusion() {
        let config = config(10).with_burst(2).with_budget(5);
        let shared = Arc::new(Shared::<Counting>::new(config.slots));
        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        assert_eq!(producer.run_burst(), 2);
        // One poll and one step per attempt.
        assert_eq!(shared.exclusion().sections(), 4);
    }

    #[test]
    fn run_stops_at_budget() {
        let config = config(10).with_burst(2).with_budget(5);
        let shared = Arc::new(Shared::<Unguarded>::new(config.slots));
        let producer = TailAdvancer::new(Arc::clone(&shared), &config);
        producer.run(&mut StepRng::new(0, 1));
        assert_eq!(shared.producer_steps(), 5);
    }
}
