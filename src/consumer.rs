//! The head drainer, the consumer role of the experiment.

use rand::Rng;
use tracing::{error, info, trace};

use crate::cfg::sync::Arc;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exclusion::Exclusion;
use crate::slots::violates_invariant;
use crate::state::Shared;

/// A successful drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Drained {
    /// The head value that was shifted out.
    pub head: u32,
    /// Consumer steps completed, this one included.
    pub count: usize,
}

/// Repeatedly checks the head cell and shifts the array left.
pub struct HeadDrainer<E> {
    shared: Arc<Shared<E>>,
    config: Config,
}

impl<E: Exclusion> HeadDrainer<E> {
    /// Creates the consumer role of a run.
    pub fn new(shared: Arc<Shared<E>>, config: &Config) -> Self {
        Self { shared, config: config.clone() }
    }

    /// Reads the head cell and either flags the run as raced or shifts the
    /// whole array left, as a single critical section of the run's
    /// [`Exclusion`].
    ///
    /// A head value above [`HEAD_LIMIT`] sets the race-detected flag and is
    /// returned as [`Error::InvariantViolation`]; the array is left as found.
    ///
    /// [`HEAD_LIMIT`]: crate::slots::HEAD_LIMIT
    pub fn step(&self) -> Result<Drained> {
        let shared = &*self.shared;
        shared.exclusion().critical(|| -> Result<Drained> {
            let slots = shared.slots();
            let next_out = slots.read_head();
            if violates_invariant(next_out) {
                shared.raise_race();
                return Err(Error::InvariantViolation { head: next_out });
            }
            slots.shift_left();
            let count = shared.count_consumer_step();
            Ok(Drained { head: next_out, count })
        })
    }

    /// Drains with random idle intervals until the run is cancelled, the
    /// budget is reached, or a violation is observed.
    ///
    /// The violation is logged and returned, it ends this role for good.
    pub fn drain_loop<G>(&self, rng: &mut G) -> Result<()>
    where
        G: Rng + ?Sized,
    {
        while !self.should_stop() {
            match self.step() {
                Ok(Drained { head, count }) => info!(count, head, "so far okay: head drained"),
                Err(err @ Error::InvariantViolation { .. }) => {
                    error!(%err, "race condition detected");
                    return Err(err);
                }
                Err(err) => trace!(%err, "consumer step failed"),
            }
            if self.shared.suspend_idle(rng, self.config.idle).is_err() {
                trace!("consumer idle interrupted");
            }
        }
        Ok(())
    }

    /// Polled before every step. The cancellation flags are read lock-free,
    /// the step counter only inside the run's [`Exclusion`].
    fn should_stop(&self) -> bool {
        let shared = &*self.shared;
        shared.is_cancelled()
            || shared.exclusion().critical(|| self.config.budget_reached(shared.consumer_steps()))
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::time::Duration;
    use std::sync::Arc;

    use rand::rngs::mock::StepRng;

    use super::{Drained, HeadDrainer};
    use crate::config::Config;
    use crate::error::Error;
    use crate::exclusion::{Guarded, Unguarded};
    use crate::state::Shared;
    use crate::test::Counting;

    fn config(slots: usize) -> Config {
        Config::default().with_slots(slots).with_idle(Duration::ZERO)
    }

    #[test]
    fn step_shifts_and_counts() {
        let config = config(3);
        let shared = Arc::new(Shared::<Guarded>::new(config.slots));
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        shared.slots().write_tail(1);
        assert_eq!(consumer.step().unwrap(), Drained { head: 0, count: 1 });
        assert_eq!(consumer.step().unwrap(), Drained { head: 0, count: 2 });
        assert_eq!(consumer.step().unwrap(), Drained { head: 1, count: 3 });
        assert_eq!(shared.slots().snapshot(), [0, 0, 0]);
        assert!(!shared.is_race_detected());
    }

    #[test]
    fn stacked_advance_is_detected() {
        let config = config(2);
        let shared = Arc::new(Shared::<Unguarded>::new(config.slots));
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        // Two advances between drains.
        shared.slots().write_tail(2);
        consumer.step().unwrap();
        let err = consumer.step().unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { head: 2 }));
        assert!(shared.is_race_detected());
        assert_eq!(shared.consumer_steps(), 1);
        // The corrupted state is kept for the report.
        assert_eq!(shared.slots().snapshot(), [2, 0]);
    }

    #[test]
    fn drain_loop_reports_violation() {
        let config = config(1);
        let shared = Arc::new(Shared::<Unguarded>::new(config.slots));
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        shared.slots().write_tail(3);
        let result = consumer.drain_loop(&mut StepRng::new(0, 1));
        assert!(matches!(result, Err(Error::InvariantViolation { head: 3 })));
        assert!(shared.is_cancelled());
    }

    #[test]
    fn drain_loop_stops_at_budget() {
        let config = config(4).with_budget(6);
        let shared = Arc::new(Shared::<Guarded>::new(config.slots));
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        consumer.drain_loop(&mut StepRng::new(0, 1)).unwrap();
        assert_eq!(shared.consumer_steps(), 6);
    }

    #[test]
    fn budget_poll_enters_exclusion() {
        let config = config(4).with_budget(2);
        let shared = Arc::new(Shared::<Counting>::new(config.slots));
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        consumer.drain_loop(&mut StepRng::new(0, 1)).unwrap();
        // Three polls around two drains.
        assert_eq!(shared.exclusion().sections(), 5);
    }

    #[test]
    fn drain_loop_exits_when_halted() {
        let config = config(4);
        let shared = Arc::new(Shared::<Guarded>::new(config.slots));
        let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
        shared.halt();
        consumer.drain_loop(&mut StepRng::new(0, 1)).unwrap();
        assert_eq!(shared.consumer_steps(), 0);
    }
}
