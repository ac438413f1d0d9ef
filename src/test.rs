use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use core::time::Duration;

use crate::cfg::sync::Arc;
use crate::config::Config;
use crate::consumer::HeadDrainer;
use crate::error::Result;
use crate::exclusion::Exclusion;
use crate::producer::TailAdvancer;
use crate::state::Shared;

/// One step of either role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Advance,
    Drain,
}

/// An exclusion that runs steps inline and counts its critical sections.
#[derive(Debug, Default)]
pub struct Counting {
    sections: AtomicUsize,
}

impl Counting {
    /// Critical sections entered so far.
    pub fn sections(&self) -> usize {
        self.sections.load(Relaxed)
    }
}

impl Exclusion for Counting {
    const NAME: &'static str = "counting";

    fn new() -> Self {
        Self::default()
    }

    fn critical<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce() -> Ret,
    {
        self.sections.fetch_add(1, Relaxed);
        f()
    }
}

/// A configuration without induced delay or idle intervals.
pub fn instant_config(slots: usize) -> Config {
    Config::default().with_slots(slots).with_delay(Duration::ZERO).with_idle(Duration::ZERO)
}

/// Replays `schedule` on the calling thread, stopping at the first failed
/// step.
pub fn replay<E>(slots: usize, schedule: &[Step]) -> (Arc<Shared<E>>, Result<()>)
where
    E: Exclusion,
{
    let config = instant_config(slots);
    let shared = Arc::new(Shared::<E>::new(slots));
    let producer = TailAdvancer::new(Arc::clone(&shared), &config);
    let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
    let result = schedule.iter().try_for_each(|step| match step {
        Step::Advance => producer.step().map(drop),
        Step::Drain => consumer.step().map(drop),
    });
    (shared, result)
}

mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{replay, Step};
    use crate::error::Error;
    use crate::exclusion::{Guarded, Unguarded};

    #[test]
    fn alternating_schedule_never_violates() {
        for slots in 1..=12 {
            let schedule: Vec<_> = (0..100).flat_map(|_| [Step::Advance, Step::Drain]).collect();
            let (shared, result) = replay::<Unguarded>(slots, &schedule);
            result.unwrap();
            assert!(!shared.is_race_detected());
            assert_eq!(shared.producer_steps(), 100);
            assert_eq!(shared.consumer_steps(), 100);
        }
    }

    #[test]
    fn at_most_one_advance_between_drains_never_violates() {
        let mut rng = StdRng::seed_from_u64(0x51_07);
        for _ in 0..50 {
            let slots = rng.gen_range(2..=16);
            let schedule: Vec<_> = (0..200)
                .flat_map(|_| match rng.gen_bool(0.5) {
                    true => vec![Step::Advance, Step::Drain],
                    false => vec![Step::Drain],
                })
                .collect();
            let (shared, result) = replay::<Guarded>(slots, &schedule);
            result.unwrap();
            assert!(shared.slots().snapshot().iter().all(|&cell| cell <= 1));
        }
    }

    #[test]
    fn head_reads_stay_bounded_within_len_drains() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let slots = rng.gen_range(2..=12);
            let mut schedule = vec![Step::Advance, Step::Drain];
            for _ in 1..slots {
                // Advances after the first drain may stack freely.
                let advances = rng.gen_range(0..4);
                schedule.extend((0..advances).map(|_| Step::Advance));
                schedule.push(Step::Drain);
            }
            let (shared, result) = replay::<Guarded>(slots, &schedule);
            result.unwrap();
            assert_eq!(shared.consumer_steps(), slots);
        }
    }

    #[test]
    fn stacked_advances_reach_head_after_len_minus_one_drains() {
        let slots = 10;
        let mut schedule = vec![Step::Advance, Step::Advance];
        schedule.extend([Step::Drain; 10]);
        let (shared, result) = replay::<Guarded>(slots, &schedule);
        assert!(matches!(result, Err(Error::InvariantViolation { head: 2 })));
        assert_eq!(shared.consumer_steps(), slots - 1);
        assert!(shared.is_race_detected());
    }

    #[test]
    fn single_slot_never_violates() {
        let schedule = [Step::Advance, Step::Advance, Step::Drain, Step::Advance, Step::Drain];
        let (shared, result) = replay::<Unguarded>(1, &schedule);
        result.unwrap();
        assert_eq!(shared.slots().snapshot(), [0]);
    }
}
