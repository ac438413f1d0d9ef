use std::time::Duration;

use slotrace::config::Config;
use slotrace::error::Error;
use slotrace::experiment::{Outcome, Synchronized, Unsynchronized};
use slotrace::slots::HEAD_LIMIT;

const TRIALS: usize = 4;

#[test]
fn synchronized_single_advance_finds_no_race() {
    let config = Config::synchronized().with_slots(10).with_burst(1).with_delay(Duration::ZERO);
    for _ in 0..3 {
        let report = Synchronized::new(config.clone()).unwrap().run().unwrap();
        assert_eq!(report.outcome, Outcome::BudgetExhausted, "{report}");
        assert_eq!(report.outcome.verdict(), "no race condition found");
        assert_eq!(report.producer_steps, 10);
        assert_eq!(report.consumer_steps, 10);
        assert_eq!(report.violation, None);
    }
}

#[test]
fn synchronized_head_reads_stay_bounded_within_len_drains() {
    // Only advances made before the first drain can reach the head within
    // `slots` drains, so a budget of at most `slots` never reads above 1.
    for slots in 3..=10 {
        let config = Config::synchronized().with_slots(slots).with_delay(Duration::ZERO).with_budget(slots);
        let report = Synchronized::new(config).unwrap().run().unwrap();
        assert_eq!(report.outcome, Outcome::BudgetExhausted, "{report}");
        assert_eq!(report.violation, None);
        assert_eq!(report.consumer_steps, slots);
    }
}

#[test]
fn synchronized_race_is_reachable_beyond_len_drains() {
    // The lock orders steps but does not force alternation: two advances
    // between drains reach the head once the run outlasts `slots` drains.
    let config = Config::synchronized()
        .with_slots(5)
        .with_delay(Duration::ZERO)
        .with_idle(Duration::from_millis(20))
        .without_budget()
        .with_deadline(Duration::from_secs(5));
    let experiment = Synchronized::new(config).unwrap();
    let report = (0..3)
        .map(|_| experiment.run().unwrap())
        .find(|report| report.race_detected())
        .expect("no synchronized run raced");
    assert!(report.violation.unwrap() > HEAD_LIMIT);
}

#[test]
fn unsynchronized_bursts_race_in_most_trials() {
    let config = Config::unsynchronized()
        .with_slots(10)
        .with_burst(2)
        .with_delay(Duration::from_millis(50))
        .with_deadline(Duration::from_secs(5));
    let experiment = Unsynchronized::new(config).unwrap();
    let reports: Vec<_> = (0..TRIALS).map(|_| experiment.run().unwrap()).collect();
    let raced: Vec<_> = reports.iter().filter(|report| report.race_detected()).collect();
    assert!(raced.len() >= TRIALS - 1, "only {} of {TRIALS} trials raced", raced.len());

    let report = raced[0];
    assert_eq!(report.outcome.verdict(), "race condition detected");
    let head = report.violation.unwrap();
    assert!(head > HEAD_LIMIT);
    // The drainer stops on the violation and leaves the head in place.
    assert_eq!(report.slots[0], head);
}

#[test]
fn zero_slots_fail_before_start() {
    let err = Unsynchronized::new(Config::unsynchronized().with_slots(0)).err().unwrap();
    assert!(matches!(err, Error::InvalidSlots(0)));
    assert!(err.is_config());
    let err = Synchronized::new(Config::synchronized().with_slots(0)).err().unwrap();
    assert!(matches!(err, Error::InvalidSlots(0)));
}

#[test]
fn zero_burst_fails_before_start() {
    let err = Synchronized::new(Config::synchronized().with_burst(0)).err().unwrap();
    assert!(matches!(err, Error::InvalidBurst(0)));
}

#[test]
fn single_slot_synchronized_exhausts_budget() {
    let config = Config::synchronized().with_slots(1).with_delay(Duration::ZERO).with_budget(5);
    let report = Synchronized::new(config).unwrap().run().unwrap();
    assert_eq!(report.outcome, Outcome::BudgetExhausted);
    assert_eq!((report.producer_steps, report.consumer_steps), (5, 5));
    assert_eq!(report.slots, [0]);
}

#[test]
fn single_slot_unsynchronized_halts_at_deadline() {
    let config = Config::unsynchronized()
        .with_slots(1)
        .with_delay(Duration::from_millis(5))
        .with_idle(Duration::from_millis(10))
        .with_deadline(Duration::from_millis(300));
    let report = Unsynchronized::new(config).unwrap().run().unwrap();
    assert_eq!(report.outcome, Outcome::Halted);
    assert_eq!(report.outcome.verdict(), "halted before a verdict");
    assert_eq!(report.violation, None);
    assert!(report.elapsed >= Duration::from_millis(300));
}

#[test]
fn halt_stops_an_unbounded_run() {
    let config = Config::unsynchronized().with_delay(Duration::from_millis(50));
    let running = Unsynchronized::new(config).unwrap().spawn().unwrap();
    running.halt();
    assert!(running.shared().is_halted());
    let report = running.wait().unwrap();
    assert_eq!(report.outcome, Outcome::Halted);
    assert!(!report.race_detected());
}

#[test]
fn config_from_toml_drives_a_run() {
    let toml = r#"
        slots = 4
        burst = 1
        delay_ms = 0
        idle_ms = 20
        budget = 3
    "#;
    let config = Config::from_toml_str(toml).unwrap();
    let report = Synchronized::new(config).unwrap().run().unwrap();
    assert_eq!(report.outcome, Outcome::BudgetExhausted);
    assert_eq!((report.producer_steps, report.consumer_steps), (3, 3));
}
