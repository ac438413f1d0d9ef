//! Construction parameters of an experiment run.

use core::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Parameters shared by both roles of a run.
///
/// Durations are written in milliseconds when loaded from TOML:
///
/// ```
/// use std::time::Duration;
/// use slotrace::config::Config;
///
/// let config = Config::from_toml_str(
///     r#"
///     slots = 10
///     burst = 2
///     delay_ms = 50
///     deadline_ms = 5000
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.delay, Duration::from_millis(50));
/// assert_eq!(config.budget, None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of cells in the slot array, `n`.
    pub slots: usize,
    /// Tail advances attempted per producer burst, `k`.
    pub burst: usize,
    /// Induced delay between reading the tail and writing it back, `t`.
    #[serde(rename = "delay_ms", deserialize_with = "millis")]
    pub delay: Duration,
    /// Exclusive upper bound of the random idle interval between bursts and
    /// between drains.
    #[serde(rename = "idle_ms", deserialize_with = "millis")]
    pub idle: Duration,
    /// Steps each role performs before it stops. `None` runs until a race is
    /// detected.
    pub budget: Option<usize>,
    /// Wall-clock limit after which the harness halts both roles.
    #[serde(rename = "deadline_ms", deserialize_with = "opt_millis")]
    pub deadline: Option<Duration>,
}

impl Config {
    /// Idle bound used unless configured otherwise.
    pub const DEFAULT_IDLE: Duration = Duration::from_millis(100);

    /// Step budget of the corrected experiment.
    pub const DEFAULT_BUDGET: usize = 10;

    /// Parameters of the faulty experiment: 10 slots, bursts of 2, 10 ms
    /// delay, no budget.
    pub fn unsynchronized() -> Self {
        Self {
            slots: 10,
            burst: 2,
            delay: Duration::from_millis(10),
            idle: Self::DEFAULT_IDLE,
            budget: None,
            deadline: None,
        }
    }

    /// Parameters of the corrected experiment: 10 slots, bursts of 1, 10 ms
    /// delay, 10 steps per role.
    pub fn synchronized() -> Self {
        Self { burst: 1, budget: Some(Self::DEFAULT_BUDGET), ..Self::unsynchronized() }
    }

    /// Parses and validates a TOML table. Missing keys keep their
    /// [`Config::unsynchronized`] values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of slots.
    #[must_use]
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    /// Sets the burst size.
    #[must_use]
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Sets the induced delay inside a producer step.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the idle interval bound.
    #[must_use]
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Sets the per-role step budget.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Removes the step budget.
    #[must_use]
    pub fn without_budget(mut self) -> Self {
        self.budget = None;
        self
    }

    /// Sets the wall-clock deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Rejects parameters no run can start with.
    pub fn validate(&self) -> Result<()> {
        // Cell values are taken modulo `slots` and stored as `u32`.
        if self.slots == 0 || u32::try_from(self.slots).is_err() {
            return Err(Error::InvalidSlots(self.slots));
        }
        if self.burst == 0 {
            return Err(Error::InvalidBurst(self.burst));
        }
        Ok(())
    }

    /// Returns `true` if a role that completed `steps` steps must stop.
    pub(crate) fn budget_reached(&self, steps: usize) -> bool {
        self.budget.map_or(false, |budget| steps >= budget)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::unsynchronized()
    }
}

fn millis<'de, D>(deserializer: D) -> core::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn opt_millis<'de, D>(deserializer: D) -> core::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
}

#[cfg(all(not(loom), test))]
mod test {
    use core::time::Duration;

    use super::Config;
    use crate::error::Error;

    #[test]
    fn presets() {
        let faulty = Config::unsynchronized();
        assert_eq!((faulty.slots, faulty.burst, faulty.budget), (10, 2, None));
        let fixed = Config::synchronized();
        assert_eq!((fixed.slots, fixed.burst, fixed.budget), (10, 1, Some(10)));
        assert_eq!(fixed.delay, Duration::from_millis(10));
        assert!(faulty.validate().is_ok());
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn zero_slots_rejected() {
        let err = Config::default().with_slots(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidSlots(0)));
        assert!(err.is_config());
    }

    #[test]
    fn zero_burst_rejected() {
        let err = Config::default().with_burst(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidBurst(0)));
    }

    #[test]
    fn oversized_slots_rejected() {
        let Some(slots) = (u32::MAX as usize).checked_add(1) else {
            return;
        };
        let err = Config::default().with_slots(slots).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidSlots(_)));
    }

    #[test]
    fn budget_reached() {
        let config = Config::default().with_budget(3);
        assert!(!config.budget_reached(2));
        assert!(config.budget_reached(3));
        assert!(!config.without_budget().budget_reached(usize::MAX));
    }

    #[test]
    fn toml_fills_missing_keys() {
        let config = Config::from_toml_str("slots = 4\nidle_ms = 0\nbudget = 7").unwrap();
        assert_eq!(config.slots, 4);
        assert_eq!(config.burst, 2);
        assert_eq!(config.idle, Duration::ZERO);
        assert_eq!(config.budget, Some(7));
        assert_eq!(config.deadline, None);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = Config::from_toml_str("slot = 4").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn toml_is_validated() {
        let err = Config::from_toml_str("slots = 0").unwrap_err();
        assert!(matches!(err, Error::InvalidSlots(0)));
    }
}
