//! The harness: starts both roles on their own threads and turns the end
//! state of the run into a [`Report`].

use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::consumer::HeadDrainer;
use crate::error::{Error, Result};
use crate::exclusion::{Exclusion, Guarded, Unguarded};
use crate::producer::TailAdvancer;
use crate::state::Shared;

const PRODUCER: &str = "tail-advancer";
const CONSUMER: &str = "head-drainer";

/// The faulty experiment: steps run without mutual exclusion.
pub type Unsynchronized = Experiment<Unguarded>;

/// The corrected experiment: every step holds the MCS lock.
pub type Synchronized = Experiment<Guarded>;

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The head drainer observed a head value above the limit.
    RaceDetected,
    /// Both roles completed their step budget without a violation.
    BudgetExhausted,
    /// The run was stopped by its deadline or by [`Running::halt`] first.
    Halted,
}

impl Outcome {
    /// The verdict line printed at the end of a run.
    pub const fn verdict(self) -> &'static str {
        match self {
            Self::RaceDetected => "race condition detected",
            Self::BudgetExhausted => "no race condition found",
            Self::Halted => "halted before a verdict",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verdict())
    }
}

/// Final state of a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Which experiment produced this report.
    pub variant: &'static str,
    /// How the run ended.
    pub outcome: Outcome,
    /// The offending head value, if a violation was observed.
    pub violation: Option<u32>,
    /// Committed tail advances.
    pub producer_steps: usize,
    /// Completed drains.
    pub consumer_steps: usize,
    /// Slot values once both workers stopped.
    pub slots: Vec<u32>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl Report {
    /// Returns `true` if the run found a race.
    pub fn race_detected(&self) -> bool {
        self.outcome == Outcome::RaceDetected
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variant, self.outcome)?;
        if let Some(head) = self.violation {
            write!(f, " (head cell held {head})")?;
        }
        write!(
            f,
            " after {} producer and {} consumer steps in {:?}",
            self.producer_steps, self.consumer_steps, self.elapsed
        )
    }
}

/// A validated experiment, generic over the step [`Exclusion`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use slotrace::config::Config;
/// use slotrace::experiment::{Outcome, Synchronized};
///
/// let config = Config::synchronized().with_delay(Duration::ZERO).with_idle(Duration::from_millis(20));
/// let report = Synchronized::new(config).unwrap().run().unwrap();
/// assert_eq!(report.outcome, Outcome::BudgetExhausted);
/// ```
pub struct Experiment<E> {
    config: Config,
    marker: PhantomData<E>,
}

impl<E> Experiment<E> {
    /// Validates `config`. Fails before anything is started.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, marker: PhantomData })
    }

    /// The parameters of this experiment.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<E: Exclusion + Send + Sync + 'static> Experiment<E> {
    /// Starts both roles and blocks until the run ends.
    pub fn run(&self) -> Result<Report> {
        self.spawn()?.wait()
    }

    /// Starts both roles on their own threads.
    ///
    /// Dropping the returned handle detaches the workers, which then run
    /// until their own stop condition.
    pub fn spawn(&self) -> Result<Running<E>> {
        let config = &self.config;
        let shared = Arc::new(Shared::<E>::new(config.slots));
        info!(
            variant = E::NAME,
            slots = config.slots,
            burst = config.burst,
            delay = ?config.delay,
            budget = ?config.budget,
            "starting run"
        );
        let start = Instant::now();

        let drainer = HeadDrainer::new(Arc::clone(&shared), config);
        let consumer = spawn_worker(CONSUMER, &shared, move || {
            let _span = info_span!("consumer", variant = E::NAME).entered();
            drainer.drain_loop(&mut rand::thread_rng())
        })?;

        let advancer = TailAdvancer::new(Arc::clone(&shared), config);
        let producer = spawn_worker(PRODUCER, &shared, move || {
            let _span = info_span!("producer", variant = E::NAME).entered();
            advancer.run(&mut rand::thread_rng());
        });
        let producer = match producer {
            Ok(producer) => producer,
            Err(err) => {
                shared.halt();
                let _ = consumer.join();
                return Err(err);
            }
        };

        let config = config.clone();
        Ok(Running { shared, producer, consumer, config, start })
    }
}

/// Spawns a named worker that reports its exit to `shared`, panics included.
fn spawn_worker<E, F, T>(name: &'static str, shared: &Arc<Shared<E>>, f: F) -> Result<JoinHandle<T>>
where
    E: Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let _exit = ExitGuard(&shared);
            f()
        })
        .map_err(Error::Spawn)
}

struct ExitGuard<'a, E>(&'a Shared<E>);

impl<E> Drop for ExitGuard<'_, E> {
    fn drop(&mut self) {
        // A lone survivor would otherwise never see a stop condition.
        if thread::panicking() {
            self.0.halt();
        }
        self.0.worker_exited();
    }
}

/// A run in progress.
pub struct Running<E> {
    shared: Arc<Shared<E>>,
    producer: JoinHandle<()>,
    consumer: JoinHandle<Result<()>>,
    config: Config,
    start: Instant,
}

impl<E: Exclusion> Running<E> {
    /// The state shared by both workers.
    pub fn shared(&self) -> &Shared<E> {
        &self.shared
    }

    /// Returns `true` once both workers left their loops.
    pub fn is_finished(&self) -> bool {
        self.shared.workers_exited()
    }

    /// Asks both workers to stop at their next poll point.
    pub fn halt(&self) {
        self.shared.halt();
    }

    /// Blocks until both workers stop, halting them once the configured
    /// deadline elapses, and reports the verdict.
    pub fn wait(self) -> Result<Report> {
        let Self { shared, producer, consumer, config, start } = self;
        let remaining = config.deadline.map(|deadline| deadline.saturating_sub(start.elapsed()));
        if !shared.wait_workers(remaining) {
            warn!(deadline = ?config.deadline, "deadline elapsed, halting workers");
            shared.halt();
        }

        let producer = producer.join().map_err(|_| Error::WorkerPanicked(PRODUCER));
        let consumer = consumer.join().map_err(|_| Error::WorkerPanicked(CONSUMER));
        producer?;
        let violation = match consumer? {
            Ok(()) => None,
            Err(Error::InvariantViolation { head }) => Some(head),
            Err(err) => return Err(err),
        };

        let (producer_steps, consumer_steps) = (shared.producer_steps(), shared.consumer_steps());
        let outcome = if shared.is_race_detected() {
            Outcome::RaceDetected
        } else if config.budget_reached(producer_steps) && config.budget_reached(consumer_steps) {
            Outcome::BudgetExhausted
        } else {
            Outcome::Halted
        };
        let report = Report {
            variant: E::NAME,
            outcome,
            violation,
            producer_steps,
            consumer_steps,
            slots: shared.slots().snapshot(),
            elapsed: start.elapsed(),
        };
        info!(%report, "run finished");
        Ok(report)
    }
}
