//! Errors produced while configuring or running an experiment.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can end a step, a worker or a run early.
#[derive(Debug, Error)]
pub enum Error {
    /// A timed suspension was cut short because the run was cancelled.
    ///
    /// Recoverable: the current step ends without touching the slots and the
    /// worker loop re-checks its stop condition.
    #[error("suspension interrupted by cancellation")]
    Interrupted,

    /// The head cell held a value outside `{0, 1}`.
    ///
    /// This is the condition the experiment looks for, not a harness bug.
    #[error("invariant violated: head cell holds {head}")]
    InvariantViolation {
        /// The value read from the head cell.
        head: u32,
    },

    /// The slot array must hold at least one cell.
    #[error("invalid configuration: slot count must be positive, got {0}")]
    InvalidSlots(usize),

    /// The producer must advance at least once per burst.
    #[error("invalid configuration: burst size must be positive, got {0}")]
    InvalidBurst(usize),

    /// The configuration table could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),

    /// A worker thread panicked before finishing.
    #[error("worker `{0}` panicked")]
    WorkerPanicked(&'static str),
}

impl Error {
    /// Returns `true` for configuration errors, which are always reported
    /// before any worker starts.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidSlots(_) | Self::InvalidBurst(_) | Self::Config(_))
    }
}
