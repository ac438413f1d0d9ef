//! The synchronization wrapper around one producer or consumer step.
//!
//! Both roles run every step through [`Exclusion::critical`]. That call is the
//! only place where the faulty and the corrected experiment differ:
//! [`Unguarded`] runs the step as is, [`Guarded`] runs it while holding a
//! single MCS lock shared by both roles.

use core::fmt;

use crate::lock::Mutex;
use crate::relax::{Relax, Yield};

/// A policy deciding whether a step runs in mutual exclusion with the other
/// role's steps.
pub trait Exclusion {
    /// Short name used in log events and reports.
    const NAME: &'static str;

    /// Creates the policy for a new run.
    fn new() -> Self;

    /// Runs one full step.
    ///
    /// Implementations must hold any lock for the whole of `f`, never part of
    /// it, and must release it on every exit path.
    fn critical<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce() -> Ret;
}

/// Runs steps without any protection, exposing the race window.
#[derive(Debug, Default)]
pub struct Unguarded;

impl Exclusion for Unguarded {
    const NAME: &'static str = "unsynchronized";

    fn new() -> Self {
        Self
    }

    #[inline]
    fn critical<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce() -> Ret,
    {
        f()
    }
}

/// Runs steps under a fair MCS lock that applies the `R` relax policy while
/// waiting.
///
/// The lock protects no data of its own; it serializes the step closures,
/// which access the slots and counters of the run.
pub struct Guarded<R = Yield> {
    lock: Mutex<(), R>,
}

impl<R: Relax> Exclusion for Guarded<R> {
    const NAME: &'static str = "synchronized";

    fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }

    #[inline]
    fn critical<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce() -> Ret,
    {
        self.lock.lock_then(|()| f())
    }
}

impl<R> Guarded<R> {
    /// Returns `true` if some step currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<R: Relax> fmt::Debug for Guarded<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded").field("held", &self.is_held()).finish()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::panic::{self, AssertUnwindSafe};

    use super::{Exclusion, Guarded, Unguarded};
    use crate::relax::Spin;

    #[test]
    fn unguarded_runs_inline() {
        let exclusion = Unguarded::new();
        assert_eq!(exclusion.critical(|| 7), 7);
    }

    #[test]
    fn guarded_holds_lock_for_whole_step() {
        let exclusion = Guarded::<Spin>::new();
        exclusion.critical(|| assert!(exclusion.is_held()));
        assert!(!exclusion.is_held());
    }

    #[test]
    fn guarded_releases_on_early_return() {
        let exclusion = Guarded::<Spin>::new();
        let step = |skip: bool| {
            exclusion.critical(|| {
                if skip {
                    return None;
                }
                Some(1)
            })
        };
        assert_eq!(step(true), None);
        assert!(!exclusion.is_held());
        assert_eq!(step(false), Some(1));
    }

    #[test]
    fn guarded_releases_on_unwind() {
        let exclusion = Guarded::<Spin>::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| exclusion.critical(|| panic!("step"))));
        assert!(result.is_err());
        assert!(!exclusion.is_held());
    }
}

#[cfg(all(loom, test))]
mod model {
    use super::{Guarded, Unguarded};
    use crate::loom::models;

    #[test]
    fn guarded_step_pair() {
        models::guarded_step_pair::<Guarded>();
    }

    #[test]
    fn unguarded_step_pair() {
        models::unguarded_step_pair::<Unguarded>();
    }
}
