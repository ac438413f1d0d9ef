//! A fair MCS lock with closure scoped critical sections.
//!
//! MCS lock is a List-Based Queuing Lock: every waiting thread enqueues a
//! record and spins on its own flag, and the releasing thread hands the lock
//! directly to its successor. Acquisitions are served in FIFO order, which
//! gives the experiment's two roles a strict alternation whenever both are
//! waiting.
//!
//! The queue record is allocated on the stack of [`Mutex::lock_then`] and
//! [`Mutex::try_lock_then`] and lives exactly as long as the critical section,
//! so callers never see it. The lock is released when the closure returns or
//! unwinds.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crate::cfg::atomic::{AtomicBool, AtomicPtr};
use crate::cfg::cell::{UnsafeCell, UnsafeCellWith};
use crate::relax::Relax;

/// A queue record, one per lock acquisition.
#[derive(Debug)]
struct MutexNode {
    next: AtomicPtr<MutexNode>,
    locked: AtomicBool,
}

impl MutexNode {
    /// Creates a node that is still waiting for a handoff.
    fn new() -> Self {
        let next = AtomicPtr::new(ptr::null_mut());
        let locked = AtomicBool::new(true);
        Self { next, locked }
    }

    /// Returns a raw mutable pointer of this node.
    fn as_ptr(&self) -> *mut Self {
        (self as *const Self).cast_mut()
    }
}

/// A mutual exclusion primitive useful for protecting shared data.
///
/// The data can only be accessed from within the closures given to
/// [`lock_then`] and [`try_lock_then`], which guarantees that it is only
/// ever accessed while the mutex is locked.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use slotrace::lock::Mutex;
/// use slotrace::relax::Yield;
///
/// let data = Arc::new(Mutex::<_, Yield>::new(0));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let data = Arc::clone(&data);
///         thread::spawn(move || data.lock_then(|n| *n += 1))
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(data.lock_then(|n| *n), 4);
/// ```
/// [`lock_then`]: Mutex::lock_then
/// [`try_lock_then`]: Mutex::try_lock_then
pub struct Mutex<T: ?Sized, R> {
    tail: AtomicPtr<MutexNode>,
    marker: PhantomData<R>,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send, R> Sync for Mutex<T, R> {}
unsafe impl<T: ?Sized + Send, R> Send for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    /// Creates a new mutex in an unlocked state ready for use.
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub const fn new(value: T) -> Self {
        let tail = AtomicPtr::new(ptr::null_mut());
        let data = UnsafeCell::new(value);
        Self { tail, marker: PhantomData, data }
    }

    /// Creates a new Loom based mutex (non-const).
    #[cfg(all(loom, test))]
    pub fn new(value: T) -> Self {
        let tail = AtomicPtr::new(ptr::null_mut());
        let data = UnsafeCell::new(value);
        Self { tail, marker: PhantomData, data }
    }

    /// Consumes this mutex, returning the underlying data.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, R: Relax> Mutex<T, R> {
    /// Acquires this mutex and then runs the closure against the protected
    /// data.
    ///
    /// Blocks the current thread, applying the `R` relax policy, until the
    /// lock is handed over to it. The lock is released once `f` returns or
    /// unwinds.
    pub fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        let node = MutexNode::new();
        let mut guard = self.lock(&node);
        guard.with_mut(f)
    }

    /// Attempts to acquire this mutex and then runs the closure against the
    /// protected data if successful.
    ///
    /// `f` is given `None` if the lock is currently held. This function does
    /// not block.
    pub fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&mut T>) -> Ret,
    {
        let node = MutexNode::new();
        // The guard must be dropped before `node` goes out of scope.
        let ret = match self.try_lock(&node) {
            Some(mut guard) => guard.with_mut(|data| f(Some(data))),
            None => f(None),
        };
        ret
    }

    fn try_lock<'a>(&'a self, node: &'a MutexNode) -> Option<MutexGuard<'a, T, R>> {
        self.tail
            .compare_exchange(ptr::null_mut(), node.as_ptr(), Acquire, Relaxed)
            .map(|_| MutexGuard::new(self, node))
            .ok()
    }

    fn lock<'a>(&'a self, node: &'a MutexNode) -> MutexGuard<'a, T, R> {
        let pred = self.tail.swap(node.as_ptr(), AcqRel);
        // If we have a predecessor, complete the link so it will notify us.
        if !pred.is_null() {
            // SAFETY: A predecessor does not leave `unlock` before it has
            // observed this store, so its node is still alive.
            unsafe { &*pred }.next.store(node.as_ptr(), Release);
            let mut relax = R::new();
            while node.locked.load(Acquire) {
                relax.relax();
            }
        }
        MutexGuard::new(self, node)
    }

    fn unlock(&self, node: &MutexNode) {
        let mut next = node.next.load(Acquire);
        if next.is_null() {
            // No known successor: if we are still the tail, the queue is empty.
            let swapped = self.tail.compare_exchange(node.as_ptr(), ptr::null_mut(), Release, Relaxed);
            if swapped.is_ok() {
                return;
            }
            // Someone swapped in behind us but has not linked yet.
            let mut relax = R::new();
            loop {
                next = node.next.load(Acquire);
                if !next.is_null() {
                    break;
                }
                relax.relax();
            }
        }
        // SAFETY: The successor spins on its own node until this store, so it
        // is alive; it is not touched afterwards.
        unsafe { &*next }.locked.store(false, Release);
    }
}

impl<T: ?Sized, R> Mutex<T, R> {
    /// Returns `true` if the lock is currently held.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    #[inline]
    pub fn is_locked(&self) -> bool {
        !self.tail.load(Relaxed).is_null()
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// The mutable borrow statically guarantees that no lock is held.
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + Default, R> Default for Mutex<T, R> {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T: ?Sized + fmt::Debug, R: Relax> fmt::Debug for Mutex<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        self.try_lock_then(|data| {
            match data {
                Some(data) => d.field("data", &&*data),
                None => d.field("data", &format_args!("<locked>")),
            };
        });
        d.finish()
    }
}

/// Holds the lock until dropped, so a panicking critical section still hands
/// the lock over.
struct MutexGuard<'a, T: ?Sized, R: Relax> {
    lock: &'a Mutex<T, R>,
    node: &'a MutexNode,
}

impl<'a, T: ?Sized, R: Relax> MutexGuard<'a, T, R> {
    const fn new(lock: &'a Mutex<T, R>, node: &'a MutexNode) -> Self {
        Self { lock, node }
    }

    fn with_mut<F, Ret>(&mut self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { self.lock.data.with_mut_unchecked(f) }
    }
}

impl<T: ?Sized, R: Relax> Drop for MutexGuard<'_, T, R> {
    fn drop(&mut self) {
        self.lock.unlock(self.node);
    }
}

#[cfg(all(not(loom), test))]
mod test {
    // Adapted from the test suite of Rust's Mutex implementation.
    //
    // Copyright 2014 The Rust Project Developers.
    //
    // Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
    // http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
    // <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
    // option. This file may not be copied, modified, or distributed
    // except according to those terms.

    use std::format;
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use super::Mutex;
    use crate::relax::{Spin, SpinBackoff, Yield};

    #[derive(Eq, PartialEq, Debug)]
    struct NonCopy(i32);

    #[test]
    fn smoke() {
        let m = Mutex::<_, Spin>::new(());
        m.lock_then(|_| ());
        m.lock_then(|_| ());
        assert!(!m.is_locked());
    }

    #[test]
    fn lots_and_lots() {
        static LOCK: Mutex<u32, Yield> = Mutex::new(0);

        const ITERS: u32 = 1000;
        const CONCURRENCY: u32 = 3;

        fn inc() {
            for _ in 0..ITERS {
                LOCK.lock_then(|g| *g += 1);
            }
        }

        let (tx, rx) = channel();
        for _ in 0..2 * CONCURRENCY {
            let tx2 = tx.clone();
            thread::spawn(move || {
                inc();
                tx2.send(()).unwrap();
            });
        }

        drop(tx);
        for _ in 0..2 * CONCURRENCY {
            rx.recv().unwrap();
        }
        assert_eq!(LOCK.lock_then(|g| *g), ITERS * CONCURRENCY * 2);
    }

    #[test]
    fn backoff_serializes_increments() {
        let m = Arc::new(Mutex::<u32, SpinBackoff>::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..500 {
                        m.lock_then(|g| *g += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(m.lock_then(|g| *g), 2000);
    }

    #[test]
    fn try_lock() {
        let m = Mutex::<_, Spin>::new(0);
        let value = m.try_lock_then(|data| {
            let data = data.unwrap();
            *data = 10;
            *data
        });
        assert_eq!(value, 10);
    }

    #[test]
    fn try_lock_while_held() {
        let m = Mutex::<_, Spin>::new(0);
        m.lock_then(|_| {
            assert!(m.is_locked());
            assert!(m.try_lock_then(|data| data.is_none()));
        });
        assert!(!m.is_locked());
    }

    #[test]
    fn test_into_inner() {
        let m = Mutex::<_, Spin>::new(NonCopy(10));
        assert_eq!(m.into_inner(), NonCopy(10));
    }

    #[test]
    fn test_get_mut() {
        let mut m = Mutex::<_, Spin>::new(NonCopy(10));
        *m.get_mut() = NonCopy(20);
        assert_eq!(m.into_inner(), NonCopy(20));
    }

    #[test]
    fn test_mutex_debug() {
        let m = Mutex::<_, Spin>::new(42);
        assert_eq!(format!("{m:?}"), "Mutex { data: 42 }");
        m.lock_then(|_| assert_eq!(format!("{m:?}"), "Mutex { data: <locked> }"));
    }

    #[test]
    fn test_lock_arc_access_in_unwind() {
        let arc = Arc::new(Mutex::<_, Yield>::new(1));
        let arc2 = arc.clone();
        let _ = thread::spawn(move || {
            arc2.lock_then(|_| panic!());
        })
        .join();
        assert!(!arc.is_locked());
        arc.lock_then(|g| *g += 1);
        assert_eq!(arc.lock_then(|g| *g), 2);
    }

    #[test]
    fn test_lock_unsized() {
        let lock: &Mutex<[i32], Spin> = &Mutex::new([1, 2, 3]);
        lock.lock_then(|b| {
            b[0] = 4;
            b[2] = 5;
        });
        let comp: &[i32] = &[4, 2, 5];
        lock.lock_then(|b| assert_eq!(&*b, comp));
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::{Spin, Yield};

    #[test]
    fn lock_join() {
        models::lock_join::<Yield>();
    }

    #[test]
    fn lock_join_spin() {
        models::lock_join::<Spin>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Yield>();
    }
}
