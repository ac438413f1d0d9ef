//! The shared slot array under test.
//!
//! Every cell is an atomic integer accessed with relaxed ordering, so a single
//! read or write is never torn. Nothing spanning more than one cell is atomic:
//! [`SlotArray::shift_left`] rewrites the cells one at a time, and a read of
//! the tail followed by a write to it can be interleaved with anything. Those
//! multi-step sequences are where the race lives, and only the caller's
//! [`Exclusion`] decides whether they are protected.
//!
//! [`Exclusion`]: crate::exclusion::Exclusion

use core::fmt;
use core::sync::atomic::Ordering::Relaxed;

use crate::cfg::atomic::AtomicU32;

/// Largest value the head cell may legally hold.
///
/// Between two drains at most one tail advance can reach the head, so the
/// head cell is always 0 or 1 under correct sequential execution.
pub const HEAD_LIMIT: u32 = 1;

/// Returns `true` if `head` is a value the head cell can only hold after an
/// unsynchronized interleaving corrupted the array.
#[inline]
pub const fn violates_invariant(head: u32) -> bool {
    head > HEAD_LIMIT
}

/// A fixed-size sequence of counters flowing from the tail (last index) to the
/// head (index 0) through periodic left shifts.
pub struct SlotArray {
    cells: Box<[AtomicU32]>,
}

impl SlotArray {
    /// Creates an array of `len` zeroed cells.
    ///
    /// `len` is expected to be positive, see [`Config::validate`].
    ///
    /// [`Config::validate`]: crate::config::Config::validate
    pub fn new(len: usize) -> Self {
        let cells = (0..len).map(|_| AtomicU32::new(0)).collect();
        Self { cells }
    }

    /// Number of cells, fixed at construction.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the array holds no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn tail(&self) -> &AtomicU32 {
        &self.cells[self.len() - 1]
    }

    /// Reads the tail cell.
    #[inline]
    pub fn read_tail(&self) -> u32 {
        self.tail().load(Relaxed)
    }

    /// Overwrites the tail cell.
    #[inline]
    pub fn write_tail(&self, value: u32) {
        self.tail().store(value, Relaxed);
    }

    /// Reads the head cell.
    #[inline]
    pub fn read_head(&self) -> u32 {
        self.cells[0].load(Relaxed)
    }

    /// Drops the head value, moves every other cell one index down and zeroes
    /// the tail.
    ///
    /// Each cell is copied separately. A concurrent tail write landing between
    /// the copy of the tail and the final zeroing is lost.
    pub fn shift_left(&self) {
        for pair in self.cells.windows(2) {
            pair[0].store(pair[1].load(Relaxed), Relaxed);
        }
        self.tail().store(0, Relaxed);
    }

    /// Copies the current cell values.
    ///
    /// The copy is only consistent if no worker is running.
    pub fn snapshot(&self) -> Vec<u32> {
        self.cells.iter().map(|cell| cell.load(Relaxed)).collect()
    }
}

impl fmt::Debug for SlotArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{violates_invariant, SlotArray};

    #[test]
    fn starts_zeroed() {
        let slots = SlotArray::new(4);
        assert_eq!(slots.len(), 4);
        assert_eq!(slots.snapshot(), [0, 0, 0, 0]);
    }

    #[test]
    fn shift_on_zeroes_is_a_no_op() {
        let slots = SlotArray::new(5);
        slots.shift_left();
        slots.shift_left();
        assert_eq!(slots.snapshot(), [0; 5]);
    }

    #[test]
    fn tail_value_reaches_head_after_len_minus_one_shifts() {
        let slots = SlotArray::new(4);
        slots.write_tail(1);
        assert_eq!(slots.snapshot(), [0, 0, 0, 1]);
        for _ in 0..3 {
            assert_eq!(slots.read_head(), 0);
            slots.shift_left();
        }
        assert_eq!(slots.read_head(), 1);
        assert_eq!(slots.read_tail(), 0);
    }

    #[test]
    fn shift_drops_head_and_zeroes_tail() {
        let slots = SlotArray::new(3);
        slots.write_tail(2);
        slots.shift_left();
        slots.write_tail(1);
        slots.shift_left();
        assert_eq!(slots.snapshot(), [2, 1, 0]);
        slots.shift_left();
        assert_eq!(slots.snapshot(), [1, 0, 0]);
    }

    #[test]
    fn single_cell_shares_head_and_tail() {
        let slots = SlotArray::new(1);
        slots.write_tail(1);
        assert_eq!(slots.read_head(), 1);
        slots.shift_left();
        assert_eq!(slots.read_head(), 0);
        assert_eq!(slots.read_tail(), 0);
    }

    #[test]
    fn invariant_bounds() {
        assert!(!violates_invariant(0));
        assert!(!violates_invariant(1));
        assert!(violates_invariant(2));
        assert!(violates_invariant(9));
    }

    #[test]
    fn debug_lists_cells() {
        let slots = SlotArray::new(2);
        slots.write_tail(1);
        assert_eq!(format!("{slots:?}"), "[0, 1]");
    }
}
