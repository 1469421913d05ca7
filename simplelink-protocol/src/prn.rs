//! Packet Reference Numbers
//!
//! Every originated packet carries a 32-bit PRN that identifies it for
//! acknowledgement and duplicate suppression. Zero is reserved as the "no
//! PRN" sentinel, so allocation wraps from `u32::MAX` back to 1.
//!
//! A running station starts counting from a random point, so a restarted
//! station does not reuse the PRNs its peers still remember.

use rand::Rng;
use std::fmt;

/// Packet reference number
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Prn(u32);

impl Prn {
    /// Sentinel for "no packet", never carried on the wire
    pub const NONE: Prn = Prn(0);

    #[inline]
    pub const fn new(value: u32) -> Self {
        Prn(value)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Next PRN in allocation order, skipping zero
    #[inline]
    pub fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Prn(1),
            value => Prn(value),
        }
    }
}

impl fmt::Debug for Prn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prn({})", self.0)
    }
}

impl fmt::Display for Prn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Prn {
    fn from(value: u32) -> Self {
        Prn(value)
    }
}

impl From<Prn> for u32 {
    fn from(prn: Prn) -> u32 {
        prn.0
    }
}

/// Monotonic PRN allocator
#[derive(Debug, Clone)]
pub struct PrnAllocator {
    last: Prn,
}

impl PrnAllocator {
    /// Allocator whose first PRN is 1
    pub fn new() -> Self {
        PrnAllocator { last: Prn::NONE }
    }

    /// Allocator starting at a random non-zero PRN
    pub fn random() -> Self {
        let mut alloc = Self::new();
        alloc.reseed();
        alloc
    }

    /// Start allocating after `last`
    pub fn starting_after(last: Prn) -> Self {
        PrnAllocator { last }
    }

    /// The most recently allocated PRN
    pub fn last(&self) -> Prn {
        self.last
    }

    /// Allocate the next PRN for which `in_use` is false
    ///
    /// Returns `None` only if every non-zero PRN is in use.
    pub fn allocate<F>(&mut self, mut in_use: F) -> Option<Prn>
    where
        F: FnMut(Prn) -> bool,
    {
        let mut candidate = self.last;
        // Bounded so a saturated table cannot spin forever
        for _ in 0..u32::MAX {
            candidate = candidate.next();
            if !in_use(candidate) {
                self.last = candidate;
                return Some(candidate);
            }
        }
        None
    }

    /// Restart counting after a random PRN
    pub fn reseed(&mut self) {
        self.last = Prn::new(rand::thread_rng().gen());
    }
}

impl Default for PrnAllocator {
    fn default() -> Self {
        Self::new()
    }
}
