// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Domain descriptions
//!
//! A domain description summarizes the values a join variable can take: an
//! inclusive `[min, max]` range plus a bit filter over value residues. A value
//! `v` is admissible when it lies in the range and the bit `v % FILTER_BITS`
//! is set.
//!
//! - [`PotentialDomain`] starts out admitting everything and is only ever
//!   narrowed, either by intersecting with another potential domain of the
//!   same variable ([`PotentialDomain::sync`]) or by an observed domain
//!   collected from an executed subtree ([`PotentialDomain::restrict_to`]).
//!   It is shared by every operator touching the variable and guarded by its
//!   own mutex.
//! - [`ObservedDomain`] accumulates the values actually seen.
//!
//! Scans use [`PotentialDomain::next_candidate`] to jump over value ranges that
//! cannot join.

use parking_lot::Mutex;
use std::sync::Arc;

/// Number of 64-bit words in the filter
pub const FILTER_WORDS: usize = 128;
/// Number of filter bits
pub const FILTER_BITS: u32 = (FILTER_WORDS as u32) * 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct DomainState {
    min: u32,
    max: u32,
    filter: [u64; FILTER_WORDS],
}

impl DomainState {
    fn everything() -> Self {
        Self {
            min: 0,
            max: u32::MAX,
            filter: [!0u64; FILTER_WORDS],
        }
    }

    fn nothing() -> Self {
        Self {
            min: u32::MAX,
            max: 0,
            filter: [0u64; FILTER_WORDS],
        }
    }

    #[inline]
    fn bit(value: u32) -> (usize, u64) {
        let residue = value % FILTER_BITS;
        ((residue / 64) as usize, 1u64 << (residue % 64))
    }

    fn could_qualify(&self, value: u32) -> bool {
        if value < self.min || value > self.max {
            return false;
        }
        let (word, mask) = Self::bit(value);
        self.filter[word] & mask != 0
    }

    /// Distance from `residue` to the next set filter bit, scanning cyclically
    fn next_set_bit_distance(&self, residue: u32) -> Option<u32> {
        let start_word = (residue / 64) as usize;
        let start_bit = residue % 64;

        let masked = self.filter[start_word] & (!0u64 << start_bit);
        if masked != 0 {
            return Some(masked.trailing_zeros() - start_bit);
        }
        for step in 1..=FILTER_WORDS {
            let word = (start_word + step) % FILTER_WORDS;
            let bits = if word == start_word {
                // wrapped around to the low bits of the starting word
                self.filter[word] & !(!0u64 << start_bit)
            } else {
                self.filter[word]
            };
            if bits != 0 {
                let position = (word as u32) * 64 + bits.trailing_zeros();
                return Some((position + FILTER_BITS - residue) % FILTER_BITS);
            }
        }
        None
    }

    fn next_candidate(&self, value: u32) -> u32 {
        if self.min > self.max {
            return u32::MAX;
        }
        let start = value.max(self.min);
        if start > self.max {
            return u32::MAX;
        }
        match self.next_set_bit_distance(start % FILTER_BITS) {
            Some(distance) => {
                let candidate = u64::from(start) + u64::from(distance);
                if candidate > u64::from(self.max) {
                    u32::MAX
                } else {
                    candidate as u32
                }
            }
            None => u32::MAX,
        }
    }

    fn intersect(&mut self, other: &DomainState) {
        self.min = self.min.max(other.min);
        self.max = self.max.min(other.max);
        for (a, b) in self.filter.iter_mut().zip(other.filter.iter()) {
            *a &= *b;
        }
    }

    fn admissible_bits(&self) -> u32 {
        if self.min > self.max {
            return 0;
        }
        self.filter.iter().map(|w| w.count_ones()).sum()
    }
}

/// Values actually seen for a variable
#[derive(Debug, Clone)]
pub struct ObservedDomain {
    state: DomainState,
}

impl Default for ObservedDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservedDomain {
    /// An empty observation
    pub fn new() -> Self {
        Self {
            state: DomainState::nothing(),
        }
    }

    /// Record a value
    pub fn add(&mut self, value: u32) {
        self.state.min = self.state.min.min(value);
        self.state.max = self.state.max.max(value);
        let (word, mask) = DomainState::bit(value);
        self.state.filter[word] |= mask;
    }

    /// Was nothing recorded?
    pub fn is_empty(&self) -> bool {
        self.state.min > self.state.max
    }

    pub fn could_qualify(&self, value: u32) -> bool {
        self.state.could_qualify(value)
    }
}

/// Possible values of a join variable, shared between its producers
#[derive(Debug)]
pub struct PotentialDomain {
    state: Mutex<DomainState>,
}

impl Default for PotentialDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl PotentialDomain {
    /// A domain admitting every value
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DomainState::everything()),
        }
    }

    /// Might `value` still be part of the result?
    pub fn could_qualify(&self, value: u32) -> bool {
        self.state.lock().could_qualify(value)
    }

    /// Smallest value >= `value` that could qualify, `u32::MAX` when none
    pub fn next_candidate(&self, value: u32) -> u32 {
        self.state.lock().next_candidate(value)
    }

    /// Narrow to the values in `observed`
    pub fn restrict_to(&self, observed: &ObservedDomain) {
        self.state.lock().intersect(&observed.state);
    }

    /// Intersect two domains describing the same variable; both end up equal
    pub fn sync(&self, other: &PotentialDomain) {
        if std::ptr::eq(self, other) {
            return;
        }
        // lock in address order
        let (first, second) = if (self as *const Self) < (other as *const Self) {
            (self, other)
        } else {
            (other, self)
        };
        let mut a = first.state.lock();
        let mut b = second.state.lock();
        a.intersect(&b);
        *b = a.clone();
    }

    /// Intersect with a shared domain
    pub fn sync_shared(a: &Arc<PotentialDomain>, b: &Arc<PotentialDomain>) {
        a.sync(b)
    }

    /// Number of filter bits still set, 0 if the range is empty
    pub fn admissible_bits(&self) -> u32 {
        self.state.lock().admissible_bits()
    }

    /// Current `[min, max]` range
    pub fn bounds(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.min, state.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_potential_starts_full() {
        let d = PotentialDomain::new();
        assert!(d.could_qualify(0));
        assert!(d.could_qualify(123_456));
        assert_eq!(d.next_candidate(77), 77);
        assert_eq!(d.admissible_bits(), FILTER_BITS);
    }

    #[test]
    fn test_restrict_to_observed() {
        let d = PotentialDomain::new();
        let mut o = ObservedDomain::new();
        for v in [10, 20, 20 + FILTER_BITS] {
            o.add(v);
        }
        d.restrict_to(&o);
        assert!(d.could_qualify(10));
        assert!(d.could_qualify(20));
        assert!(d.could_qualify(20 + FILTER_BITS));
        assert!(!d.could_qualify(11));
        assert!(!d.could_qualify(9));
        assert!(!d.could_qualify(21 + FILTER_BITS));
        assert_eq!(d.bounds(), (10, 20 + FILTER_BITS));
    }

    #[test]
    fn test_next_candidate_skips_to_set_bits() {
        let d = PotentialDomain::new();
        let mut o = ObservedDomain::new();
        o.add(100);
        o.add(5000);
        o.add(100 + FILTER_BITS);
        d.restrict_to(&o);
        assert_eq!(d.next_candidate(0), 100);
        assert_eq!(d.next_candidate(100), 100);
        assert_eq!(d.next_candidate(101), 5000);
        // wraps around the filter to residue 100
        assert_eq!(d.next_candidate(5001), 100 + FILTER_BITS);
        assert_eq!(d.next_candidate(101 + FILTER_BITS), u32::MAX);
    }

    #[test]
    fn test_empty_observation_excludes_everything() {
        let d = PotentialDomain::new();
        d.restrict_to(&ObservedDomain::new());
        assert!(!d.could_qualify(0));
        assert_eq!(d.next_candidate(0), u32::MAX);
        assert_eq!(d.admissible_bits(), 0);
    }

    #[test]
    fn test_sync_converges_and_never_grows() {
        let a = Arc::new(PotentialDomain::new());
        let b = Arc::new(PotentialDomain::new());
        let mut oa = ObservedDomain::new();
        let mut ob = ObservedDomain::new();
        for v in 0..50 {
            oa.add(v * 3);
            ob.add(v * 2);
        }
        a.restrict_to(&oa);
        b.restrict_to(&ob);
        let before = a.admissible_bits().max(b.admissible_bits());
        PotentialDomain::sync_shared(&a, &b);
        assert_eq!(a.bounds(), b.bounds());
        assert_eq!(a.admissible_bits(), b.admissible_bits());
        assert!(a.admissible_bits() <= before);
        assert!(a.could_qualify(6));
        assert!(!a.could_qualify(3));
        assert!(!b.could_qualify(4));
        // syncing with itself is a no-op
        a.sync(&a);
        assert!(a.could_qualify(6));
    }

    #[test]
    fn test_observed_values_always_qualify() {
        let mut rng = fastrand::Rng::with_seed(7);
        let d = PotentialDomain::new();
        let mut o = ObservedDomain::new();
        let values: Vec<u32> = (0..200).map(|_| rng.u32(..1_000_000)).collect();
        for v in &values {
            o.add(*v);
        }
        d.restrict_to(&o);
        for v in &values {
            assert!(d.could_qualify(*v));
            assert_eq!(d.next_candidate(*v), *v);
        }
    }
}
