//! Deterministic summation of path amplitudes.
//!
//! All sums are taken pairwise over an ordered list of partial results: for a
//! fixed partition order and block size, the order of every floating-point
//! addition is fixed, so results do not depend on thread scheduling.

use std::ops::{ Add, AddAssign, Mul };
use itertools::Itertools;
use num_complex::Complex32 as C32;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use crate::{
    bits::BitState,
    filter::MeasureConfig,
    kernel::Lane,
};

/* Combine ********************************************************************/

/// An associative combining operation with an identity element.
pub trait Combine: Sized {
    /// The identity for [`Self::combine`].
    fn identity() -> Self;

    /// Combine two partial results.
    fn combine(self, other: Self) -> Self;
}

impl Combine for f32 {
    fn identity() -> Self { 0.0 }

    fn combine(self, other: Self) -> Self { self + other }
}

impl Combine for C32 {
    fn identity() -> Self { C32::new(0.0, 0.0) }

    fn combine(self, other: Self) -> Self { self + other }
}

impl<A, B> Combine for (A, B)
where
    A: Combine,
    B: Combine,
{
    fn identity() -> Self { (A::identity(), B::identity()) }

    fn combine(self, other: Self) -> Self {
        (self.0.combine(other.0), self.1.combine(other.1))
    }
}

/// Combine all items by repeatedly combining adjacent pairs.
///
/// Returns [`Combine::identity`] if `items` is empty.
pub fn tree_reduce<T>(mut items: Vec<T>) -> T
where T: Combine
{
    while items.len() > 1 {
        items
            = items.into_iter()
            .chunks(2).into_iter()
            .map(|mut pair| {
                let Some(a) = pair.next() else { unreachable!() };
                match pair.next() {
                    Some(b) => a.combine(b),
                    None => a,
                }
            })
            .collect();
    }
    items.pop().unwrap_or_else(T::identity)
}

/* SumPair ********************************************************************/

/// Amplitude sums for the two values of a split bit.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SumPair {
    /// Sum over paths whose split bit is 0.
    pub val0: C32,
    /// Sum over paths whose split bit is 1.
    pub val1: C32,
}

impl Add for SumPair {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { val0: self.val0 + rhs.val0, val1: self.val1 + rhs.val1 }
    }
}

impl AddAssign for SumPair {
    fn add_assign(&mut self, rhs: Self) {
        self.val0 += rhs.val0;
        self.val1 += rhs.val1;
    }
}

impl Mul<f32> for SumPair {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self { val0: self.val0 * rhs, val1: self.val1 * rhs }
    }
}

impl Combine for SumPair {
    fn identity() -> Self { Self::default() }

    fn combine(self, other: Self) -> Self { self + other }
}

impl SumPair {
    /// A pair with `amp` in the half selected by `bit`.
    pub fn single(bit: bool, amp: C32) -> Self {
        if bit {
            Self { val0: C32::new(0.0, 0.0), val1: amp }
        } else {
            Self { val0: amp, val1: C32::new(0.0, 0.0) }
        }
    }

    /// Return the squared magnitudes of both halves.
    pub fn norm_sqr(&self) -> (f32, f32) {
        (self.val0.norm_sqr(), self.val1.norm_sqr())
    }
}

/* PartialSums ****************************************************************/

/// [`SumPair`]s keyed by final state (with the split bit cleared).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialSums(FxHashMap<u64, SumPair>);

impl Combine for PartialSums {
    fn identity() -> Self { Self::default() }

    fn combine(self, other: Self) -> Self { self.merge(other) }
}

impl PartialSums {
    /// Create a new, empty set of sums.
    pub fn new() -> Self { Self::default() }

    /// Add `amp` to the sum at `key` in the half selected by `bit`.
    pub fn add(&mut self, key: u64, bit: bool, amp: C32) {
        *self.0.entry(key).or_default() += SumPair::single(bit, amp);
    }

    /// Add every sum in `other` to `self`, key by key.
    pub fn merge(mut self, other: Self) -> Self {
        if self.0.len() < other.0.len() {
            // keep addition order: self's value always goes on the left
            let mut other = other;
            for (k, v) in self.0 {
                let slot = other.0.entry(k).or_default();
                *slot = v + *slot;
            }
            return other;
        }
        for (k, v) in other.0 {
            *self.0.entry(k).or_default() += v;
        }
        self
    }

    /// Return the sum at `key`, if any path ended there.
    pub fn get(&self, key: u64) -> Option<&SumPair> { self.0.get(&key) }

    /// Return the number of distinct keys.
    pub fn len(&self) -> usize { self.0.len() }

    /// Return `true` if no path contributed.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterate over all keys and sums in ascending key order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (u64, SumPair)> + '_ {
        self.0.iter()
            .map(|(k, v)| (*k, *v))
            .sorted_by_key(|(k, _)| *k)
    }

    /// Multiply every sum by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.0.values_mut().for_each(|v| { *v = *v * factor; });
    }

    /// Return the total probability weight on either side of the split bit.
    pub fn probabilities(&self) -> (f32, f32) {
        tree_reduce(self.iter_sorted().map(|(_, v)| v.norm_sqr()).collect())
    }

    /// Expand keyed pairs back into full final states and their amplitudes,
    /// sorted by state and omitting exact zeros.
    pub fn states(&self, split_bit: u32) -> Vec<(u64, C32)> {
        let zero = C32::new(0.0, 0.0);
        self.iter_sorted()
            .flat_map(|(k, v)| {
                [(k, v.val0), (BitState(k).with(split_bit, true).bits(), v.val1)]
            })
            .filter(|(_, a)| *a != zero)
            .sorted_by_key(|(k, _)| *k)
            .collect()
    }
}

/// Sum the amplitudes of all kept lanes, grouped by final state.
///
/// Lanes are summed sequentially within blocks of `block_size`, and the ordered
/// block results are then combined pairwise.
pub fn reduce_lanes(lanes: &[Lane], measure: &MeasureConfig, block_size: usize)
    -> PartialSums
{
    let blocks: Vec<PartialSums>
        = lanes.par_chunks(block_size.max(1))
        .map(|block| {
            let mut sums = PartialSums::new();
            block.iter()
                .filter(|lane| !lane.is_dead() && measure.keep(lane.state))
                .for_each(|lane| {
                    let (key, bit) = measure.key(lane.state);
                    sums.add(key, bit, lane.amp);
                });
            sums
        })
        .collect();
    tree_reduce(blocks)
}
