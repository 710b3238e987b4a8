//! Computational basis states as packed bit words.
//!
//! A [`BitState`] holds the value of every qubit in a register, with bit *i*
//! being the value of qubit *i*. Above the register sit the outcomes of any
//! measurements made along a path (the *record*), so that for a circuit of *n*
//! qubits, bit *n* + *k* holds the outcome of the *k*-th measurement.

use std::fmt;

/// Largest number of qubits in a register.
pub const MAX_QUBITS: usize = 32;

/// Largest number of measurements in a circuit.
pub const MAX_MEASUREMENTS: usize = 32;

/// A basis state plus measurement record, packed into a single word.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitState(pub u64);

impl From<u64> for BitState {
    fn from(bits: u64) -> Self { Self(bits) }
}

impl From<BitState> for u64 {
    fn from(state: BitState) -> Self { state.0 }
}

impl fmt::Binary for BitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl BitState {
    /// The all-zero state ∣0...0⟩ with an empty record.
    pub const fn zero() -> Self { Self(0) }

    /// Return the bare word.
    pub const fn bits(self) -> u64 { self.0 }

    /// Return the value of bit `k`.
    pub const fn get(self, k: u32) -> bool { (self.0 >> k) & 1 == 1 }

    /// Return a copy with bit `k` set to `val`.
    pub const fn with(self, k: u32, val: bool) -> Self {
        Self((self.0 & !(1 << k)) | ((val as u64) << k))
    }

    /// Return a copy with bit `k` flipped.
    pub const fn toggled(self, k: u32) -> Self { Self(self.0 ^ (1 << k)) }

    /// Return `true` if the bits under `mask` equal `pattern`.
    pub const fn matches(self, mask: u64, pattern: u64) -> bool {
        self.0 & mask == pattern
    }

    /// Return only the register part of `self` for `n` qubits.
    pub const fn register(self, n: usize) -> u64 { self.0 & low_mask(n) }

    /// Return only the record part of `self` for `n` qubits.
    pub const fn record(self, n: usize) -> u64 {
        if n >= 64 { 0 } else { self.0 >> n }
    }
}

/// Mask covering the lowest `n` bits.
pub const fn low_mask(n: usize) -> u64 {
    if n >= 64 { u64::MAX } else { (1 << n) - 1 }
}

/// Render the lowest `bit_count` bits of `val`, most significant first,
/// printing `?` wherever `unknown_mask` is set.
pub fn binary_string(val: u64, bit_count: usize, unknown_mask: u64) -> String {
    (0..bit_count.min(64)).rev()
        .map(|i| {
            if (unknown_mask >> i) & 1 == 1 {
                '?'
            } else if (val >> i) & 1 == 1 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accessors() {
        let s = BitState::zero().with(0, true).with(3, true);
        assert_eq!(s.bits(), 0b1001);
        assert!(s.get(0));
        assert!(!s.get(1));
        assert_eq!(s.toggled(0).bits(), 0b1000);
        assert_eq!(s.with(3, false).bits(), 0b0001);
        assert!(s.matches(0b1000, 0b1000));
        assert!(!s.matches(0b0110, 0b0010));
    }

    #[test]
    fn register_and_record() {
        let s = BitState(0b10_101);
        assert_eq!(s.register(3), 0b101);
        assert_eq!(s.record(3), 0b10);
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(64), u64::MAX);
    }

    #[test]
    fn binary_strings() {
        assert_eq!(binary_string(0b0110, 4, 0), "0110");
        assert_eq!(binary_string(0b01, 4, !0 << 2), "??01");
        assert_eq!(binary_string(5, 0, 0), "");
    }
}
