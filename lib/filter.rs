//! Selection of paths consistent with earlier measurement outcomes.

use crate::bits::BitState;

/// Describes which paths contribute to a calculation and how their final
/// states are grouped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MeasureConfig {
    /// Number of gates each path is walked through.
    pub num_gates: usize,
    /// Number of leading gates that are identical across all dispatches.
    pub num_gates_common: usize,
    /// Bits of the final state that must match `match_measure`.
    pub match_mask: u64,
    /// Required values of the bits under `match_mask`.
    pub match_measure: u64,
    /// Bit whose value selects which half of a [`SumPair`] a path adds to.
    ///
    /// [`SumPair`]: crate::reduce::SumPair
    pub split_bit: u32,
    /// Number of choice bits fixed per dispatch.
    pub rest_of_choices_length: u32,
}

impl MeasureConfig {
    /// A configuration that keeps every path.
    pub fn keep_all(num_gates: usize, split_bit: u32) -> Self {
        Self {
            num_gates,
            num_gates_common: 0,
            match_mask: 0,
            match_measure: 0,
            split_bit,
            rest_of_choices_length: 0,
        }
    }

    /// Return a copy requiring the bits under `mask` to equal `pattern`.
    pub fn matching(mut self, mask: u64, pattern: u64) -> Self {
        self.match_mask = mask;
        self.match_measure = pattern & mask;
        self
    }

    /// Return `true` if a path ending in `state` contributes.
    pub fn keep(&self, state: BitState) -> bool {
        state.matches(self.match_mask, self.match_measure)
    }

    /// Split a final state into its grouping key (with the split bit cleared)
    /// and the value of the split bit.
    pub fn key(&self, state: BitState) -> (u64, bool) {
        let bit = state.get(self.split_bit);
        (state.with(self.split_bit, false).bits(), bit)
    }
}
