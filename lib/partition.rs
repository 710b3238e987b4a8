//! Splitting the space of paths into bounded-width dispatches.
//!
//! For *c* choice bits and a width limit *w*, the lowest *k* = min(*c*,
//! ⌊log<sub>2</sub> *w*⌋) choice bits of a path are enumerated within a single
//! dispatch (one lane per value) and the remaining *c* − *k* are fixed per
//! dispatch. Configuration *i* fixes them to the bits of *i*, so that a lane
//! `l` in configuration *i* walks the path `(i << k) | l`.

use crate::error::{ PathError, Result };

/// Largest number of choice bits that can be partitioned.
pub const MAX_CHOICE_BITS: usize = 32;

/// Parameters for a single dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChoiceConfig {
    /// Number of gates to execute.
    pub num_gates: usize,
    /// Fixed upper choice bits, already shifted into position.
    pub rest_of_choices: u32,
}

impl ChoiceConfig {
    /// Return the full path index walked by in-dispatch lane `lane`.
    pub fn path(&self, lane: u64) -> u64 {
        u64::from(self.rest_of_choices) | lane
    }
}

/// Enumerates [`ChoiceConfig`]s covering every path exactly once.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChoicePartitioner {
    choice_bits: usize,
    enumerated_bits: u32,
}

impl ChoicePartitioner {
    /// Create a new partitioner for `choice_bits` choice bits and at most
    /// `max_width` lanes per dispatch.
    pub fn new(choice_bits: usize, max_width: u64) -> Result<Self> {
        if choice_bits > MAX_CHOICE_BITS {
            return Err(PathError::PartitionOverflow {
                choice_bits,
                max: MAX_CHOICE_BITS,
            });
        }
        if max_width == 0 {
            return Err(PathError::config("dispatch width must be non-zero"));
        }
        let enumerated_bits = (choice_bits as u32).min(max_width.ilog2());
        Ok(Self { choice_bits, enumerated_bits })
    }

    /// Return the total number of choice bits.
    pub fn choice_bits(&self) -> usize { self.choice_bits }

    /// Return the number of choice bits enumerated within each dispatch.
    pub fn enumerated_bits(&self) -> u32 { self.enumerated_bits }

    /// Return the number of lanes in each dispatch.
    pub fn lanes(&self) -> u64 { 1 << self.enumerated_bits }

    /// Return the number of dispatches.
    pub fn len(&self) -> u64 {
        1 << (self.choice_bits as u32 - self.enumerated_bits)
    }

    /// Always `false`: there is at least one dispatch, even for no choices.
    pub fn is_empty(&self) -> bool { false }

    /// Return the `index`-th configuration, if it exists.
    pub fn config(&self, index: u64, num_gates: usize) -> Option<ChoiceConfig> {
        (index < self.len())
            .then(|| ChoiceConfig {
                num_gates,
                rest_of_choices: (index << self.enumerated_bits) as u32,
            })
    }

    /// Iterate over all configurations in order.
    pub fn iter(&self, num_gates: usize) -> Configs {
        self.iter_from(0, num_gates)
    }

    /// Iterate over configurations in order, starting at `cursor`.
    pub fn iter_from(&self, cursor: u64, num_gates: usize) -> Configs {
        Configs { part: *self, num_gates, next: cursor.min(self.len()) }
    }
}

/// Iterator over [`ChoiceConfig`]s, created by [`ChoicePartitioner::iter`].
#[derive(Clone, Debug)]
pub struct Configs {
    part: ChoicePartitioner,
    num_gates: usize,
    next: u64,
}

impl Configs {
    /// Index of the configuration that will be yielded next.
    pub fn cursor(&self) -> u64 { self.next }
}

impl Iterator for Configs {
    type Item = ChoiceConfig;

    fn next(&mut self) -> Option<Self::Item> {
        let config = self.part.config(self.next, self.num_gates)?;
        self.next += 1;
        Some(config)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = (self.part.len() - self.next) as usize;
        (rem, Some(rem))
    }
}

impl ExactSizeIterator for Configs { }
