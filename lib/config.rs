//! Tuning parameters for path-sum calculations.

use crate::error::{ PathError, Result };

/// Settings shared by every calculation run through a
/// [`Controller`][crate::controller::Controller].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    /// Largest number of paths walked in a single dispatch. Rounded down to a
    /// power of two.
    pub max_width: u64,
    /// Number of lanes summed sequentially before pairwise reduction.
    pub block_size: usize,
    /// Number of times a failed dispatch is re-run before giving up.
    pub max_retries: u32,
    /// Circuits with more choice gates than this log a warning.
    pub warn_choices: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_width: 1 << 20,
            block_size: 1 << 8,
            max_retries: 2,
            warn_choices: 28,
        }
    }
}

impl SimConfig {
    /// Set `max_width`.
    pub fn with_max_width(mut self, max_width: u64) -> Self {
        self.max_width = max_width;
        self
    }

    /// Set `block_size`.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set `max_retries`.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set `warn_choices`.
    pub fn with_warn_choices(mut self, warn_choices: usize) -> Self {
        self.warn_choices = warn_choices;
        self
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 {
            return Err(PathError::config("max_width must be non-zero"));
        }
        if self.max_width > 1 << 32 {
            return Err(PathError::config(format!(
                "max_width {} exceeds 2^32", self.max_width)));
        }
        if self.block_size == 0 {
            return Err(PathError::config("block_size must be non-zero"));
        }
        Ok(())
    }
}
