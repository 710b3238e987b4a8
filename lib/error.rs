//! Errors produced while compiling, partitioning, and running path sums.

use std::io;
use thiserror::Error;

/// Result type alias for path-sum operations.
pub type Result<T> = std::result::Result<T, PathError>;

/// Ways in which a line of circuit text can fail to parse.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParseFault {
    /// A qubit argument is not an integer.
    InvalidSyntaxArg,
    /// A gate parameter is not a number.
    InvalidSyntaxParam,
    /// Wrong number of `_`-separated parameters for the gate.
    InvalidGateParamCount,
    /// Wrong number of qubit arguments for the gate.
    InvalidGateArgCount,
}

impl std::fmt::Display for ParseFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::InvalidSyntaxArg => write!(f, "invalid argument syntax"),
            Self::InvalidSyntaxParam => write!(f, "invalid parameter syntax"),
            Self::InvalidGateParamCount
                => write!(f, "invalid number of parameters"),
            Self::InvalidGateArgCount
                => write!(f, "invalid number of arguments"),
        }
    }
}

/// Errors that can occur anywhere between circuit text and final sums.
#[derive(Error, Debug)]
pub enum PathError {
    /// A target or control index is out of range, or repeated within one gate.
    #[error("gate {gate}: invalid qubit index {qubit} ({reason})")]
    InvalidQubitIndex {
        /// Position of the offending gate in the input.
        gate: usize,
        /// The offending qubit index.
        qubit: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A phase factor is NaN or infinite.
    #[error("gate {gate}: non-finite phase ({re}, {im})")]
    InvalidPhase {
        /// Position of the offending gate in the input.
        gate: usize,
        /// Real part of the phase.
        re: f32,
        /// Imaginary part of the phase.
        im: f32,
    },

    /// More choice bits than can be represented by a dispatch configuration.
    #[error("{choice_bits} choice bits cannot be partitioned (max {max})")]
    PartitionOverflow {
        /// Number of choice bits requested.
        choice_bits: usize,
        /// Largest supported number.
        max: usize,
    },

    /// The execution backend failed to run a partition.
    #[error("dispatch {partition} failed after {attempts} attempt(s): {msg}")]
    DispatchFailure {
        /// Index of the partition in enumeration order.
        partition: u64,
        /// Number of attempts made so far.
        attempts: u32,
        /// Backend-supplied description.
        msg: String,
    },

    /// The circuit as a whole cannot be run.
    #[error("invalid circuit: {0}")]
    InvalidCircuit(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Circuit text failed to parse.
    #[error("syntax error at line {line}: {fault}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        fault: ParseFault,
    },

    /// No path is consistent with the requested measurement outcomes.
    #[error("no paths match previous measurements")]
    NoMatchingPaths,

    /// The calculation was cancelled; partial sums were discarded.
    #[error("calculation cancelled")]
    Cancelled,

    /// A host/device buffer could not be decoded.
    #[error("invalid wire data: {0}")]
    InvalidWire(String),

    /// A circuit file could not be read.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl PathError {
    pub(crate) fn qubit(gate: usize, qubit: usize, reason: &'static str)
        -> Self
    {
        Self::InvalidQubitIndex { gate, qubit, reason }
    }

    pub(crate) fn circuit(msg: impl Into<String>) -> Self {
        Self::InvalidCircuit(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub(crate) fn wire(msg: impl Into<String>) -> Self {
        Self::InvalidWire(msg.into())
    }

    /// Return `true` if retrying the same work could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DispatchFailure { .. })
    }
}
