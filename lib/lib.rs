//! Tools for simulating quantum circuits as sums over computational paths.
//!
//! Every Hadamard-like gate in a circuit is treated as a *choice*: a single
//! path through the circuit picks one outgoing branch at each choice gate, so
//! that a circuit with *c* choice gates is described by 2<sup>*c*</sup> paths.
//! Each path starts in a computational basis state, is walked through the
//! compiled gate sequence, and ends in another basis state carrying a complex
//! amplitude. Amplitudes of paths ending in the same state are summed, and the
//! squared magnitudes of those sums give outcome probabilities.
//!
//! Paths are enumerated in bounded-width dispatches (see [`partition`]), walked
//! gate by gate in parallel (see [`kernel`]), filtered against measurement
//! outcomes (see [`filter`]), and combined by pairwise summation (see
//! [`reduce`]). The host-side loop over dispatches lives in [`controller`], and
//! [`sim`] wraps everything into probabilities, amplitudes, and measurement
//! sampling.
//!
//! # Example
//! ```
//! use path_sim::{
//!     bits::BitState,
//!     config::SimConfig,
//!     encode::Program,
//!     gate::{ Gate, Op },
//!     sim::Simulator,
//! };
//!
//! // prepare a Bell state on qubits 0, 1
//! let ops = vec![Op::from(Gate::H(0)), Op::cx(0, 1)];
//! let program = Program::encode(2, ops).unwrap();
//! let sim = Simulator::new(SimConfig::default()).unwrap();
//! let probs = sim.probabilities(&program, BitState::zero()).unwrap();
//! assert!((probs[0b00] - 0.5).abs() < 1e-5);
//! assert!((probs[0b11] - 0.5).abs() < 1e-5);
//! ```

pub mod error;
pub mod bits;
pub mod gate;
pub mod encode;
pub mod parse;
pub mod kernel;
pub mod partition;
pub mod filter;
pub mod reduce;
pub mod config;
pub mod backend;
pub mod controller;
pub mod sim;
pub mod wire;

pub use error::{ PathError, Result };
