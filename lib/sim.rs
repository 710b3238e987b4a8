//! High-level queries over compiled programs.
//!
//! [`Simulator`] wraps a [`Controller`] and answers the usual questions asked
//! of a circuit: final amplitudes and probabilities, *Z* expectation values,
//! and the outcomes of its measurements, sampled one bit at a time in program
//! order.

use nalgebra as na;
use num_complex::Complex32 as C32;
use rand::Rng;
use rustc_hash::FxHashMap;
use tracing::debug;
use crate::{
    backend::{ Backend, CpuBackend },
    bits::{ low_mask, BitState },
    config::SimConfig,
    controller::{ Controller, Query },
    encode::Program,
    error::{ PathError, Result },
};

/// Largest register for which dense amplitude vectors are produced.
pub const MAX_DENSE_QUBITS: usize = 24;

/// Outcome of measuring every measurement in a program once.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Measurement record, with bit *k* holding the *k*-th outcome.
    pub value: u64,
    /// Number of meaningful bits in `value`.
    pub bits: usize,
    /// Probability of observing exactly this record.
    pub probability: f32,
}

/// Answers amplitude, probability, and measurement queries.
#[derive(Debug)]
pub struct Simulator<B = CpuBackend> {
    controller: Controller<B>,
}

impl Simulator<CpuBackend> {
    /// Create a new simulator running on the CPU.
    pub fn new(config: SimConfig) -> Result<Self> {
        Ok(Self { controller: Controller::new(config)? })
    }
}

impl<B> Simulator<B>
where B: Backend
{
    /// Create a new simulator running on `backend`.
    pub fn with_backend(config: SimConfig, backend: B) -> Result<Self> {
        Ok(Self { controller: Controller::with_backend(config, backend)? })
    }

    /// Return the underlying controller.
    pub fn controller(&self) -> &Controller<B> { &self.controller }

    /// Return the amplitude of the final word `target` (register plus
    /// measurement record) after running `program` on `initial`.
    pub fn amplitude(&self, program: &Program, initial: BitState, target: BitState)
        -> Result<C32>
    {
        let query = Query::full(program)
            .from_state(initial)
            .matching(low_mask(program.word_bits()), target.bits());
        let done = self.controller.run(program, query)?;
        let (key, bit) = (target.with(0, false).bits(), target.get(0));
        Ok(
            done.sums.get(key)
                .map(|pair| if bit { pair.val1 } else { pair.val0 })
                .unwrap_or_else(|| C32::new(0.0, 0.0))
        )
    }

    /// Return the full final state vector of a measurement-free program.
    pub fn amplitudes(&self, program: &Program, initial: BitState)
        -> Result<na::DVector<C32>>
    {
        if program.num_measurements() > 0 {
            return Err(PathError::circuit(
                "dense amplitudes are undefined after measurements"));
        }
        if program.num_qubits() > MAX_DENSE_QUBITS {
            return Err(PathError::circuit(format!(
                "too many qubits for a dense state ({} > {})",
                program.num_qubits(), MAX_DENSE_QUBITS,
            )));
        }
        let query = Query::full(program).from_state(initial);
        let done = self.controller.run(program, query)?;
        let mut psi = na::DVector::zeros(1 << program.num_qubits());
        done.sums.states(0).into_iter()
            .for_each(|(k, a)| { psi[k as usize] = a; });
        Ok(psi)
    }

    /// Return the probabilities of every final basis state of a
    /// measurement-free program.
    pub fn probabilities(&self, program: &Program, initial: BitState)
        -> Result<na::DVector<f32>>
    {
        Ok(self.amplitudes(program, initial)?.map(|a| a.norm_sqr()))
    }

    /// Return ⟨*Z*⟩ on qubit `k` at the end of `program`.
    pub fn expectation_z(&self, program: &Program, initial: BitState, k: usize)
        -> Result<f32>
    {
        if k >= program.num_qubits() {
            return Err(PathError::qubit(program.len(), k, "out of range"));
        }
        let query = Query::full(program).from_state(initial).split_on(k as u32);
        let (p0, p1) = self.controller.run(program, query)?.sums.probabilities();
        Ok(p0 - p1)
    }

    /// Return the probability that measurement `k` gives 1, given that the
    /// measurements before it gave the outcomes in `previous` (bit *j* holding
    /// the outcome of measurement *j*).
    ///
    /// Fails with [`PathError::NoMatchingPaths`] if the earlier outcomes are
    /// impossible.
    pub fn bit_probability(
        &self,
        program: &Program,
        initial: BitState,
        k: usize,
        previous: u64,
    ) -> Result<f32>
    {
        let point = program.measurements().get(k)
            .ok_or_else(|| PathError::circuit(format!(
                "no measurement {} in a program with {}",
                k, program.num_measurements(),
            )))?;
        let n = program.num_qubits();
        let mask = low_mask(k) << n;
        let query = Query::full(program)
            .upto(point.gate + 1)
            .from_state(initial)
            .matching(mask, previous << n)
            .split_on(program.record_bit(k));
        let (p0, p1) = self.controller.run(program, query)?.sums.probabilities();
        let total = p0 + p1;
        if total <= 0.0 || !total.is_finite() {
            return Err(PathError::NoMatchingPaths);
        }
        debug!(measurement = k, p0, p1, "bit probability");
        Ok(p1 / total)
    }

    /// Sample every measurement in `program` in order.
    pub fn measure<R>(&self, program: &Program, initial: BitState, rng: &mut R)
        -> Result<Measurement>
    where R: Rng + ?Sized
    {
        let mut cache = FxHashMap::default();
        self.measure_cached(program, initial, rng, &mut cache)
    }

    fn measure_cached<R>(
        &self,
        program: &Program,
        initial: BitState,
        rng: &mut R,
        cache: &mut FxHashMap<(usize, u64), f32>,
    ) -> Result<Measurement>
    where R: Rng + ?Sized
    {
        let mut value: u64 = 0;
        let mut probability: f32 = 1.0;
        for k in 0..program.num_measurements() {
            let p1 = match cache.get(&(k, value)) {
                Some(p) => *p,
                None => {
                    let p = self.bit_probability(program, initial, k, value)?;
                    cache.insert((k, value), p);
                    p
                },
            };
            let outcome = rng.gen::<f32>() < p1;
            probability *= if outcome { p1 } else { 1.0 - p1 };
            value |= u64::from(outcome) << k;
        }
        Ok(Measurement { value, bits: program.num_measurements(), probability })
    }

    /// Sample every measurement in `program` `shots` times, returning the
    /// number of times each record was seen.
    pub fn sample<R>(
        &self,
        program: &Program,
        initial: BitState,
        shots: usize,
        rng: &mut R,
    ) -> Result<FxHashMap<u64, usize>>
    where R: Rng + ?Sized
    {
        let mut cache = FxHashMap::default();
        let mut counts = FxHashMap::default();
        for _ in 0..shots {
            let m = self.measure_cached(program, initial, rng, &mut cache)?;
            *counts.entry(m.value).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
