//! Execution of single dispatches.
//!
//! A [`Backend`] receives one [`ChoiceConfig`] at a time and returns the
//! partial sums over every path in it. [`CpuBackend`] steps all lanes of a
//! dispatch through each gate in turn with [`rayon`], with a barrier between
//! gates, then hands the lanes to [`reduce_lanes`].

use std::sync::{
    Arc,
    atomic::{ AtomicBool, Ordering },
};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use tracing::trace;
use crate::{
    bits::BitState,
    error::{ PathError, Result },
    filter::MeasureConfig,
    gate::GateInstance,
    kernel::Lane,
    partition::ChoiceConfig,
    reduce::{ reduce_lanes, PartialSums },
};

/// Shared flag used to abort a running calculation.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a new, unset flag.
    pub fn new() -> Self { Self::default() }

    /// Request cancellation.
    pub fn cancel(&self) { self.0.store(true, Ordering::Relaxed); }

    /// Withdraw a cancellation request.
    pub fn reset(&self) { self.0.store(false, Ordering::Relaxed); }

    /// Return `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Relaxed) }

    /// Return `Err(Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(PathError::Cancelled) } else { Ok(()) }
    }
}

/// Everything shared by the dispatches of a single calculation.
#[derive(Debug)]
pub struct Job<'a> {
    gates: &'a [GateInstance],
    measure: MeasureConfig,
    initial: BitState,
    record_base: u32,
    lanes: u64,
    block_size: usize,
    cancel: CancelFlag,
    prefix: OnceCell<Vec<Lane>>,
}

impl<'a> Job<'a> {
    /// Create a new job.
    ///
    /// `gates` must hold at least `measure.num_gates` instances, and `lanes`
    /// must be a power of two covering every choice bit read by the first
    /// `measure.num_gates_common` of them.
    pub fn new(
        gates: &'a [GateInstance],
        measure: MeasureConfig,
        initial: BitState,
        record_base: u32,
        lanes: u64,
        block_size: usize,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            gates,
            measure,
            initial,
            record_base,
            lanes,
            block_size,
            cancel,
            prefix: OnceCell::new(),
        }
    }

    /// Return the gates.
    pub fn gates(&self) -> &'a [GateInstance] { self.gates }

    /// Return the measurement filter.
    pub fn measure(&self) -> &MeasureConfig { &self.measure }

    /// Return the state every path starts in.
    pub fn initial(&self) -> BitState { self.initial }

    /// Return the bit position of the first measurement record slot.
    pub fn record_base(&self) -> u32 { self.record_base }

    /// Return the number of lanes per dispatch.
    pub fn lanes(&self) -> u64 { self.lanes }

    /// Return the reduction block size.
    pub fn block_size(&self) -> usize { self.block_size }

    /// Return the cancellation flag.
    pub fn cancel_flag(&self) -> &CancelFlag { &self.cancel }

    /// Return the lanes after the gates common to every dispatch, computing
    /// them on first use.
    pub fn prefix(&self) -> Result<&[Lane]> {
        self.prefix.get_or_try_init(|| {
            let num_common = self.measure.num_gates_common;
            trace!(gates = num_common, lanes = self.lanes, "computing common prefix");
            let mut lanes = vec![Lane::new(self.initial); self.lanes as usize];
            let base = ChoiceConfig { num_gates: num_common, rest_of_choices: 0 };
            for gate in &self.gates[..num_common] {
                self.cancel.check()?;
                step_lanes(&mut lanes, gate, base, self.record_base, self.block_size);
            }
            Ok(lanes)
        })
        .map(|lanes| lanes.as_slice())
    }
}

/// Step every lane in `lanes` through `gate`, where lane `l` walks path
/// `config.path(l)`.
pub fn step_lanes(
    lanes: &mut [Lane],
    gate: &GateInstance,
    config: ChoiceConfig,
    record_base: u32,
    block_size: usize,
) {
    let block_size = block_size.max(1);
    lanes.par_chunks_mut(block_size)
        .enumerate()
        .for_each(|(b, chunk)| {
            let offs = (b * block_size) as u64;
            chunk.iter_mut()
                .enumerate()
                .for_each(|(j, lane)| {
                    lane.step(gate, config.path(offs + j as u64), record_base);
                });
        });
}

/// Something that can run a single dispatch.
pub trait Backend {
    /// Walk every path in `config` and return their partial sums.
    ///
    /// `index` is the position of `config` in enumeration order. Failures that
    /// may succeed on a second attempt should be reported as
    /// [`PathError::DispatchFailure`].
    fn dispatch(&self, job: &Job<'_>, config: ChoiceConfig, index: u64)
        -> Result<PartialSums>;
}

impl<B> Backend for &B
where B: Backend + ?Sized
{
    fn dispatch(&self, job: &Job<'_>, config: ChoiceConfig, index: u64)
        -> Result<PartialSums>
    {
        (**self).dispatch(job, config, index)
    }
}

/// Runs dispatches on the current [`rayon`] thread pool.
#[derive(Copy, Clone, Debug, Default)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    fn dispatch(&self, job: &Job<'_>, config: ChoiceConfig, index: u64)
        -> Result<PartialSums>
    {
        let num_common = job.measure().num_gates_common;
        if config.num_gates > job.gates().len() || num_common > config.num_gates {
            return Err(PathError::circuit(format!(
                "dispatch {}: gate range {}..{} out of bounds for {} gates",
                index, num_common, config.num_gates, job.gates().len(),
            )));
        }
        let mut lanes = job.prefix()?.to_vec();
        for gate in &job.gates()[num_common..config.num_gates] {
            job.cancel_flag().check()?;
            step_lanes(&mut lanes, gate, config, job.record_base(), job.block_size());
        }
        Ok(reduce_lanes(&lanes, job.measure(), job.block_size()))
    }
}
