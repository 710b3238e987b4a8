//! Host-side driving of a full path-sum calculation.
//!
//! A [`Controller`] turns a [`Program`] and a [`Query`] into a
//! [`Calculation`], which walks the dispatch configurations produced by a
//! [`ChoicePartitioner`] one at a time, hands each to a [`Backend`], and folds
//! the returned partial sums into a running total. Calculations can be stepped
//! manually, paused (see [`Calculation::into_progress`]) and resumed later, or
//! cancelled through a shared [`CancelFlag`].

use tracing::{ debug, info, warn };
use crate::{
    backend::{ Backend, CancelFlag, CpuBackend, Job },
    bits::BitState,
    config::SimConfig,
    encode::Program,
    error::{ PathError, Result },
    filter::MeasureConfig,
    partition::{ ChoicePartitioner, Configs },
    reduce::PartialSums,
};

/// What to compute over a program.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Number of leading gates to run.
    pub num_gates: usize,
    /// Final-state bits that must equal `match_measure` for a path to count.
    pub match_mask: u64,
    /// Required values of the bits under `match_mask`.
    pub match_measure: u64,
    /// Bit separating the two halves of each resulting
    /// [`SumPair`][crate::reduce::SumPair].
    pub split_bit: u32,
    /// State every path starts in.
    pub initial: BitState,
}

impl Query {
    /// Run every gate of `program` from ∣0...0⟩, keeping every path.
    pub fn full(program: &Program) -> Self {
        Self {
            num_gates: program.len(),
            match_mask: 0,
            match_measure: 0,
            split_bit: 0,
            initial: BitState::zero(),
        }
    }

    /// Run only the first `num_gates` gates.
    pub fn upto(mut self, num_gates: usize) -> Self {
        self.num_gates = num_gates;
        self
    }

    /// Keep only paths whose final bits under `mask` equal `pattern`.
    pub fn matching(mut self, mask: u64, pattern: u64) -> Self {
        self.match_mask = mask;
        self.match_measure = pattern & mask;
        self
    }

    /// Split sums on `bit`.
    pub fn split_on(mut self, bit: u32) -> Self {
        self.split_bit = bit;
        self
    }

    /// Start every path in `initial`.
    pub fn from_state(mut self, initial: BitState) -> Self {
        self.initial = initial;
        self
    }
}

/// A saved position in a paused calculation.
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    /// Index of the next dispatch to run.
    pub cursor: u64,
    /// Running total of the dispatches already run.
    pub total: PartialSums,
}

/// The result of a calculation.
#[derive(Clone, Debug)]
pub struct Completion {
    /// Normalized amplitude sums, keyed by final state.
    pub sums: PartialSums,
    /// Number of choice gates summed over.
    pub choices: usize,
    /// Number of successful dispatches made by this calculation.
    pub dispatches: u64,
    /// Number of failed dispatch attempts that were retried.
    pub retries: u32,
    /// Number of gates every path went through, or 0 if unfinished.
    pub gates_executed: usize,
    /// Whether every dispatch has run.
    pub finished: bool,
}

/// Drives calculations through a [`Backend`].
#[derive(Debug)]
pub struct Controller<B = CpuBackend> {
    config: SimConfig,
    backend: B,
    cancel: CancelFlag,
}

impl Controller<CpuBackend> {
    /// Create a new controller running on the CPU.
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_backend(config, CpuBackend)
    }
}

impl<B> Controller<B>
where B: Backend
{
    /// Create a new controller running on `backend`.
    pub fn with_backend(config: SimConfig, backend: B) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, backend, cancel: CancelFlag::new() })
    }

    /// Return the configuration.
    pub fn config(&self) -> &SimConfig { &self.config }

    /// Return the backend.
    pub fn backend(&self) -> &B { &self.backend }

    /// Return a handle to the flag that cancels the calculations currently
    /// running on this controller.
    ///
    /// The flag is cleared each time a calculation is started or resumed.
    pub fn cancel_flag(&self) -> CancelFlag { self.cancel.clone() }

    /// Prepare a calculation without running any dispatches.
    ///
    /// Fails with [`PathError::PartitionOverflow`] if too many choice gates
    /// precede `query.num_gates`.
    pub fn start<'a>(&'a self, program: &'a Program, query: Query)
        -> Result<Calculation<'a, B>>
    {
        self.resume(program, query, Progress { cursor: 0, total: PartialSums::new() })
    }

    /// Continue a calculation from a saved [`Progress`].
    ///
    /// `program` and `query` must be the same as those the calculation was
    /// started with.
    pub fn resume<'a>(&'a self, program: &'a Program, query: Query, progress: Progress)
        -> Result<Calculation<'a, B>>
    {
        if query.num_gates > program.len() {
            return Err(PathError::circuit(format!(
                "requested {} gates from a program of {}",
                query.num_gates, program.len(),
            )));
        }
        if query.split_bit >= u64::BITS {
            return Err(PathError::config(format!(
                "split bit {} out of range", query.split_bit)));
        }
        let choices = program.choices_before(query.num_gates);
        if choices > self.config.warn_choices {
            warn!(
                choices,
                "circuit has many choice gates; this will take a while"
            );
        }
        let partitioner = ChoicePartitioner::new(choices, self.config.max_width)?;
        if progress.cursor > partitioner.len() {
            return Err(PathError::config(format!(
                "cursor {} past the last of {} dispatches",
                progress.cursor, partitioner.len(),
            )));
        }
        let k = partitioner.enumerated_bits();
        let measure = MeasureConfig {
            num_gates: query.num_gates,
            num_gates_common: program.common_prefix(k, query.num_gates),
            match_mask: query.match_mask,
            match_measure: query.match_measure & query.match_mask,
            split_bit: query.split_bit,
            rest_of_choices_length: choices as u32 - k,
        };
        info!(
            gates = query.num_gates,
            common = measure.num_gates_common,
            choices,
            lanes = partitioner.lanes(),
            dispatches = partitioner.len(),
            cursor = progress.cursor,
            "starting calculation"
        );
        self.cancel.reset();
        let job = Job::new(
            program.gates(),
            measure,
            query.initial,
            program.num_qubits() as u32,
            partitioner.lanes(),
            self.config.block_size,
            self.cancel.clone(),
        );
        Ok(Calculation {
            controller: self,
            job,
            partitioner,
            configs: partitioner.iter_from(progress.cursor, query.num_gates),
            total: progress.total,
            choices,
            dispatches: 0,
            retries: 0,
        })
    }

    /// Run a calculation to completion.
    pub fn run(&self, program: &Program, query: Query) -> Result<Completion> {
        self.start(program, query)?.run()
    }
}

/// A calculation in progress.
#[derive(Debug)]
pub struct Calculation<'a, B> {
    controller: &'a Controller<B>,
    job: Job<'a>,
    partitioner: ChoicePartitioner,
    configs: Configs,
    total: PartialSums,
    choices: usize,
    dispatches: u64,
    retries: u32,
}

impl<'a, B> Calculation<'a, B>
where B: Backend
{
    /// Return the partitioner used to enumerate dispatches.
    pub fn partitioner(&self) -> &ChoicePartitioner { &self.partitioner }

    /// Return the measurement filter applied to every path.
    pub fn measure(&self) -> &MeasureConfig { self.job.measure() }

    /// Return the index of the next dispatch to run.
    pub fn cursor(&self) -> u64 { self.configs.cursor() }

    /// Return the number of dispatches left to run.
    pub fn remaining(&self) -> u64 { self.configs.len() as u64 }

    /// Return `true` if every dispatch has run.
    pub fn is_finished(&self) -> bool { self.remaining() == 0 }

    /// Run the next dispatch, returning `false` if there was none.
    ///
    /// Dispatch failures are retried up to
    /// [`max_retries`][SimConfig::max_retries] times; the running total is only
    /// updated on success. Cancellation discards the running total.
    pub fn step(&mut self) -> Result<bool> {
        let Some(config) = self.configs.clone().next() else { return Ok(false); };
        let index = self.configs.cursor();
        let max_retries = self.controller.config.max_retries;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let res = self.job.cancel_flag().check()
                .and_then(|_| {
                    self.controller.backend.dispatch(&self.job, config, index)
                });
            match res {
                Ok(sums) => {
                    debug!(dispatch = index, keys = sums.len(), attempts, "dispatch done");
                    self.total = std::mem::take(&mut self.total).merge(sums);
                    self.configs.next();
                    self.dispatches += 1;
                    return Ok(true);
                },
                Err(err) if err.is_retryable() && attempts <= max_retries => {
                    warn!(dispatch = index, attempts, "retrying failed dispatch: {}", err);
                    self.retries += 1;
                },
                Err(PathError::DispatchFailure { msg, .. }) => {
                    return Err(PathError::DispatchFailure {
                        partition: index,
                        attempts,
                        msg,
                    });
                },
                Err(PathError::Cancelled) => {
                    info!(dispatch = index, "calculation cancelled");
                    self.total = PartialSums::new();
                    return Err(PathError::Cancelled);
                },
                Err(err) => { return Err(err); },
            }
        }
    }

    /// Run all remaining dispatches and return the normalized result.
    pub fn run(mut self) -> Result<Completion> {
        while self.step()? { }
        Ok(self.finish())
    }

    /// Stop here and return the normalized sums of the dispatches run so far.
    pub fn finish(self) -> Completion {
        let finished = self.is_finished();
        let mut sums = self.total;
        sums.scale(2.0_f32.powf(-(self.choices as f32) / 2.0));
        info!(
            dispatches = self.dispatches,
            retries = self.retries,
            keys = sums.len(),
            finished,
            "calculation done"
        );
        Completion {
            sums,
            choices: self.choices,
            dispatches: self.dispatches,
            retries: self.retries,
            gates_executed: if finished { self.job.measure().num_gates } else { 0 },
            finished,
        }
    }

    /// Pause the calculation, returning what is needed to resume it.
    pub fn into_progress(self) -> Progress {
        Progress { cursor: self.configs.cursor(), total: self.total }
    }
}
