//! Compilation of logical circuits into flat sequences of [`GateInstance`]s.

use std::fmt;
use num_complex::Complex32 as C32;
use crate::{
    bits::{ MAX_MEASUREMENTS, MAX_QUBITS },
    error::{ PathError, Result },
    gate::{ Gate, GateInstance, GateKind, Op, NO_CONTROL },
};

/// Largest number of choice gates a program can hold.
pub const MAX_CHOICES: usize = u8::MAX as usize;

/// Location of a measurement within a compiled program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MeasurePoint {
    /// Index of the measurement's instance in [`Program::gates`].
    pub gate: usize,
    /// Measured qubit.
    pub qubit: usize,
    /// Number of choice gates that come before the measurement.
    pub choices: usize,
}

/// A compiled circuit.
///
/// All instances sourced from this type are guaranteed to have qubit indices
/// less than `num_qubits`, pairwise distinct targets and controls, finite
/// phases, and choice positions and record slots numbered consecutively from
/// zero in program order.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    num_qubits: usize,
    gates: Vec<GateInstance>,
    num_choices: usize,
    measurements: Vec<MeasurePoint>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Program (qubits={}, choices={}, measurements={}):",
            self.num_qubits, self.num_choices, self.measurements.len(),
        )?;
        for (i, gate) in self.gates.iter().enumerate() {
            writeln!(f, "  {:>4}: {}", i, gate)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a GateInstance;
    type IntoIter = <&'a Vec<GateInstance> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter { self.gates.iter() }
}

fn check_phase(gate: usize, phase: C32) -> Result<C32> {
    if phase.re.is_finite() && phase.im.is_finite() {
        Ok(phase)
    } else {
        Err(PathError::InvalidPhase { gate, re: phase.re, im: phase.im })
    }
}

fn check_qubits(index: usize, op: &Op, num_qubits: usize) -> Result<()> {
    let target = op.gate.target();
    let qubits: Vec<usize> = target.into_iter().chain(op.iter_controls()).collect();
    for (j, &q) in qubits.iter().enumerate() {
        if q >= num_qubits {
            return Err(PathError::qubit(index, q, "out of range"));
        }
        if qubits[..j].contains(&q) {
            return Err(PathError::qubit(index, q, "repeated within gate"));
        }
    }
    if target.is_none() && !qubits.is_empty() {
        return Err(PathError::qubit(index, qubits[0], "control without target"));
    }
    Ok(())
}

impl Program {
    /// Compile a series of logical operations on `num_qubits` qubits.
    ///
    /// Identity gates and phase gates whose phase is exactly 1 compile to
    /// nothing.
    pub fn encode<I>(num_qubits: usize, ops: I) -> Result<Self>
    where I: IntoIterator<Item = Op>
    {
        if num_qubits > MAX_QUBITS {
            return Err(PathError::circuit(format!(
                "the circuit uses more qubits than can be handled ({} > {})",
                num_qubits, MAX_QUBITS,
            )));
        }
        let mut program = Self {
            num_qubits,
            gates: Vec::new(),
            num_choices: 0,
            measurements: Vec::new(),
        };
        for (i, op) in ops.into_iter().enumerate() {
            check_qubits(i, &op, num_qubits)?;
            program.push_op(i, &op)?;
        }
        Ok(program)
    }

    fn push_op(&mut self, index: usize, op: &Op) -> Result<()> {
        let Some(target) = op.gate.target() else { return Ok(()); };
        let primary = target as u8;
        let mut controls = op.iter_controls().map(|c| c as u8);
        let control = controls.next().unwrap_or(NO_CONTROL);
        let control2 = controls.next().unwrap_or(NO_CONTROL);
        let one = C32::new(1.0, 0.0);
        let emitted: Vec<(GateKind, C32)> = match op.gate {
            Gate::I => Vec::new(),
            Gate::H(_) => {
                if self.num_choices >= MAX_CHOICES {
                    return Err(PathError::circuit(format!(
                        "too many choice gates (max {})", MAX_CHOICES)));
                }
                let choice = self.num_choices as u8;
                self.num_choices += 1;
                vec![(GateKind::Branch { choice }, C32::new(-1.0, 0.0))]
            },
            Gate::X(_) => vec![(GateKind::Toggle, one)],
            // Y = i X Z; the i is only unobservable without controls
            Gate::Y(_) => vec![
                (GateKind::Toggle, C32::new(-1.0, 0.0)),
                (GateKind::Global, C32::i()),
            ],
            Gate::M(_) => {
                if op.iter_controls().next().is_some() {
                    return Err(PathError::circuit(format!(
                        "gate {}: measurements cannot be controlled", index)));
                }
                if self.measurements.len() >= MAX_MEASUREMENTS {
                    return Err(PathError::circuit(format!(
                        "the circuit contains more measurements than can be \
                        handled (max {})",
                        MAX_MEASUREMENTS,
                    )));
                }
                let slot = self.measurements.len() as u8;
                self.measurements.push(MeasurePoint {
                    gate: self.gates.len(),
                    qubit: target,
                    choices: self.num_choices,
                });
                vec![(GateKind::Measure { slot }, one)]
            },
            gate => gate.diagonal_phase()
                .map(|phase| check_phase(index, phase))
                .transpose()?
                .map(|phase| (GateKind::Phase, phase))
                .into_iter()
                .collect(),
        };
        let instances = emitted.into_iter()
            .map(|(kind, phase)| {
                GateInstance::new(kind, primary, phase)
                    .with_controls(control, control2)
            })
            .filter(|inst| !inst.is_noop());
        self.gates.extend(instances);
        Ok(())
    }

    /// Rebuild a program from already-compiled instances, checking every
    /// guarantee [`Self::encode`] makes.
    pub fn from_instances<I>(num_qubits: usize, gates: I) -> Result<Self>
    where I: IntoIterator<Item = GateInstance>
    {
        if num_qubits > MAX_QUBITS {
            return Err(PathError::circuit(format!(
                "the circuit uses more qubits than can be handled ({} > {})",
                num_qubits, MAX_QUBITS,
            )));
        }
        let mut program = Self {
            num_qubits,
            gates: Vec::new(),
            num_choices: 0,
            measurements: Vec::new(),
        };
        for (i, inst) in gates.into_iter().enumerate() {
            let n = num_qubits as u8;
            if inst.primary >= n {
                return Err(PathError::qubit(i, inst.primary.into(), "out of range"));
            }
            for c in [inst.control, inst.control2] {
                if c != NO_CONTROL && c >= n {
                    return Err(PathError::qubit(i, c.into(), "out of range"));
                }
                if c != NO_CONTROL && c == inst.primary {
                    return Err(PathError::qubit(i, c.into(), "repeated within gate"));
                }
            }
            if inst.control != NO_CONTROL && inst.control == inst.control2 {
                return Err(
                    PathError::qubit(i, inst.control.into(), "repeated within gate"));
            }
            check_phase(i, inst.phase)?;
            match inst.kind {
                GateKind::Branch { choice } => {
                    if usize::from(choice) != program.num_choices {
                        return Err(PathError::circuit(format!(
                            "gate {}: choice position {} out of order", i, choice)));
                    }
                    program.num_choices += 1;
                },
                GateKind::Measure { slot } => {
                    if usize::from(slot) != program.measurements.len()
                        || program.measurements.len() >= MAX_MEASUREMENTS
                    {
                        return Err(PathError::circuit(format!(
                            "gate {}: record slot {} out of order", i, slot)));
                    }
                    if inst.is_controlled() {
                        return Err(PathError::circuit(format!(
                            "gate {}: measurements cannot be controlled", i)));
                    }
                    program.measurements.push(MeasurePoint {
                        gate: program.gates.len(),
                        qubit: inst.primary.into(),
                        choices: program.num_choices,
                    });
                },
                _ => { },
            }
            if inst.is_noop() { continue; }
            program.gates.push(inst);
        }
        Ok(program)
    }

    /// Return the number of qubits.
    pub fn num_qubits(&self) -> usize { self.num_qubits }

    /// Return the compiled instances in program order.
    pub fn gates(&self) -> &[GateInstance] { &self.gates }

    /// Return the number of compiled instances.
    pub fn len(&self) -> usize { self.gates.len() }

    /// Return `true` if the program contains no instances.
    pub fn is_empty(&self) -> bool { self.gates.is_empty() }

    /// Return the total number of choice gates.
    pub fn num_choices(&self) -> usize { self.num_choices }

    /// Return the measurements in program order.
    pub fn measurements(&self) -> &[MeasurePoint] { &self.measurements }

    /// Return the number of measurements.
    pub fn num_measurements(&self) -> usize { self.measurements.len() }

    /// Return the number of meaningful bits in a path's final
    /// [`BitState`][crate::bits::BitState] (register plus record).
    pub fn word_bits(&self) -> usize {
        self.num_qubits + self.measurements.len()
    }

    /// Return the [`BitState`][crate::bits::BitState] bit holding the outcome
    /// of measurement `slot`.
    pub fn record_bit(&self, slot: usize) -> u32 {
        (self.num_qubits + slot) as u32
    }

    /// Return the number of choice gates among the first `num_gates`
    /// instances.
    pub fn choices_before(&self, num_gates: usize) -> usize {
        self.gates.iter()
            .take(num_gates)
            .filter(|g| g.use_choice())
            .count()
    }

    /// Return the length of the longest prefix of the first `num_gates`
    /// instances whose choice gates all read from the lowest
    /// `enumerated_bits` positions of a path.
    ///
    /// Such a prefix acts identically in every dispatch, since dispatches
    /// differ only in the positions above `enumerated_bits`.
    pub fn common_prefix(&self, enumerated_bits: u32, num_gates: usize)
        -> usize
    {
        let num_gates = num_gates.min(self.gates.len());
        self.gates.iter()
            .take(num_gates)
            .position(|g| {
                matches!(
                    g.kind,
                    GateKind::Branch { choice } if u32::from(choice) >= enumerated_bits
                )
            })
            .unwrap_or(num_gates)
    }
}
