//! The per-path action of a single compiled gate.
//!
//! Every function here is pure: a path's next state and amplitude factor depend
//! only on its current state, the gate, and (for choice gates) the path's own
//! choice bit. This is what allows all paths in a dispatch to be stepped in
//! lockstep without any communication between them.

use num_complex::Complex32 as C32;
use crate::{
    bits::BitState,
    gate::{ GateInstance, GateKind, NO_CONTROL },
};

const ONE: C32 = C32 { re: 1.0, im: 0.0 };
const ZERO: C32 = C32 { re: 0.0, im: 0.0 };
const SQRT_2: C32 = C32 { re: std::f32::consts::SQRT_2, im: 0.0 };

/// Return `true` if every control of `gate` is ∣1⟩ in `state`.
pub fn controls_hold(state: BitState, gate: &GateInstance) -> bool {
    [gate.control, gate.control2].into_iter()
        .all(|c| c == NO_CONTROL || state.get(c.into()))
}

/// Apply `gate` to a single path in `state`, returning the new state and the
/// factor by which the path's amplitude is multiplied.
///
/// `choice` is the path's choice bit for the gate (ignored unless the gate is a
/// choice gate) and `record_base` is the number of qubits in the register,
/// above which measurement outcomes are recorded.
///
/// A choice gate whose controls do not hold still splits the path: the branch
/// with choice bit 1 is dropped (factor 0) and the branch with choice bit 0
/// carries factor √2, so that the overall 2<sup>−*c*/2</sup> normalization of
/// the sum stays correct.
pub fn apply(state: BitState, gate: &GateInstance, choice: bool, record_base: u32)
    -> (BitState, C32)
{
    let target = u32::from(gate.primary);
    if !controls_hold(state, gate) {
        return match gate.kind {
            GateKind::Branch { .. } if choice => (state, ZERO),
            GateKind::Branch { .. } => (state, SQRT_2),
            _ => (state, ONE),
        };
    }
    let bit = state.get(target);
    match gate.kind {
        GateKind::Phase | GateKind::Global if gate.is_noop() => (state, ONE),
        GateKind::Phase => (state, if bit { gate.phase } else { ONE }),
        GateKind::Toggle
            => (state.toggled(target), if bit { gate.phase } else { ONE }),
        GateKind::Global => (state, gate.phase),
        GateKind::Branch { .. } => {
            let factor = if bit && choice { gate.phase } else { ONE };
            (state.with(target, choice), factor)
        },
        GateKind::Measure { slot }
            => (state.with(record_base + u32::from(slot), bit), ONE),
    }
}

/// A single path being walked through a program.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Lane {
    pub state: BitState,
    pub amp: C32,
}

impl Lane {
    /// Start a new path in `state` with unit amplitude.
    pub fn new(state: BitState) -> Self { Self { state, amp: ONE } }

    /// Step the path through `gate`, where `path` is the path's full index
    /// (all of its choice bits).
    pub fn step(&mut self, gate: &GateInstance, path: u64, record_base: u32) {
        let (state, factor) = apply(
            self.state, gate, gate.choice_from(path), record_base);
        self.state = state;
        self.amp *= factor;
    }

    /// Return `true` if the path's amplitude is exactly zero.
    pub fn is_dead(&self) -> bool { self.amp == ZERO }
}

/// Walk a single path through every gate in `gates`.
pub fn walk<'a, I>(initial: BitState, gates: I, path: u64, record_base: u32)
    -> Lane
where I: IntoIterator<Item = &'a GateInstance>
{
    gates.into_iter()
        .fold(Lane::new(initial), |mut lane, gate| {
            lane.step(gate, path, record_base);
            lane
        })
}
