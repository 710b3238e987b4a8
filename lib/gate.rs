//! Logical gates and their compiled, per-path form.
//!
//! [`Gate`]s and [`Op`]s are what a circuit author writes down; a
//! [`GateInstance`] is the compact record produced for each of them by
//! [`Program::encode`][crate::encode::Program::encode] and consumed by the
//! [kernel][crate::kernel].
//!
//! All single-qubit phase-type gates are diagonal, `diag(1, φ)`, so their
//! compiled form carries only φ and acts on the ∣1⟩ branch of the target.

use std::fmt;
use num_complex::Complex32 as C32;

/// Sentinel control index meaning "no control".
pub const NO_CONTROL: u8 = u8::MAX;

/// The complex unit phase e<sup>*i*θ</sup>.
pub fn phase_angle(angle: f32) -> C32 { C32::cis(angle) }

/// The phase e<sup>*i*π / 2<sup>*k* − 1</sup></sup>, using exact values where
/// possible.
///
/// Values `k < 1` give the identity phase.
pub fn phase_fraction2(k: i32) -> C32 {
    match k {
        i32::MIN..=0 => C32::new(1.0, 0.0),
        1 => C32::new(-1.0, 0.0),
        2 => C32::new(0.0, 1.0),
        _ => {
            let frac = 2.0_f32.powi(k - 1);
            phase_angle(std::f32::consts::PI / frac)
        },
    }
}

/// Description of a single logical gate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Gate {
    /// Identity; compiles to nothing.
    I,
    /// Hadamard
    H(usize),
    /// π rotation about X
    X(usize),
    /// π rotation about Y
    Y(usize),
    /// π rotation about Z
    Z(usize),
    /// π/2 rotation about Z
    S(usize),
    /// −π/2 rotation about Z
    SInv(usize),
    /// π/4 rotation about Z
    T(usize),
    /// −π/4 rotation about Z
    TInv(usize),
    /// `diag(1, e^iθ)`
    R(usize, f32),
    /// `diag(1, e^(iπ / 2^(k − 1)))`
    Rk(usize, i32),
    /// Adjoint of `Rk`.
    RkInv(usize, i32),
    /// `diag(1, φ)` for an arbitrary φ.
    Phase(usize, C32),
    /// Z-basis measurement.
    M(usize),
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::I => write!(f, "I"),
            Self::H(k) => write!(f, "H({})", k),
            Self::X(k) => write!(f, "X({})", k),
            Self::Y(k) => write!(f, "Y({})", k),
            Self::Z(k) => write!(f, "Z({})", k),
            Self::S(k) => write!(f, "S({})", k),
            Self::SInv(k) => write!(f, "SD({})", k),
            Self::T(k) => write!(f, "T({})", k),
            Self::TInv(k) => write!(f, "TD({})", k),
            Self::R(k, a) => write!(f, "R_{}({})", a, k),
            Self::Rk(k, r) => write!(f, "RK_{}({})", r, k),
            Self::RkInv(k, r) => write!(f, "RKD_{}({})", r, k),
            Self::Phase(k, ph) => write!(f, "P[{}]({})", ph, k),
            Self::M(k) => write!(f, "M({})", k),
        }
    }
}

impl Gate {
    /// Return the target qubit, if any.
    pub fn target(&self) -> Option<usize> {
        match *self {
            Self::I => None,
            Self::H(k)
            | Self::X(k)
            | Self::Y(k)
            | Self::Z(k)
            | Self::S(k)
            | Self::SInv(k)
            | Self::T(k)
            | Self::TInv(k)
            | Self::R(k, _)
            | Self::Rk(k, _)
            | Self::RkInv(k, _)
            | Self::Phase(k, _)
            | Self::M(k)
            => Some(k),
        }
    }

    /// Return `true` if `self` is `H`.
    pub fn is_h(&self) -> bool { matches!(self, Self::H(..)) }

    /// Return `true` if `self` is `M`.
    pub fn is_m(&self) -> bool { matches!(self, Self::M(..)) }

    /// Return the `diag(1, φ)` factor of a phase-type gate.
    pub fn diagonal_phase(&self) -> Option<C32> {
        match *self {
            Self::Z(_) => Some(C32::new(-1.0, 0.0)),
            Self::S(_) => Some(C32::i()),
            Self::SInv(_) => Some(-C32::i()),
            Self::T(_) => Some(phase_fraction2(3)),
            Self::TInv(_) => Some(phase_fraction2(3).conj()),
            Self::R(_, angle) => Some(phase_angle(angle)),
            Self::Rk(_, k) => Some(phase_fraction2(k)),
            Self::RkInv(_, k) => Some(phase_fraction2(k).conj()),
            Self::Phase(_, ph) => Some(ph),
            _ => None,
        }
    }
}

/// A [`Gate`] together with up to two control qubits.
///
/// The gate acts only on basis states in which every control is ∣1⟩.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Op {
    pub gate: Gate,
    pub controls: [Option<usize>; 2],
}

impl From<Gate> for Op {
    fn from(gate: Gate) -> Self { Self { gate, controls: [None, None] } }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.controls.iter().flatten() {
            write!(f, "C{}.", c)?;
        }
        self.gate.fmt(f)
    }
}

impl Op {
    /// Singly controlled `gate`.
    pub fn controlled(control: usize, gate: Gate) -> Self {
        Self { gate, controls: [Some(control), None] }
    }

    /// Doubly controlled `gate`.
    pub fn doubly_controlled(c1: usize, c2: usize, gate: Gate) -> Self {
        Self { gate, controls: [Some(c1), Some(c2)] }
    }

    /// CNOT with control `a` and target `b`.
    pub fn cx(a: usize, b: usize) -> Self { Self::controlled(a, Gate::X(b)) }

    /// CZ on qubits `a` and `b`.
    pub fn cz(a: usize, b: usize) -> Self { Self::controlled(a, Gate::Z(b)) }

    /// Toffoli with controls `a`, `b` and target `c`.
    pub fn ccx(a: usize, b: usize, c: usize) -> Self {
        Self::doubly_controlled(a, b, Gate::X(c))
    }

    /// Iterate over the controls that are present.
    pub fn iter_controls(&self) -> impl Iterator<Item = usize> + '_ {
        self.controls.iter().flatten().copied()
    }
}

/// What a compiled gate does to the path that reaches it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GateKind {
    /// Multiply by the phase if the target is ∣1⟩.
    Phase,
    /// Multiply by the phase if the target is ∣1⟩, then flip the target.
    Toggle,
    /// Multiply by the phase unconditionally.
    Global,
    /// Branch on the `choice`-th choice bit of the path: the target takes the
    /// choice bit's value, with the phase applied if both were 1.
    Branch { choice: u8 },
    /// Copy the target into record slot `slot`.
    Measure { slot: u8 },
}

/// Compact record describing one application of a compiled gate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GateInstance {
    pub phase: C32,
    pub kind: GateKind,
    pub primary: u8,
    pub control: u8,
    pub control2: u8,
}

impl fmt::Display for GateInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            GateKind::Phase => write!(f, "phase {}", self.primary)?,
            GateKind::Toggle => write!(f, "toggle {}", self.primary)?,
            GateKind::Global => write!(f, "global")?,
            GateKind::Branch { choice }
                => write!(f, "branch {} <- c{}", self.primary, choice)?,
            GateKind::Measure { slot }
                => write!(f, "measure {} -> m{}", self.primary, slot)?,
        }
        if self.phase != C32::new(1.0, 0.0) {
            write!(f, " × ({:+.4}{:+.4}i)", self.phase.re, self.phase.im)?;
        }
        for c in [self.control, self.control2] {
            if c != NO_CONTROL { write!(f, " if {}", c)?; }
        }
        Ok(())
    }
}

impl GateInstance {
    /// Create a new, unconditional gate instance.
    pub fn new(kind: GateKind, primary: u8, phase: C32) -> Self {
        Self { phase, kind, primary, control: NO_CONTROL, control2: NO_CONTROL }
    }

    /// Return a copy with the given control indices.
    pub fn with_controls(mut self, control: u8, control2: u8) -> Self {
        self.control = control;
        self.control2 = control2;
        self
    }

    /// Return `true` if the gate depends on an external choice bit.
    pub fn use_choice(&self) -> bool {
        matches!(self.kind, GateKind::Branch { .. })
    }

    /// Return `true` if the gate flips its target.
    pub fn do_toggle(&self) -> bool { matches!(self.kind, GateKind::Toggle) }

    /// Return `true` if the gate records a measurement.
    pub fn do_measure(&self) -> bool {
        matches!(self.kind, GateKind::Measure { .. })
    }

    /// Return `true` if the gate has at least one control.
    pub fn is_controlled(&self) -> bool {
        self.control != NO_CONTROL || self.control2 != NO_CONTROL
    }

    /// Return `true` if applying the gate can never change a path.
    ///
    /// A zero phase on a `Phase` or `Global` gate means "no phase".
    pub fn is_noop(&self) -> bool {
        matches!(self.kind, GateKind::Phase | GateKind::Global)
            && (self.phase == C32::new(1.0, 0.0) || self.phase == C32::new(0.0, 0.0))
    }

    /// Extract the choice bit this gate reads from a full path index.
    pub fn choice_from(&self, path: u64) -> bool {
        match self.kind {
            GateKind::Branch { choice } => (path >> choice) & 1 == 1,
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exact_fractional_phases() {
        assert_eq!(phase_fraction2(0), C32::new(1.0, 0.0));
        assert_eq!(phase_fraction2(-4), C32::new(1.0, 0.0));
        assert_eq!(phase_fraction2(1), C32::new(-1.0, 0.0));
        assert_eq!(phase_fraction2(2), C32::new(0.0, 1.0));
        let t = phase_fraction2(3);
        let r2 = std::f32::consts::FRAC_1_SQRT_2;
        assert!((t - C32::new(r2, r2)).norm() < 1e-6);
    }

    #[test]
    fn diagonal_phases() {
        assert_eq!(Gate::Z(0).diagonal_phase(), Some(C32::new(-1.0, 0.0)));
        assert_eq!(Gate::S(0).diagonal_phase(), Some(C32::i()));
        assert!(Gate::X(0).diagonal_phase().is_none());
        assert!(Gate::H(0).diagonal_phase().is_none());
        let t = Gate::T(1).diagonal_phase().unwrap();
        let td = Gate::TInv(1).diagonal_phase().unwrap();
        assert!((t * td - C32::new(1.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn flags_follow_kind() {
        let h = GateInstance::new(
            GateKind::Branch { choice: 2 }, 0, C32::new(-1.0, 0.0));
        assert!(h.use_choice() && !h.do_toggle() && !h.do_measure());
        assert!(h.choice_from(0b100));
        assert!(!h.choice_from(0b011));

        let m = GateInstance::new(
            GateKind::Measure { slot: 0 }, 1, C32::new(1.0, 0.0));
        assert!(m.do_measure() && !m.is_noop());

        let id = GateInstance::new(GateKind::Phase, 0, C32::new(1.0, 0.0));
        assert!(id.is_noop());
        let zero = C32::new(0.0, 0.0);
        assert!(GateInstance::new(GateKind::Phase, 0, zero).is_noop());
        assert!(GateInstance::new(GateKind::Global, 0, zero).is_noop());
        assert!(!GateInstance::new(GateKind::Toggle, 0, zero).is_noop());
        assert!(!GateInstance::new(GateKind::Branch { choice: 0 }, 0, zero).is_noop());
        assert!(!id.is_controlled());
        assert!(id.with_controls(1, NO_CONTROL).is_controlled());
    }

    #[test]
    fn op_controls() {
        let op = Op::ccx(0, 1, 2);
        assert_eq!(op.iter_controls().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(op.gate.target(), Some(2));
        assert_eq!(Op::from(Gate::I).iter_controls().count(), 0);
        assert_eq!(op.to_string(), "C0.C1.X(2)");
    }
}
