//! Byte-exact layouts for exchanging programs and results with an external
//! execution device.
//!
//! Each `Raw*` type is `#[repr(C)]` and [`Pod`], so slices of them can be
//! copied directly to and from device buffers. Conversions into the typed
//! forms used everywhere else in the crate validate every field.

use bytemuck::{ Pod, Zeroable };
use num_complex::Complex32 as C32;
use crate::{
    error::{ PathError, Result },
    filter::MeasureConfig,
    gate::{ GateInstance, GateKind },
    partition::ChoiceConfig,
    reduce::SumPair,
};

/// Flag bit: the gate reads a choice bit.
pub const USE_CHOICE: u8 = 1 << 0;
/// Flag bit: the gate flips its target.
pub const DO_TOGGLE: u8 = 1 << 1;
/// Flag bit: the gate records a measurement.
pub const DO_MEASURE: u8 = 1 << 2;

const KIND_PHASE: u8 = 0;
const KIND_TOGGLE: u8 = 1;
const KIND_GLOBAL: u8 = 2;
const KIND_BRANCH: u8 = 3;
const KIND_MEASURE: u8 = 4;

/// Device form of a [`GateInstance`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RawGateInstance {
    pub phase: [f32; 2],
    pub kind: u8,
    pub primary_bit: u8,
    pub control_bit: u8,
    pub control2_bit: u8,
    /// Choice position for choice gates, record slot for measurements.
    pub slot: u8,
    pub flags: u8,
    pub reserved: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<RawGateInstance>() == 16);

impl From<GateInstance> for RawGateInstance {
    fn from(gate: GateInstance) -> Self {
        let (kind, slot, flags) = match gate.kind {
            GateKind::Phase => (KIND_PHASE, 0, 0),
            GateKind::Toggle => (KIND_TOGGLE, 0, DO_TOGGLE),
            GateKind::Global => (KIND_GLOBAL, 0, 0),
            GateKind::Branch { choice } => (KIND_BRANCH, choice, USE_CHOICE),
            GateKind::Measure { slot } => (KIND_MEASURE, slot, DO_MEASURE),
        };
        Self {
            phase: [gate.phase.re, gate.phase.im],
            kind,
            primary_bit: gate.primary,
            control_bit: gate.control,
            control2_bit: gate.control2,
            slot,
            flags,
            reserved: [0; 2],
        }
    }
}

impl TryFrom<RawGateInstance> for GateInstance {
    type Error = PathError;

    fn try_from(raw: RawGateInstance) -> Result<Self> {
        if raw.flags & DO_TOGGLE != 0 && raw.flags & DO_MEASURE != 0 {
            return Err(PathError::wire(
                "a gate cannot both toggle and measure its target"));
        }
        let (kind, flags) = match raw.kind {
            KIND_PHASE => (GateKind::Phase, 0),
            KIND_TOGGLE => (GateKind::Toggle, DO_TOGGLE),
            KIND_GLOBAL => (GateKind::Global, 0),
            KIND_BRANCH => (GateKind::Branch { choice: raw.slot }, USE_CHOICE),
            KIND_MEASURE => (GateKind::Measure { slot: raw.slot }, DO_MEASURE),
            k => { return Err(PathError::wire(format!("unknown gate kind {}", k))); },
        };
        if raw.flags != flags {
            return Err(PathError::wire(format!(
                "flags {:#05b} do not match gate kind {}", raw.flags, raw.kind)));
        }
        Ok(
            GateInstance::new(kind, raw.primary_bit, C32::new(raw.phase[0], raw.phase[1]))
                .with_controls(raw.control_bit, raw.control2_bit)
        )
    }
}

/// Pack gates into a device buffer.
pub fn gates_to_bytes(gates: &[GateInstance]) -> Vec<u8> {
    let raw: Vec<RawGateInstance>
        = gates.iter().copied().map(RawGateInstance::from).collect();
    bytemuck::cast_slice(&raw).to_vec()
}

/// Unpack gates from a device buffer.
pub fn gates_from_bytes(bytes: &[u8]) -> Result<Vec<GateInstance>> {
    let size = std::mem::size_of::<RawGateInstance>();
    if bytes.len() % size != 0 {
        return Err(PathError::wire(format!(
            "buffer length {} is not a multiple of {}", bytes.len(), size)));
    }
    bytes.chunks_exact(size)
        .map(|chunk| {
            GateInstance::try_from(
                bytemuck::pod_read_unaligned::<RawGateInstance>(chunk))
        })
        .collect()
}

/// Device form of a [`ChoiceConfig`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct RawDispatchConfig {
    pub num_gates: i32,
    pub rest_of_choices: u32,
}

const _: () = assert!(std::mem::size_of::<RawDispatchConfig>() == 8);

fn to_i32(what: &str, val: usize) -> Result<i32> {
    i32::try_from(val)
        .map_err(|_| PathError::wire(format!("{} {} does not fit in 32 bits", what, val)))
}

fn to_usize(what: &str, val: i32) -> Result<usize> {
    usize::try_from(val)
        .map_err(|_| PathError::wire(format!("negative {} {}", what, val)))
}

impl TryFrom<ChoiceConfig> for RawDispatchConfig {
    type Error = PathError;

    fn try_from(config: ChoiceConfig) -> Result<Self> {
        Ok(Self {
            num_gates: to_i32("gate count", config.num_gates)?,
            rest_of_choices: config.rest_of_choices,
        })
    }
}

impl TryFrom<RawDispatchConfig> for ChoiceConfig {
    type Error = PathError;

    fn try_from(raw: RawDispatchConfig) -> Result<Self> {
        Ok(Self {
            num_gates: to_usize("gate count", raw.num_gates)?,
            rest_of_choices: raw.rest_of_choices,
        })
    }
}

/// Device form of a [`MeasureConfig`].
///
/// Masks are limited to 32 bits and the split bit is not carried.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct RawMeasureConfig {
    pub num_gates: i32,
    pub num_gates_common: i32,
    pub match_mask: u32,
    pub match_measure: u32,
    pub rest_of_choices_length: i32,
    /// Number of gates executed once the calculation has finished, or 0.
    pub did_calculation_finish: i32,
}

const _: () = assert!(std::mem::size_of::<RawMeasureConfig>() == 24);

impl RawMeasureConfig {
    /// Pack `config`, marking `gates_executed` gates as done.
    pub fn encode(config: &MeasureConfig, gates_executed: usize) -> Result<Self> {
        let to_u32 = |what: &str, val: u64| {
            u32::try_from(val).map_err(|_| {
                PathError::wire(format!("{} {:#x} does not fit in 32 bits", what, val))
            })
        };
        Ok(Self {
            num_gates: to_i32("gate count", config.num_gates)?,
            num_gates_common: to_i32("common gate count", config.num_gates_common)?,
            match_mask: to_u32("match mask", config.match_mask)?,
            match_measure: to_u32("match pattern", config.match_measure)?,
            rest_of_choices_length: to_i32(
                "fixed choice count", config.rest_of_choices_length as usize)?,
            did_calculation_finish: to_i32("executed gate count", gates_executed)?,
        })
    }

    /// Unpack into a [`MeasureConfig`] splitting on `split_bit`.
    pub fn decode(&self, split_bit: u32) -> Result<MeasureConfig> {
        let num_gates = to_usize("gate count", self.num_gates)?;
        let num_gates_common = to_usize("common gate count", self.num_gates_common)?;
        if num_gates_common > num_gates {
            return Err(PathError::wire(format!(
                "common gate count {} exceeds gate count {}",
                num_gates_common, num_gates,
            )));
        }
        Ok(MeasureConfig {
            num_gates,
            num_gates_common,
            match_mask: self.match_mask.into(),
            match_measure: u64::from(self.match_measure & self.match_mask),
            split_bit,
            rest_of_choices_length:
                to_usize("fixed choice count", self.rest_of_choices_length)? as u32,
        })
    }

    /// Return `true` if the device reports the calculation as finished.
    pub fn is_finished(&self) -> bool { self.did_calculation_finish > 0 }
}

/// Device form of a [`SumPair`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RawSumPair {
    pub val01: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<RawSumPair>() == 16);

impl From<SumPair> for RawSumPair {
    fn from(pair: SumPair) -> Self {
        Self { val01: [pair.val0.re, pair.val0.im, pair.val1.re, pair.val1.im] }
    }
}

impl From<RawSumPair> for SumPair {
    fn from(raw: RawSumPair) -> Self {
        let [a, b, c, d] = raw.val01;
        Self { val0: C32::new(a, b), val1: C32::new(c, d) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        bits::BitState,
        config::SimConfig,
        encode::Program,
        gate::{ Gate, Op },
        sim::Simulator,
    };

    #[test]
    fn program_through_buffer() {
        let ops = vec![
            Op::from(Gate::H(0)),
            Op::ccx(0, 1, 2),
            Op::from(Gate::T(2)),
            Op::controlled(2, Gate::Y(0)),
            Op::from(Gate::M(2)),
        ];
        let program = Program::encode(3, ops).unwrap();
        let bytes = gates_to_bytes(program.gates());
        assert_eq!(bytes.len(), 16 * program.len());
        let gates = gates_from_bytes(&bytes).unwrap();
        let rebuilt = Program::from_instances(3, gates).unwrap();
        assert_eq!(rebuilt, program);
        assert!(gates_from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn zero_phase_from_device_is_identity() {
        let gates = [
            GateInstance::new(GateKind::Toggle, 0, C32::new(1.0, 0.0)),
            GateInstance::new(GateKind::Phase, 0, C32::new(0.0, 0.0)),
        ];
        let decoded = gates_from_bytes(&gates_to_bytes(&gates)).unwrap();
        let program = Program::from_instances(1, decoded).unwrap();
        assert_eq!(program.len(), 1);
        let sim = Simulator::new(SimConfig::default()).unwrap();
        let probs = sim.probabilities(&program, BitState::zero()).unwrap();
        assert_eq!(probs.as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn rejects_bad_flags() {
        let h = GateInstance::new(GateKind::Branch { choice: 3 }, 1, C32::new(-1.0, 0.0));
        let mut raw = RawGateInstance::from(h);
        assert_eq!(raw.flags, USE_CHOICE);
        assert_eq!(raw.slot, 3);

        raw.flags = DO_TOGGLE | DO_MEASURE;
        assert!(matches!(GateInstance::try_from(raw), Err(PathError::InvalidWire(_))));
        raw.flags = DO_TOGGLE;
        assert!(GateInstance::try_from(raw).is_err());
        raw.flags = USE_CHOICE;
        raw.kind = 9;
        assert!(GateInstance::try_from(raw).is_err());
    }

    #[test]
    fn measure_config_limits() {
        let cfg = MeasureConfig::keep_all(12, 3).matching(0b1100, 0b0100);
        let raw = RawMeasureConfig::encode(&cfg, 12).unwrap();
        assert!(raw.is_finished());
        assert_eq!(raw.decode(3).unwrap(), cfg);

        let wide = MeasureConfig::keep_all(12, 3).matching(1 << 40, 1 << 40);
        assert!(RawMeasureConfig::encode(&wide, 0).is_err());

        let mut raw = RawMeasureConfig::encode(&cfg, 0).unwrap();
        assert!(!raw.is_finished());
        raw.num_gates_common = 13;
        assert!(raw.decode(0).is_err());
    }

    #[test]
    fn dispatch_and_sums() {
        let config = ChoiceConfig { num_gates: 7, rest_of_choices: 0x40 };
        let raw = RawDispatchConfig::try_from(config).unwrap();
        assert_eq!(ChoiceConfig::try_from(raw).unwrap(), config);
        let neg = RawDispatchConfig { num_gates: -1, rest_of_choices: 0 };
        assert!(ChoiceConfig::try_from(neg).is_err());

        let pair = SumPair { val0: C32::new(0.5, -0.25), val1: C32::new(0.0, 1.0) };
        let raw = RawSumPair::from(pair);
        assert_eq!(raw.val01, [0.5, -0.25, 0.0, 1.0]);
        assert_eq!(SumPair::from(raw), pair);
    }
}
