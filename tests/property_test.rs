use std::collections::HashSet;
use num_complex::Complex32 as C32;
use proptest::prelude::*;
use path_sim::{
    bits::{ low_mask, BitState },
    filter::MeasureConfig,
    gate::{ GateInstance, GateKind, NO_CONTROL },
    kernel::apply,
    partition::ChoicePartitioner,
    reduce::{ tree_reduce, SumPair },
};

const NBITS: u8 = 6;

fn any_control() -> impl Strategy<Value = u8> {
    prop_oneof![Just(NO_CONTROL), 0..NBITS]
}

// gates that are undone by applying them again with the conjugate phase
fn self_inverse_gate() -> impl Strategy<Value = GateInstance> {
    let phase = (0.0_f32..std::f32::consts::TAU).prop_map(C32::cis);
    let kind = prop_oneof![
        phase.clone().prop_map(|ph| (GateKind::Phase, ph)),
        phase.prop_map(|ph| (GateKind::Global, ph)),
        Just((GateKind::Toggle, C32::new(1.0, 0.0))),
    ];
    (kind, 0..NBITS, any_control(), any_control())
        .prop_filter("distinct qubits", |(_, t, c1, c2)| {
            c1 != t && c2 != t && (*c1 == NO_CONTROL || c1 != c2)
        })
        .prop_map(|((kind, ph), t, c1, c2)| {
            GateInstance::new(kind, t, ph).with_controls(c1, c2)
        })
}

fn sum_pair() -> impl Strategy<Value = SumPair> {
    (-1.0_f32..1.0, -1.0_f32..1.0, -1.0_f32..1.0, -1.0_f32..1.0)
        .prop_map(|(a, b, c, d)| SumPair { val0: C32::new(a, b), val1: C32::new(c, d) })
}

proptest! {
    #[test]
    fn kernel_involution(state in 0..1_u64 << NBITS, gate in self_inverse_gate()) {
        let mut inverse = gate;
        inverse.phase = gate.phase.conj();
        let (mid, f1) = apply(BitState(state), &gate, false, NBITS as u32);
        let (end, f2) = apply(mid, &inverse, false, NBITS as u32);
        prop_assert_eq!(end, BitState(state));
        prop_assert!((f1 * f2 - C32::new(1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn partition_is_exact(choices in 0_usize..=12, width in 1_u64..5000) {
        let part = ChoicePartitioner::new(choices, width).unwrap();
        prop_assert!(part.lanes() <= width);
        let configs: Vec<_> = part.iter(0).collect();
        prop_assert_eq!(configs.len() as u64, part.len());
        let paths: Vec<u64>
            = configs.iter()
            .flat_map(|c| (0..part.lanes()).map(move |l| c.path(l)))
            .collect();
        let unique: HashSet<u64> = paths.iter().copied().collect();
        prop_assert_eq!(paths.len(), 1 << choices);
        prop_assert_eq!(unique, (0..1_u64 << choices).collect::<HashSet<u64>>());
    }

    #[test]
    fn reduction_ignores_order(
        (values, shuffled) in prop::collection::vec(sum_pair(), 0..64)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let a = tree_reduce(values);
        let b = tree_reduce(shuffled);
        prop_assert!((a.val0 - b.val0).norm() < 1e-4);
        prop_assert!((a.val1 - b.val1).norm() < 1e-4);
    }

    #[test]
    fn empty_mask_keeps_all(states in prop::collection::vec(any::<u64>(), 1..32)) {
        let cfg = MeasureConfig::keep_all(0, 0);
        prop_assert!(states.into_iter().all(|s| cfg.keep(BitState(s))));
    }

    #[test]
    fn full_mask_keeps_one(n in 1_usize..=10, pick in any::<u64>()) {
        let target = pick & low_mask(n);
        let cfg = MeasureConfig::keep_all(0, 0).matching(low_mask(n), target);
        let kept: Vec<u64>
            = (0..1_u64 << n).filter(|&s| cfg.keep(BitState(s))).collect();
        prop_assert_eq!(kept, vec![target]);
    }
}
