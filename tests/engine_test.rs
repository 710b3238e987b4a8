use std::sync::atomic::{ AtomicU32, Ordering };
use approx::assert_abs_diff_eq;
use nalgebra as na;
use num_complex::Complex32 as C32;
use rand::{ rngs::StdRng, Rng, SeedableRng };
use path_sim::{
    backend::{ Backend, CpuBackend, Job },
    bits::BitState,
    config::SimConfig,
    controller::{ Controller, Query },
    encode::Program,
    gate::{ Gate, Op },
    parse::load_circuit,
    partition::ChoiceConfig,
    reduce::PartialSums,
    sim::Simulator,
    PathError,
    Result,
};

const ZERO: C32 = C32 { re: 0.0, im: 0.0 };

/* dense reference ************************************************************/

// apply `op` directly to a state vector
fn apply_dense(psi: &na::DVector<C32>, op: &Op) -> na::DVector<C32> {
    let Some(t) = op.gate.target() else { return psi.clone(); };
    let ort2 = std::f32::consts::FRAC_1_SQRT_2;
    let mut out = na::DVector::from_element(psi.len(), ZERO);
    for (j, a) in psi.iter().copied().enumerate() {
        if op.iter_controls().any(|c| (j >> c) & 1 == 0) {
            out[j] += a;
            continue;
        }
        let bit = (j >> t) & 1 == 1;
        let flip = j ^ (1 << t);
        match op.gate {
            Gate::H(_) => {
                let j0 = j & !(1 << t);
                let j1 = j | (1 << t);
                out[j0] += a * ort2;
                out[j1] += if bit { -a * ort2 } else { a * ort2 };
            },
            Gate::X(_) => { out[flip] += a; },
            Gate::Y(_) => {
                out[flip] += if bit { a * -C32::i() } else { a * C32::i() };
            },
            gate => {
                let ph = gate.diagonal_phase().unwrap_or(C32::new(1.0, 0.0));
                out[j] += if bit { a * ph } else { a };
            },
        }
    }
    out
}

fn dense(n: usize, ops: &[Op], initial: usize) -> na::DVector<C32> {
    let mut psi = na::DVector::from_element(1 << n, ZERO);
    psi[initial] = C32::new(1.0, 0.0);
    ops.iter().fold(psi, |acc, op| apply_dense(&acc, op))
}

fn random_op<R>(n: usize, rng: &mut R) -> Op
where R: Rng + ?Sized
{
    let q = rng.gen_range(0..n);
    let single = match rng.gen_range(0..9) {
        0 | 1 => Gate::H(q),
        2 => Gate::X(q),
        3 => Gate::Y(q),
        4 => Gate::Z(q),
        5 => Gate::S(q),
        6 => Gate::TInv(q),
        7 => Gate::R(q, rng.gen_range(-3.0..3.0)),
        _ => Gate::Rk(q, rng.gen_range(0..5)),
    };
    let others: Vec<usize> = (0..n).filter(|k| *k != q).collect();
    match (rng.gen_range(0..3), others.len()) {
        (1, m) if m >= 1 => Op::controlled(others[rng.gen_range(0..m)], single),
        (2, m) if m >= 2 => {
            let a = rng.gen_range(0..m);
            let b = (a + 1 + rng.gen_range(0..m - 1)) % m;
            Op::doubly_controlled(others[a], others[b], single)
        },
        _ => Op::from(single),
    }
}

fn assert_close(a: &na::DVector<C32>, b: &na::DVector<C32>, eps: f32) {
    assert_eq!(a.len(), b.len());
    for (k, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!((x - y).norm() < eps, "mismatch at {:b}: {} vs {}", k, x, y);
    }
}

#[test]
fn agrees_with_dense_reference() {
    let mut rng = StdRng::seed_from_u64(10546);
    for width in [1 << 20, 4, 1] {
        let sim = Simulator::new(SimConfig::default().with_max_width(width).with_block_size(3))
            .unwrap();
        for _ in 0..25 {
            let n = rng.gen_range(1..=4);
            let depth = rng.gen_range(0..14);
            let ops: Vec<Op> = (0..depth).map(|_| random_op(n, &mut rng)).collect();
            let initial = rng.gen_range(0..1 << n);
            let program = Program::encode(n, ops.clone()).unwrap();
            let psi = sim.amplitudes(&program, BitState(initial as u64)).unwrap();
            assert_close(&psi, &dense(n, &ops, initial), 1e-4);
        }
    }
}

#[test]
fn split_dispatches_match_single() {
    let ops = vec![
        Op::from(Gate::H(0)),
        Op::from(Gate::H(1)),
        Op::cx(1, 3),
        Op::from(Gate::T(3)),
        Op::from(Gate::H(2)),
        Op::ccx(0, 2, 3),
        Op::controlled(3, Gate::S(1)),
    ];
    let program = Program::encode(4, ops).unwrap();
    let query = Query::full(&program);

    let narrow = Controller::new(SimConfig::default().with_max_width(4)).unwrap();
    let calc = narrow.start(&program, query).unwrap();
    assert_eq!(calc.partitioner().len(), 2);
    assert_eq!(calc.remaining(), 2);
    let split = calc.run().unwrap();
    assert_eq!(split.dispatches, 2);

    let wide = Controller::new(SimConfig::default().with_max_width(16)).unwrap();
    let single = wide.run(&program, query).unwrap();
    assert_eq!(single.dispatches, 1);

    let a = split.sums.states(0);
    let b = single.sums.states(0);
    assert_eq!(a.len(), b.len());
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        assert_eq!(ka, kb);
        assert_abs_diff_eq!((va - vb).norm(), 0.0, epsilon = 1e-5);
    }
}

#[test]
fn cnot_truth_table_end_to_end() {
    let program = Program::encode(2, vec![Op::cx(0, 1)]).unwrap();
    let sim = Simulator::new(SimConfig::default()).unwrap();
    for (input, output) in [(0b00, 0b00), (0b10, 0b10), (0b01, 0b11), (0b11, 0b01)] {
        let probs = sim.probabilities(&program, BitState(input)).unwrap();
        assert_abs_diff_eq!(probs[output as usize], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(probs.sum(), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn not_end_to_end() {
    let program = Program::encode(1, vec![Op::from(Gate::X(0))]).unwrap();
    let sim = Simulator::new(SimConfig::default()).unwrap();
    let probs = sim.probabilities(&program, BitState::zero()).unwrap();
    assert_abs_diff_eq!(probs[0], 0.0);
    assert_abs_diff_eq!(probs[1], 1.0);
}

/* failure handling ***********************************************************/

// fails dispatch `target` a fixed number of times before succeeding
struct FlakyBackend {
    target: u64,
    failures: AtomicU32,
}

impl FlakyBackend {
    fn new(target: u64, failures: u32) -> Self {
        Self { target, failures: AtomicU32::new(failures) }
    }
}

impl Backend for FlakyBackend {
    fn dispatch(&self, job: &Job<'_>, config: ChoiceConfig, index: u64)
        -> Result<PartialSums>
    {
        if index == self.target
            && self.failures.fetch_update(
                Ordering::SeqCst, Ordering::SeqCst, |k| k.checked_sub(1)).is_ok()
        {
            return Err(PathError::DispatchFailure {
                partition: index,
                attempts: 1,
                msg: "device lost".into(),
            });
        }
        CpuBackend.dispatch(job, config, index)
    }
}

fn three_hadamards() -> Program {
    let ops = vec![
        Op::from(Gate::H(0)),
        Op::from(Gate::H(1)),
        Op::from(Gate::H(2)),
        Op::cz(0, 2),
    ];
    Program::encode(3, ops).unwrap()
}

#[test]
fn retries_failed_dispatch() {
    let program = three_hadamards();
    let config = SimConfig::default().with_max_width(2).with_max_retries(2);
    let reference = Controller::new(config).unwrap()
        .run(&program, Query::full(&program)).unwrap();

    let flaky = Controller::with_backend(config, FlakyBackend::new(1, 2)).unwrap();
    let done = flaky.run(&program, Query::full(&program)).unwrap();
    assert_eq!(done.retries, 2);
    assert_eq!(done.dispatches, 4);
    assert_eq!(done.sums, reference.sums);
}

#[test]
fn gives_up_after_max_retries() {
    let program = three_hadamards();
    let config = SimConfig::default().with_max_width(2).with_max_retries(1);
    let flaky = Controller::with_backend(config, FlakyBackend::new(1, 5)).unwrap();
    let mut calc = flaky.start(&program, Query::full(&program)).unwrap();
    assert!(calc.step().unwrap());
    let after_first = calc.into_progress();

    let mut calc = flaky.resume(&program, Query::full(&program), after_first.clone())
        .unwrap();
    match calc.step() {
        Err(PathError::DispatchFailure { partition, attempts, .. }) => {
            assert_eq!(partition, 1);
            assert_eq!(attempts, 2);
        },
        other => panic!("expected dispatch failure, got {:?}", other),
    }
    let progress = calc.into_progress();
    assert_eq!(progress.cursor, 1);
    assert_eq!(progress.total, after_first.total);
}

#[test]
fn resumed_run_matches_uninterrupted() {
    let program = three_hadamards();
    let ctrl = Controller::new(SimConfig::default().with_max_width(1)).unwrap();
    let query = Query::full(&program).split_on(2);
    let whole = ctrl.run(&program, query).unwrap();

    let mut calc = ctrl.start(&program, query).unwrap();
    for _ in 0..3 { assert!(calc.step().unwrap()); }
    let progress = calc.into_progress();
    let rest = ctrl.resume(&program, query, progress).unwrap().run().unwrap();
    assert!(rest.finished);
    assert_eq!(rest.dispatches, 5);
    assert_eq!(rest.sums, whole.sums);
    assert!(ctrl.resume(&program, query, path_sim::controller::Progress {
        cursor: 9,
        total: PartialSums::new(),
    }).is_err());
}

#[test]
fn cancellation_spares_later_queries() {
    let program = three_hadamards();
    let sim = Simulator::new(SimConfig::default()).unwrap();
    let ctrl = sim.controller();
    let before = sim.amplitudes(&program, BitState::zero()).unwrap();

    let mut calc = ctrl.start(&program, Query::full(&program)).unwrap();
    ctrl.cancel_flag().cancel();
    assert!(matches!(calc.step(), Err(PathError::Cancelled)));
    drop(calc);

    let after = sim.amplitudes(&program, BitState::zero()).unwrap();
    assert_eq!(before, after);
    assert!(ctrl.run(&program, Query::full(&program)).unwrap().finished);
}

/* measurement ****************************************************************/

#[test]
fn teleportation_like_correlations() {
    let text = "\
        # entangle, measure, and correct\n\
        H(0)\n\
        CX(0, 1)\n\
        M(0)\n\
        CX(0, 2)\n\
        M(1)\n\
        M(2)\n";
    let path = std::env::temp_dir().join("path_sim_engine_test.qc");
    std::fs::write(&path, text).unwrap();
    let program = load_circuit(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(program.num_qubits(), 3);
    assert_eq!(program.num_measurements(), 3);

    let sim = Simulator::new(SimConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(10546);
    let counts = sim.sample(&program, BitState::zero(), 400, &mut rng).unwrap();
    assert!(counts.keys().all(|v| *v == 0b000 || *v == 0b111));
    let ones = counts.get(&0b111).copied().unwrap_or(0);
    assert!(ones > 120 && ones < 280, "ones = {}", ones);

    let m = sim.measure(&program, BitState::zero(), &mut rng).unwrap();
    assert_abs_diff_eq!(m.probability, 0.5, epsilon = 1e-5);
}

#[test]
fn measurement_probabilities_follow_amplitudes() {
    // R_y-like preparation: H, phase, H gives cos/sin amplitudes
    let theta = 1.1_f32;
    let ops = vec![
        Op::from(Gate::H(0)),
        Op::from(Gate::R(0, theta)),
        Op::from(Gate::H(0)),
        Op::from(Gate::M(0)),
    ];
    let program = Program::encode(1, ops).unwrap();
    let sim = Simulator::new(SimConfig::default()).unwrap();
    let p1 = sim.bit_probability(&program, BitState::zero(), 0, 0).unwrap();
    assert_abs_diff_eq!(p1, (theta / 2.0).sin().powi(2), epsilon = 1e-5);
    let z = sim.expectation_z(&program, BitState::zero(), 0).unwrap();
    assert_abs_diff_eq!(z, theta.cos(), epsilon = 1e-5);
}
