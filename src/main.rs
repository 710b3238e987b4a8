use std::{ env, process::ExitCode, time::Instant };
use path_sim::{
    bits::{ binary_string, BitState },
    config::SimConfig,
    encode::Program,
    parse::load_circuit,
    sim::Simulator,
    PathError,
};
use rand::{ thread_rng, Rng };
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: pathsim <circuit-file> [verbose] [shots] [max-width]";

#[derive(Clone, Debug)]
struct Args {
    path: String,
    verbose: u32,
    shots: usize,
    max_width: Option<u64>,
}

fn parse_args() -> Option<Args> {
    let mut args = env::args().skip(1);
    let path = args.next()?;
    let verbose = args.next().and_then(|v| v.parse().ok()).unwrap_or(1);
    let shots = args.next().and_then(|s| s.parse().ok()).unwrap_or(1);
    let max_width = args.next().and_then(|w| w.parse().ok());
    Some(Args { path, verbose, shots, max_width })
}

fn init_logging(verbose: u32) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("path_sim={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn hex_width(bits: usize) -> usize { (bits + 3) / 4 }

fn progress_lines(k: usize, qubit: usize, outcome: bool, p: f32, value: u64, bits: usize)
    -> [String; 2]
{
    [
        format!(
            "Measurement {}: qubit {} = {} (with probability of {})",
            k, qubit, u8::from(outcome), p,
        ),
        format!("Current value: 0b{}", binary_string(value, bits, !0 << (k + 1))),
    ]
}

fn run_single(sim: &Simulator, program: &Program, verbose: u32)
    -> Result<(), PathError>
{
    let start = Instant::now();
    let mut rng = thread_rng();
    let bits = program.num_measurements();
    let mut value: u64 = 0;
    let mut probability: f32 = 1.0;
    for (k, point) in program.measurements().iter().enumerate() {
        let p1 = sim.bit_probability(program, BitState::zero(), k, value)?;
        let outcome = rng.gen::<f32>() < p1;
        let p = if outcome { p1 } else { 1.0 - p1 };
        probability *= p;
        value |= u64::from(outcome) << k;
        if verbose >= 1 {
            progress_lines(k, point.qubit, outcome, p, value, bits)
                .iter()
                .for_each(|line| println!("{}", line));
        }
    }
    if verbose >= 1 {
        println!();
        println!("Total measurement time: {:.3} seconds", start.elapsed().as_secs_f64());
        println!();
    }
    println!(
        "Measurement: 0x{:0w$x}, {}, 0b{}",
        value, value, binary_string(value, bits, 0),
        w = hex_width(bits),
    );
    println!("Probability of this value: {}", probability);
    Ok(())
}

fn run_shots(sim: &Simulator, program: &Program, shots: usize)
    -> Result<(), PathError>
{
    println!("Running {} times", shots);
    let counts = sim.sample(program, BitState::zero(), shots, &mut thread_rng())?;
    let mut counts: Vec<(u64, usize)> = counts.into_iter().collect();
    counts.sort_unstable();
    let bits = program.num_measurements();
    println!();
    println!("Final counts:");
    for (value, count) in counts {
        println!(
            "  0b{}: {} ({:.4})",
            binary_string(value, bits, 0), count, count as f64 / shots as f64,
        );
    }
    Ok(())
}

fn check_measurable(program: &Program, shots: usize) -> Result<(), PathError> {
    if shots > 0 && program.num_measurements() == 0 {
        return Err(PathError::InvalidCircuit(
            "the circuit contains no measurements".into()));
    }
    Ok(())
}

fn run(args: Args) -> Result<(), PathError> {
    let program = load_circuit(&args.path)?;
    if args.verbose >= 3 { print!("{}", program); }
    check_measurable(&program, args.shots)?;
    let mut config = SimConfig::default();
    if let Some(w) = args.max_width { config = config.with_max_width(w); }
    let sim = Simulator::new(config)?;
    match args.shots {
        0 => Ok(()),
        1 => run_single(&sim, &program, args.verbose),
        n => run_shots(&sim, &program, n),
    }
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        },
    }
}
