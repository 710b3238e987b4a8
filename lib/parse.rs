//! Plain-text circuit descriptions.
//!
//! Circuits are written one gate per line as `NAME[_param...](q, ...)`, e.g.
//! ```text
//! # GHZ state
//! H(0)
//! CX(0, 1)
//! CCX(0, 1, 2)
//! RK_3(2)
//! M(0)
//! ```
//! Names are case-insensitive. A `C` or `CC` prefix on any gate name adds one
//! or two controls, taken from the leading qubit arguments. Lines starting with
//! `#` and lines without a parenthesized argument list are ignored; unknown
//! gate names are skipped with a warning.

use std::{ fs, path::Path };
use tracing::{ info, warn };
use crate::{
    encode::Program,
    error::{ ParseFault, PathError, Result },
    gate::{ Gate, Op },
};

type LineResult<T> = std::result::Result<T, ParseFault>;

fn fault(line: usize, fault: ParseFault) -> PathError {
    PathError::Parse { line, fault }
}

// build the uncontrolled gate named `name`, or `None` if the name is unknown
fn base_gate(name: &str, params: &[f32], args: &[usize])
    -> Option<LineResult<Gate>>
{
    let nparams = match name {
        "R" | "RK" | "RKD" => 1,
        "I" => return Some(Ok(Gate::I)),
        "M" | "H" | "X" | "Y" | "Z" | "S" | "SD" | "T" | "TD" => 0,
        _ => return None,
    };
    if params.len() != nparams {
        return Some(Err(ParseFault::InvalidGateParamCount));
    }
    if args.len() != 1 {
        return Some(Err(ParseFault::InvalidGateArgCount));
    }
    let k = args[0];
    let gate = match name {
        "M" => Gate::M(k),
        "H" => Gate::H(k),
        "X" => Gate::X(k),
        "Y" => Gate::Y(k),
        "Z" => Gate::Z(k),
        "S" => Gate::S(k),
        "SD" => Gate::SInv(k),
        "T" => Gate::T(k),
        "TD" => Gate::TInv(k),
        "R" => Gate::R(k, params[0]),
        "RK" => Gate::Rk(k, params[0] as i32),
        "RKD" => Gate::RkInv(k, params[0] as i32),
        _ => return None,
    };
    Some(Ok(gate))
}

// resolve `name` with up to two leading `C`s, in order of preference
fn resolve(name: &str, params: &[f32], args: &[usize])
    -> Option<LineResult<Op>>
{
    if let Some(res) = base_gate(name, params, args) {
        return Some(res.map(Op::from));
    }
    for ncontrols in [2, 1] {
        let prefix = &"CC"[..ncontrols];
        let Some(sub) = name.strip_prefix(prefix) else { continue; };
        if sub.is_empty() { continue; }
        if args.len() < ncontrols {
            if base_gate(sub, params, &[0]).is_some() {
                return Some(Err(ParseFault::InvalidGateArgCount));
            }
            continue;
        }
        let Some(res) = base_gate(sub, params, &args[ncontrols..]) else {
            continue;
        };
        return Some(res.map(|gate| {
            let mut op = Op::from(gate);
            op.controls[0] = Some(args[0]);
            if ncontrols == 2 { op.controls[1] = Some(args[1]); }
            op
        }));
    }
    None
}

fn parse_line(line: &str) -> LineResult<Option<Op>> {
    let line = line.trim();
    if line.starts_with('#') { return Ok(None); }
    let Some((head, rest)) = line.split_once('(') else { return Ok(None); };
    let Some((args_str, _)) = rest.split_once(')') else { return Ok(None); };
    let args: Vec<usize>
        = if args_str.trim().is_empty() {
            Vec::new()
        } else {
            args_str.split(',')
                .map(|a| a.trim().parse::<usize>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| ParseFault::InvalidSyntaxArg)?
        };
    let mut name_params = head.trim().split('_');
    let name = name_params.next().unwrap_or("").to_uppercase();
    let params: Vec<f32>
        = name_params
        .map(|p| p.parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| ParseFault::InvalidSyntaxParam)?;
    match resolve(&name, &params, &args) {
        Some(res) => res.map(Some),
        None => {
            warn!("unknown gate {:?}", name);
            Ok(None)
        },
    }
}

/// Parse circuit text into a list of operations.
pub fn parse_circuit(text: &str) -> Result<Vec<Op>> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            parse_line(line).map_err(|f| fault(i + 1, f)).transpose()
        })
        .collect()
}

/// Return the number of qubits needed to hold every index in `ops`,
/// saturating at `usize::MAX`.
pub fn qubit_count(ops: &[Op]) -> usize {
    ops.iter()
        .flat_map(|op| op.gate.target().into_iter().chain(op.iter_controls()))
        .max()
        .map(|k| k.saturating_add(1))
        .unwrap_or(0)
}

/// Parse and compile circuit text, sizing the register to fit.
pub fn parse_program(text: &str) -> Result<Program> {
    let ops = parse_circuit(text)?;
    Program::encode(qubit_count(&ops), ops)
}

/// Read, parse, and compile a circuit file.
pub fn load_circuit<P>(path: P) -> Result<Program>
where P: AsRef<Path>
{
    let text = fs::read_to_string(path.as_ref())?;
    let program = parse_program(&text)?;
    info!(
        path = %path.as_ref().display(),
        qubits = program.num_qubits(),
        choices = program.num_choices(),
        measurements = program.num_measurements(),
        "loaded circuit"
    );
    Ok(program)
}
