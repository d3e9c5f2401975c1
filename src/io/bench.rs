//! Reader for `.bench` files, as used by the ISCAS89 benchmarks.
//!
//! These files describe a design with simple statements:
//! ```text
//!     # This is a comment
//!     INPUT(i0)
//!     INPUT(i1)
//!     x0 = AND(i0, i1)
//!     x1 = NAND(x0, i1)
//!     g1 = DFF(x1)
//!     OUTPUT(x0)
//! ```
//! A flip-flop's output name (`g1` above) is usable by any gate in the
//! file regardless of where its `DFF(...)` line sits textually: it is a
//! pseudo primary input, not an ordinary statement, so it is bound before
//! any gate line is resolved. `.bench` has no explicit clock signal; one
//! synthetic input is added and shared by every flip-flop when the file
//! declares at least one.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read};

use crate::error::InputError;
use crate::gate_type::Primitive;
use crate::network::{DffSpec, GateSpec, InputRef, LogicStatement, NetlistInput};

struct RawStmt {
    name: String,
    keyword: String,
    deps: Vec<String>,
}

#[derive(Default)]
struct ParsedBench {
    input_names: Vec<String>,
    output_names: Vec<String>,
    raw_stmts: Vec<RawStmt>,
}

fn split_args(t: &str) -> Vec<String> {
    t.split(&['(', ')', ','])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_lines<R: Read>(r: R) -> Result<ParsedBench, InputError> {
    let mut parsed = ParsedBench::default();
    for line in BufReader::new(r).lines() {
        let line = line.map_err(|e| InputError::Io(e.to_string()))?;
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if !t.contains('=') {
            let parts = split_args(t);
            if parts.len() != 2 {
                return Err(InputError::Io(format!("malformed statement `{t}`")));
            }
            match parts[0].to_uppercase().as_str() {
                "INPUT" | "PINPUT" => parsed.input_names.push(parts[1].clone()),
                "OUTPUT" | "POUTPUT" => parsed.output_names.push(parts[1].clone()),
                other => return Err(InputError::UnknownGateType(other.to_string())),
            }
        } else {
            let Some((lhs, rhs)) = t.split_once('=') else {
                return Err(InputError::Io(format!("malformed statement `{t}`")));
            };
            let name = lhs.trim().to_string();
            let args = split_args(rhs);
            let Some((keyword, deps)) = args.split_first() else {
                return Err(InputError::Io(format!("malformed statement `{t}`")));
            };
            parsed.raw_stmts.push(RawStmt {
                name,
                keyword: keyword.clone(),
                deps: deps.to_vec(),
            });
        }
    }
    Ok(parsed)
}

fn is_dff_keyword(keyword: &str) -> bool {
    keyword.eq_ignore_ascii_case("DFF")
}

fn gate_spec_for(keyword: &str, arity: usize, name: &str) -> Result<GateSpec, InputError> {
    let wrong = |expected| InputError::WrongArity {
        name: name.to_string(),
        expected,
        found: arity,
    };
    match keyword.to_uppercase().as_str() {
        "AND" => Ok(GateSpec::Primitive(Primitive::And, arity)),
        "NAND" => Ok(GateSpec::Primitive(Primitive::Nand, arity)),
        "OR" => Ok(GateSpec::Primitive(Primitive::Or, arity)),
        "NOR" => Ok(GateSpec::Primitive(Primitive::Nor, arity)),
        "XOR" => {
            if arity < 2 {
                return Err(wrong(2));
            }
            Ok(GateSpec::Primitive(Primitive::Xor, arity))
        }
        "XNOR" => {
            if arity < 2 {
                return Err(wrong(2));
            }
            Ok(GateSpec::Primitive(Primitive::Xnor, arity))
        }
        "BUF" | "BUFF" => {
            if arity != 1 {
                return Err(wrong(1));
            }
            Ok(GateSpec::Primitive(Primitive::Buff, 1))
        }
        "NOT" => {
            if arity != 1 {
                return Err(wrong(1));
            }
            Ok(GateSpec::Primitive(Primitive::Not, 1))
        }
        "GND" | "VSS" => {
            if arity != 0 {
                return Err(wrong(0));
            }
            Ok(GateSpec::Primitive(Primitive::C0, 0))
        }
        "VDD" => {
            if arity != 0 {
                return Err(wrong(0));
            }
            Ok(GateSpec::Primitive(Primitive::C1, 0))
        }
        other => Err(InputError::UnknownGateType(other.to_string())),
    }
}

/// Picks a clock input name distinct from every name the file already
/// binds, following the `__clock__` default a `.bench` reader falls back
/// to when the format itself carries no clock signal.
fn fresh_clock_name(taken: &HashSet<String>) -> String {
    let mut name = "__clock__".to_string();
    while taken.contains(&name) {
        name.push('_');
    }
    name
}

fn build_netlist(parsed: ParsedBench) -> Result<NetlistInput, InputError> {
    let mut input = NetlistInput::new();
    input.input_names = parsed.input_names.clone();

    let mut all_names: HashSet<String> = HashSet::new();
    for n in &parsed.input_names {
        if !all_names.insert(n.clone()) {
            return Err(InputError::DuplicateNode(n.clone()));
        }
    }
    for s in &parsed.raw_stmts {
        if !all_names.insert(s.name.clone()) {
            return Err(InputError::DuplicateNode(s.name.clone()));
        }
    }

    let mut sym: HashMap<String, InputRef> = HashMap::new();
    for (i, n) in parsed.input_names.iter().enumerate() {
        sym.insert(n.clone(), InputRef::Input(i));
    }

    // Flip-flop outputs are bound up front, before any gate statement is
    // resolved: a `.bench` DFF output is a pseudo primary input, readable
    // by every gate regardless of where its own line sits in the file.
    let mut dff_line: HashMap<usize, usize> = HashMap::new();
    for (i, s) in parsed.raw_stmts.iter().enumerate() {
        if is_dff_keyword(&s.keyword) {
            let dff_id = dff_line.len();
            dff_line.insert(i, dff_id);
            sym.insert(s.name.clone(), InputRef::DffOutput(dff_id));
        }
    }

    let clock_ref = if dff_line.is_empty() {
        None
    } else {
        let clock_name = fresh_clock_name(&all_names);
        let idx = input.input_names.len();
        input.input_names.push(clock_name);
        Some(InputRef::Input(idx))
    };

    let resolve = |name: &str, sym: &HashMap<String, InputRef>| -> Result<InputRef, InputError> {
        if let Some(&r) = sym.get(name) {
            Ok(r)
        } else if all_names.contains(name) {
            Err(InputError::NotTopologicallySorted(name.to_string()))
        } else {
            Err(InputError::UnknownNode(name.to_string()))
        }
    };

    for (i, s) in parsed.raw_stmts.iter().enumerate() {
        if dff_line.contains_key(&i) {
            if s.deps.len() != 1 {
                return Err(InputError::WrongArity {
                    name: s.name.clone(),
                    expected: 1,
                    found: s.deps.len(),
                });
            }
            let data_in = resolve(&s.deps[0], &sym)?;
            let mut dff = DffSpec::new(data_in);
            dff.output_name = Some(s.name.clone());
            dff.clock = clock_ref;
            input.dffs.push(dff);
            continue;
        }

        let gate = gate_spec_for(&s.keyword, s.deps.len(), &s.name)?;
        let mut fanins = Vec::with_capacity(s.deps.len());
        for d in &s.deps {
            fanins.push(resolve(d, &sym)?);
        }
        let stmt_idx = input.statements.len();
        input.statements.push(LogicStatement {
            name: Some(s.name.clone()),
            gate,
            fanins,
        });
        sym.insert(s.name.clone(), InputRef::Statement(stmt_idx));
    }

    for name in &parsed.output_names {
        input.output_refs.push(resolve(name, &sym)?);
    }

    Ok(input)
}

/// Reads a `.bench` file into a [`NetlistInput`], ready for
/// [`crate::TpgNetwork::build`].
pub fn read_bench<R: Read>(r: R) -> Result<NetlistInput, InputError> {
    build_netlist(parse_lines(r)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultType;
    use crate::network::TpgNetwork;

    #[test]
    fn test_basic_combinational() {
        let text = "\
# a tiny comb. circuit
INPUT(i0)
INPUT(i1)
x0 = AND(i0, i1)
x1 = NAND(x0, i1)
x2 = OR(i0, i1)
x3 = NOR(i0, x1)
x4 = XOR(x3, x2)
x5 = BUF(x4)
x6 = NOT(x5)
x7 = gnd
x8 = vdd
OUTPUT(x0)
OUTPUT(x6)
OUTPUT(x7)
OUTPUT(x8)
";
        let input = read_bench(text.as_bytes()).unwrap();
        assert_eq!(input.input_names.len(), 2);
        assert_eq!(input.statements.len(), 9);
        assert_eq!(input.output_refs.len(), 4);
        assert!(input.dffs.is_empty());

        let net = TpgNetwork::build(&input, FaultType::StuckAt).unwrap();
        assert_eq!(net.ppi_num(), 2);
        assert_eq!(net.ppo_num(), 4);
    }

    #[test]
    fn test_dff_output_usable_before_its_own_line() {
        // `q` is referenced by `x0` before the `DFF` line that defines it.
        let text = "\
INPUT(d)
x0 = AND(q, d)
q = DFF(d)
OUTPUT(x0)
";
        let input = read_bench(text.as_bytes()).unwrap();
        assert_eq!(input.dffs.len(), 1);
        // the synthetic clock is appended after the true inputs.
        assert_eq!(input.input_names, vec!["d".to_string(), "__clock__".to_string()]);
        assert_eq!(input.dffs[0].clock, Some(InputRef::Input(1)));

        let net = TpgNetwork::build(&input, FaultType::StuckAt).unwrap();
        assert_eq!(net.dff_num(), 1);
    }

    #[test]
    fn test_unknown_node_is_reported() {
        let text = "\
INPUT(i0)
OUTPUT(nope)
";
        let err = read_bench(text.as_bytes()).unwrap_err();
        assert_eq!(err, InputError::UnknownNode("nope".to_string()));
    }

    #[test]
    fn test_forward_reference_to_a_later_gate_is_not_topological() {
        let text = "\
INPUT(i0)
x0 = BUF(x1)
x1 = BUF(i0)
OUTPUT(x0)
";
        let err = read_bench(text.as_bytes()).unwrap_err();
        assert_eq!(err, InputError::NotTopologicallySorted("x1".to_string()));
    }

    #[test]
    fn test_duplicate_node_is_reported() {
        let text = "\
INPUT(i0)
x0 = BUF(i0)
x0 = NOT(i0)
OUTPUT(x0)
";
        let err = read_bench(text.as_bytes()).unwrap_err();
        assert_eq!(err, InputError::DuplicateNode("x0".to_string()));
    }

    #[test]
    fn test_unknown_gate_type_is_reported() {
        let text = "\
INPUT(i0)
x0 = MAJ(i0, i0, i0)
OUTPUT(x0)
";
        let err = read_bench(text.as_bytes()).unwrap_err();
        assert_eq!(err, InputError::UnknownGateType("MAJ".to_string()));
    }
}
