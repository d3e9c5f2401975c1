//! Small hand-built netlists used to exercise FFR/MFFC partitioning, fault
//! collapsing and CNF encoding without depending on an external benchmark
//! file.

use crate::error::InputError;
use crate::fault::FaultType;
use crate::gate_type::Primitive;
use crate::network::input::{GateSpec, InputRef, LogicStatement, NetlistInput};
use crate::network::TpgNetwork;

fn and2(fanins: [InputRef; 2]) -> LogicStatement {
    LogicStatement {
        name: None,
        gate: GateSpec::Primitive(Primitive::And, 2),
        fanins: fanins.to_vec(),
    }
}

/// `n` primary inputs cascaded through `n - 1` two-input AND gates into a
/// single output: every interior node has exactly one fanout, so the whole
/// network is a single FFR and a single MFFC.
pub fn and_chain(n: usize, fault_type: FaultType) -> Result<TpgNetwork, InputError> {
    assert!(n >= 2);
    let mut input = NetlistInput::new();
    input.input_names = (0..n).map(|i| format!("i{i}")).collect();

    input
        .statements
        .push(and2([InputRef::Input(0), InputRef::Input(1)]));
    for i in 2..n {
        input.statements.push(and2([
            InputRef::Statement(input.statements.len() - 1),
            InputRef::Input(i),
        ]));
    }
    input
        .output_refs
        .push(InputRef::Statement(input.statements.len() - 1));

    TpgNetwork::build(&input, fault_type)
}

/// Two independent AND gates sharing primary input `i0`: `i0` reaches both
/// primary outputs through disjoint paths, so it has no single immediate
/// dominator and is its own MFFC root despite not being an FFR root.
pub fn fanout_reconverge(fault_type: FaultType) -> Result<TpgNetwork, InputError> {
    let mut input = NetlistInput::new();
    input.input_names = vec!["i0".to_string(), "i1".to_string(), "i2".to_string()];
    input
        .statements
        .push(and2([InputRef::Input(0), InputRef::Input(1)]));
    input
        .statements
        .push(and2([InputRef::Input(0), InputRef::Input(2)]));
    input.output_refs.push(InputRef::Statement(0));
    input.output_refs.push(InputRef::Statement(1));

    TpgNetwork::build(&input, fault_type)
}

/// A 5-input NOR gate fed directly from the primary inputs.
pub fn nor5(fault_type: FaultType) -> Result<TpgNetwork, InputError> {
    let mut input = NetlistInput::new();
    input.input_names = (0..5).map(|i| format!("i{i}")).collect();
    input.statements.push(LogicStatement {
        name: None,
        gate: GateSpec::Primitive(Primitive::Nor, 5),
        fanins: (0..5).map(InputRef::Input).collect(),
    });
    input.output_refs.push(InputRef::Statement(0));
    TpgNetwork::build(&input, fault_type)
}

/// A single `C0` gate feeding a primary output: the textbook constant-gate
/// CNF check.
pub fn const0(fault_type: FaultType) -> Result<TpgNetwork, InputError> {
    let mut input = NetlistInput::new();
    input.statements.push(LogicStatement {
        name: None,
        gate: GateSpec::Primitive(Primitive::C0, 0),
        fanins: Vec::new(),
    });
    input.output_refs.push(InputRef::Statement(0));
    TpgNetwork::build(&input, fault_type)
}

/// A one-bit shift register: `d -> DFF -> q`, with `q` also a primary
/// output, used to exercise the DFF-output/DFF-input node roles and
/// transition-delay's previous-time-frame handling.
pub fn single_dff(fault_type: FaultType) -> Result<TpgNetwork, InputError> {
    let mut input = NetlistInput::new();
    input.input_names = vec!["d".to_string()];
    input.dffs.push(crate::network::input::DffSpec::new(
        InputRef::Input(0),
    ));
    // DFF output is PPI index 1 (after the true input); expose it directly
    // as a primary output too, so both pseudo and true ports are visible.
    let buf_stmt = LogicStatement {
        name: None,
        gate: GateSpec::Primitive(Primitive::Buff, 1),
        fanins: vec![InputRef::DffOutput(0)],
    };
    input.statements.push(buf_stmt);
    input.output_refs.push(InputRef::Statement(0));
    TpgNetwork::build(&input, fault_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_chain_is_single_ffr() {
        let net = and_chain(5, FaultType::StuckAt).unwrap();
        assert_eq!(net.ffr_num(), 1);
        assert_eq!(net.mffc_num(), 1);
    }

    #[test]
    fn test_fanout_reconverge_splits_mffcs() {
        let net = fanout_reconverge(FaultType::StuckAt).unwrap();
        // two POs, each its own FFR root and its own MFFC root.
        assert_eq!(net.ffr_num(), 2);
        assert_eq!(net.mffc_num(), 2);
    }

    #[test]
    fn test_single_dff_roles() {
        let net = single_dff(FaultType::StuckAt).unwrap();
        assert_eq!(net.dff_num(), 1);
        assert_eq!(net.ppi_num(), 2); // true input + DFF output
        assert_eq!(net.ppo_num(), 2); // true output + DFF input
    }
}
