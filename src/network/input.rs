//! The plain data the external netlist parser hands to `TpgNetwork::build`.
//!
//! This is intentionally the narrowest possible contract: a parser (BLIF,
//! ISCAS89 `.bench`, or anything else) only needs to produce one of these;
//! it never touches a `Node` or a `GateType` directly. Fanins are already
//! resolved to positions in this structure rather than by name, mirroring
//! what a real parser's name-to-signal table would have done internally.

use crate::gate_type::{Expr, Primitive};

/// A reference to an already-placed signal: a primary input, a DFF output,
/// or the result of an earlier logic statement. Constants are ordinary
/// statements (a `C0`/`C1` primitive with no fanins), not a separate
/// variant, so every signal is resolved the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRef {
    Input(usize),
    DffOutput(usize),
    Statement(usize),
}

/// Either a named structural primitive or a complex cell described by an
/// expression over the statement's own fanin positions.
#[derive(Clone, Debug)]
pub enum GateSpec {
    Primitive(Primitive, usize),
    Expr(Expr),
}

/// One logic-node statement, already in topological order relative to the
/// other statements (a `Statement(i)` fanin may only reference `i' < i`).
#[derive(Clone, Debug)]
pub struct LogicStatement {
    pub name: Option<String>,
    pub gate: GateSpec,
    pub fanins: Vec<InputRef>,
}

/// A scan flip-flop: data input plus optional enable/clear/preset/clock
/// control ports. Enable defaults to always-on, clear/preset/clock to
/// absent, matching the common case emitted by `.bench` readers.
#[derive(Clone, Debug)]
pub struct DffSpec {
    pub output_name: Option<String>,
    pub data_in: InputRef,
    pub enable: Option<InputRef>,
    pub clear: Option<InputRef>,
    pub preset: Option<InputRef>,
    pub clock: Option<InputRef>,
}

impl DffSpec {
    pub fn new(data_in: InputRef) -> DffSpec {
        DffSpec {
            output_name: None,
            data_in,
            enable: None,
            clear: None,
            preset: None,
            clock: None,
        }
    }

    /// The control ports present on this flip-flop, in a fixed order, for
    /// materialising `DffControl` pseudo-input nodes.
    pub fn controls(&self) -> Vec<InputRef> {
        [self.clock, self.clear, self.preset]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// The complete, already-resolved netlist handed to `TpgNetwork::build`.
#[derive(Clone, Debug, Default)]
pub struct NetlistInput {
    pub input_names: Vec<String>,
    pub statements: Vec<LogicStatement>,
    pub output_refs: Vec<InputRef>,
    pub dffs: Vec<DffSpec>,
}

impl NetlistInput {
    pub fn new() -> NetlistInput {
        NetlistInput::default()
    }
}
