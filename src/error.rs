//! Error types surfaced across the network build and input boundaries.

use thiserror::Error;

/// Failure building a `TpgNetwork` from a parsed netlist.
///
/// These are the only errors the core raises to a caller; everything past
/// network construction that would otherwise be an error (a fanin/fanout
/// mismatch, a variable-map hole mid-encoding) is instead an assertion,
/// since it indicates a bug in this crate rather than bad input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// A fanin (or output) referenced a node name that was never produced.
    #[error("node `{0}` is referenced but never defined")]
    UnknownNode(String),

    /// The same name was produced by two different statements.
    #[error("node `{0}` is defined twice")]
    DuplicateNode(String),

    /// The input listed gates in an order where a fanin comes after its
    /// user, or a cycle exists.
    #[error("netlist is not in topological order (or contains a combinational loop) at node `{0}`")]
    NotTopologicallySorted(String),

    /// A gate keyword the parser does not know how to interpret.
    #[error("unknown gate type `{0}`")]
    UnknownGateType(String),

    /// A gate statement had the wrong number of fanins for its type.
    #[error("gate `{name}` expects {expected} fanins, found {found}")]
    WrongArity {
        /// Name of the offending gate.
        name: String,
        expected: usize,
        found: usize,
    },

    /// Low-level I/O failure while reading the netlist source.
    #[error("I/O error while reading netlist: {0}")]
    Io(String),
}
