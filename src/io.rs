//! Netlist readers. Each format module only has to produce a
//! [`crate::network::NetlistInput`]; it never touches a `Node` or
//! `GateType` directly.

pub mod bench;

pub use bench::read_bench;
