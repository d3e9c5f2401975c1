//! Core engine of a SAT-based automatic test pattern generator: a
//! structural network model with FFR/MFFC partitioning and fault
//! collapsing, a CNF encoder built around per-fault propagation cones, and
//! a DTPG driver that reconciles every result against a bit-parallel fault
//! simulator.
//!
//! Netlist parsing, the command-line shell and the SAT backend itself are
//! kept at the edges: this crate only needs a [`network::NetlistInput`] in
//! and a stream of `(Fault, TestVector)` pairs out.

pub mod assign;
pub mod dop;
pub mod dtpg;
pub mod encode;
pub mod error;
pub mod fault;
pub mod gate_type;
pub mod ids;
pub mod io;
pub mod justify;
pub mod network;
pub mod sat;
pub mod sim;
pub mod testvector;
pub mod val3;

pub use error::InputError;
pub use fault::{Fault, FaultType};
pub use network::{NetlistInput, TpgNetwork};
pub use testvector::TestVector;
