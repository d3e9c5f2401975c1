//! Network construction: nodes, FFR/MFFC partitioning, and the structural
//! views (PPI/PPO/DFF lists) the rest of the crate reads from.

pub mod generators;
pub mod input;
mod network;
pub mod node;
pub mod stats;

pub use input::{DffSpec, GateSpec, InputRef, LogicStatement, NetlistInput};
pub use network::{Ffr, Mffc, TpgNetwork};
pub use node::{Node, Role};
