//! A single node of the network arena and its structural role.

use crate::ids::{DffId, GateTypeId, NodeId};

/// What a node represents. Exactly one of these applies to any node; most
/// fields line up with the PPI/PPO numbering the rest of the crate keys off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// A true primary input. `input_id` is its dense index into `ppi_list`.
    PrimaryInput { input_id: usize },
    /// The output side of a scan flip-flop, treated as a pseudo primary
    /// input. `input_id` is its dense index into `ppi_list`.
    DffOutput { dff_id: DffId, input_id: usize },
    /// An ordinary combinational gate.
    Logic,
    /// A true primary output. `output_id` is its dense index into
    /// `ppo_list`.
    PrimaryOutput { output_id: usize },
    /// The input side of a scan flip-flop, treated as a pseudo primary
    /// output. `output_id` is its dense index into `ppo_list`.
    DffInput { dff_id: DffId, output_id: usize },
    /// Clock, clear or preset pseudo-input of a flip-flop: present in the
    /// network for structural completeness but excluded from fault
    /// enumeration (it is not on the data side).
    DffControl { dff_id: DffId },
}

impl Role {
    /// Dense PPI index, for roles that are pseudo primary inputs.
    pub fn ppi_input_id(&self) -> Option<usize> {
        match self {
            Role::PrimaryInput { input_id } | Role::DffOutput { input_id, .. } => {
                Some(*input_id)
            }
            _ => None,
        }
    }

    /// Dense PPO index, for roles that are pseudo primary outputs.
    pub fn ppo_output_id(&self) -> Option<usize> {
        match self {
            Role::PrimaryOutput { output_id } | Role::DffInput { output_id, .. } => {
                Some(*output_id)
            }
            _ => None,
        }
    }

    pub fn is_ppi(&self) -> bool {
        self.ppi_input_id().is_some()
    }

    pub fn is_ppo(&self) -> bool {
        self.ppo_output_id().is_some()
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Role::Logic)
    }

    /// Pure control nodes (clock/clear/preset) sit outside the data side
    /// and never carry a fault.
    pub fn is_control(&self) -> bool {
        matches!(self, Role::DffControl { .. })
    }
}

/// One node of the arena. Built once by `TpgNetwork::build` and never
/// mutated afterwards (the few fields computed in a second pass, like
/// `imm_dom` and `output_id2`, are filled in before the network is handed
/// back to the caller).
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    /// Registry entry for logic nodes; `None` for PPI/PPO/control nodes.
    pub gate_type: Option<GateTypeId>,
    pub fanins: Vec<NodeId>,
    pub fanouts: Vec<NodeId>,
    /// For a DFF output, the paired DFF input, and vice versa.
    pub alt_node: Option<NodeId>,
    /// Immediate dominator on the fanout side; `None` once a node's effect
    /// can reach more than one output-side region, or before the second
    /// construction pass has run.
    pub imm_dom: Option<NodeId>,
    /// Root of this node's fanout-free region.
    pub ffr_root: NodeId,
    /// Root of this node's maximal fanout-free cone.
    pub mffc_root: NodeId,
    /// TFI-size-ascending secondary order among PPOs; only meaningful when
    /// `role.is_ppo()`.
    pub output_id2: usize,
    pub name: Option<String>,
}

impl Node {
    pub fn fanin_num(&self) -> usize {
        self.fanins.len()
    }

    pub fn fanout_num(&self) -> usize {
        self.fanouts.len()
    }

    /// An FFR root is the unique multi-fanout (or PPO/DFF-input) node of
    /// its region.
    pub fn is_ffr_root(&self) -> bool {
        self.fanout_num() != 1 || self.role.is_ppo()
    }

    /// An MFFC root either reaches more than one output region (no single
    /// dominator exists) or dominates itself, which is how a PPO's
    /// terminal, self-dominating status is represented.
    pub fn is_mffc_root(&self) -> bool {
        match self.imm_dom {
            None => true,
            Some(d) => d == self.id,
        }
    }
}
