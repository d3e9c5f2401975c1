//! Stuck-at and transition-delay faults, their collapsing into a
//! representative list, and the FFR propagation condition used to activate
//! and structurally sensitise each one.

use crate::assign::{Assign, AssignList};
use crate::ids::{FaultId, NodeId};
use crate::network::TpgNetwork;
use crate::val3::Val3;
use fxhash::FxHashMap;

/// Which fault model a `TpgNetwork` was built for. Chosen once, at network
/// construction, since it determines whether every fault's propagation
/// condition carries a previous-time-frame assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultType {
    StuckAt,
    TransitionDelay,
}

/// Where a fault sits in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultSite {
    /// The output of a logic node is stuck.
    Stem { node: NodeId },
    /// The wire feeding fanin `input_pos` of `output_node` is stuck.
    Branch { output_node: NodeId, input_pos: usize },
}

impl FaultSite {
    /// The node the fault is "located at" for grouping purposes: the gate
    /// whose output or input pin the fault sits on.
    pub fn owner(&self) -> NodeId {
        match self {
            FaultSite::Stem { node } => *node,
            FaultSite::Branch { output_node, .. } => *output_node,
        }
    }
}

/// A stuck-at or transition-delay fault, representative or not.
#[derive(Clone, Debug)]
pub struct Fault {
    pub id: FaultId,
    pub site: FaultSite,
    /// The stuck value.
    pub fval: bool,
    /// Representative this fault collapses to; equal to `id` if this fault
    /// is itself the representative.
    pub rep: FaultId,
    pub ffr_root: NodeId,
    /// Structural activation + propagation-to-FFR-root condition, from
    /// `ffr_propagate_condition`.
    pub condition: AssignList,
}

impl Fault {
    pub fn is_representative(&self) -> bool {
        self.rep == self.id
    }
}

/// Computes the smallest assignment list that activates `site` at `fval`
/// and structurally propagates it to the root of its FFR.
pub fn ffr_propagate_condition(
    net: &TpgNetwork,
    site: FaultSite,
    fval: bool,
    fault_type: FaultType,
) -> AssignList {
    let mut al = AssignList::new();

    let (inode, walk_start) = match site {
        FaultSite::Stem { node } => (node, node),
        FaultSite::Branch {
            output_node,
            input_pos,
        } => {
            let inode = net.node(output_node).fanins[input_pos];
            add_side_inputs(net, output_node, Some(input_pos), &mut al);
            (inode, output_node)
        }
    };

    // Activation: the good circuit must carry the opposite of the stuck
    // value, so the faulty circuit's forced value is observably different.
    al.push(Assign::current(inode, Val3::from_bool(!fval)));
    if fault_type == FaultType::TransitionDelay {
        // The line must hold the stuck value one time frame earlier, so
        // the fault corresponds to a missed transition.
        al.push(Assign::previous(inode, Val3::from_bool(fval)));
    }

    let root = net.node(walk_start).ffr_root;
    let mut cur = walk_start;
    while cur != root {
        let fanout = net.node(cur).fanouts[0];
        let skip_pos = net.node(fanout).fanins.iter().position(|&f| f == cur);
        add_side_inputs(net, fanout, skip_pos, &mut al);
        cur = fanout;
    }
    al
}

/// Records, for every fanin of `gate` except `skip_pos`, the non-controlling
/// value required so that `gate`'s output is not masked. A passthrough role
/// (PPO/DFF-input) has no gate type and no masking semantics of its own, so
/// it contributes nothing here.
fn add_side_inputs(
    net: &TpgNetwork,
    gate: NodeId,
    skip_pos: Option<usize>,
    al: &mut AssignList,
) {
    let node = net.node(gate);
    let Some(gt_id) = node.gate_type else {
        return;
    };
    let gt = net.gate_type(gt_id);
    for (pos, &fanin) in node.fanins.iter().enumerate() {
        if Some(pos) == skip_pos {
            continue;
        }
        if let Some(c) = gt.controlling_value(pos) {
            al.push(Assign::current(fanin, !c));
        }
    }
}

/// Enumerates every stem and branch fault on the data side of the network,
/// computes each one's propagation condition, and collapses equivalent
/// faults onto a representative.
///
/// Called once by `TpgNetwork::build`; faults are enumerated in node-id
/// order so fault ids come out deterministic and grouped by owning node.
pub fn enumerate_and_collapse(
    net: &TpgNetwork,
    fault_type: FaultType,
    data_side: &[bool],
) -> Vec<Fault> {
    let mut faults: Vec<Fault> = Vec::new();
    // node -> [fault id for fval=false, fault id for fval=true]
    let mut stem_id: FxHashMap<NodeId, [FaultId; 2]> = FxHashMap::default();

    let mut push_fault = |faults: &mut Vec<Fault>, site: FaultSite, fval: bool| -> FaultId {
        let id = FaultId::new(faults.len());
        let ffr_root = net.node(site.owner()).ffr_root;
        let condition = ffr_propagate_condition(net, site, fval, fault_type);
        faults.push(Fault {
            id,
            site,
            fval,
            rep: id,
            ffr_root,
            condition,
        });
        id
    };

    for node in net.nodes() {
        if !data_side[node.id.index()] {
            continue;
        }
        if node.role.is_logic() {
            let f0 = push_fault(&mut faults, FaultSite::Stem { node: node.id }, false);
            let f1 = push_fault(&mut faults, FaultSite::Stem { node: node.id }, true);
            stem_id.insert(node.id, [f0, f1]);
        }
        if node.role.is_logic() || node.role.is_ppo() {
            for pos in 0..node.fanin_num() {
                push_fault(
                    &mut faults,
                    FaultSite::Branch {
                        output_node: node.id,
                        input_pos: pos,
                    },
                    false,
                );
                push_fault(
                    &mut faults,
                    FaultSite::Branch {
                        output_node: node.id,
                        input_pos: pos,
                    },
                    true,
                );
            }
        }
    }

    // Equivalence collapsing: single-fanout stem/branch identity first,
    // then controlling-value/controlled-output identity at the same gate.
    for idx in 0..faults.len() {
        let (site, fval) = (faults[idx].site, faults[idx].fval);
        let FaultSite::Branch {
            output_node,
            input_pos,
        } = site
        else {
            continue;
        };
        let fanin = net.node(output_node).fanins[input_pos];
        if net.node(fanin).fanout_num() == 1 && net.node(fanin).role.is_logic() {
            let rep = stem_id[&fanin][fval as usize];
            faults[idx].rep = rep;
            continue;
        }
        // A passthrough output_node (PPO/DFF-input) has no gate type and no
        // controlling-value identity to collapse onto.
        let Some(gt_id) = net.node(output_node).gate_type else {
            continue;
        };
        let gt = net.gate_type(gt_id);
        if let Some(c) = gt.controlling_value(input_pos) {
            if Val3::from_bool(fval) == c {
                let co = gt.cval(input_pos, c).to_bool();
                if let Some(&ids) = stem_id.get(&output_node) {
                    faults[idx].rep = ids[co as usize];
                }
            }
        }
    }

    faults
}

/// Detection status of a single fault, held outside the fault list itself
/// so a run can be reset without rebuilding the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultStatus {
    Undetected,
    Detected,
    Untestable,
}

/// Per-fault status plus the Fsim skip flags the `Drop` detect-op toggles.
pub struct FaultStatusMgr {
    status: Vec<FaultStatus>,
}

impl FaultStatusMgr {
    pub fn new(num_faults: usize) -> FaultStatusMgr {
        FaultStatusMgr {
            status: vec![FaultStatus::Undetected; num_faults],
        }
    }

    pub fn status(&self, f: FaultId) -> FaultStatus {
        self.status[f.index()]
    }

    pub fn set_detected(&mut self, f: FaultId) {
        self.status[f.index()] = FaultStatus::Detected;
    }

    pub fn set_untestable(&mut self, f: FaultId) {
        self.status[f.index()] = FaultStatus::Untestable;
    }

    pub fn is_undetected(&self, f: FaultId) -> bool {
        self.status(f) == FaultStatus::Undetected
    }

    pub fn det_count(&self) -> usize {
        self.status
            .iter()
            .filter(|s| **s == FaultStatus::Detected)
            .count()
    }

    pub fn untestable_count(&self) -> usize {
        self.status
            .iter()
            .filter(|s| **s == FaultStatus::Untestable)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::generators::and_chain;

    #[test]
    fn test_representative_idempotence() {
        let net = and_chain(4, FaultType::StuckAt).unwrap();
        for f in net.faults() {
            let rep = net.fault(f.rep);
            assert_eq!(rep.rep, rep.id, "representative must point to itself");
        }
    }

    #[test]
    fn test_single_fanout_branch_collapses_to_stem() {
        // A two-input AND chain: every interior node has exactly one
        // fanout, so every branch fault on an interior wire collapses to
        // the upstream stem fault, and rep_fault_list shrinks accordingly.
        let net = and_chain(4, FaultType::StuckAt).unwrap();
        assert!(net.rep_fault_list().len() < net.faults().len());
    }

    #[test]
    fn test_fault_status_mgr() {
        let mut mgr = FaultStatusMgr::new(3);
        let f = FaultId::new(1);
        assert!(mgr.is_undetected(f));
        mgr.set_detected(f);
        assert_eq!(mgr.status(f), FaultStatus::Detected);
        assert_eq!(mgr.det_count(), 1);
    }
}
