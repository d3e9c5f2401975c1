//! Bit-true good-circuit simulation and per-fault propagation checking.
//!
//! Node ids already respect a topological order (fanins strictly precede
//! fanouts), so a single ascending pass over the arena is a full
//! event-driven evaluation: no queue, no dependency tracking. `sppfp` runs
//! that pass once for the good circuit, then for each un-skipped fault
//! walks the forward closure from its injection site the same way
//! `encode::cone`'s MFFC interior loop walks it, except numerically
//! (`GateType::eval`) rather than symbolically (`make_cnf`). `ppsfp` packs
//! up to [`WORD_WIDTH`] patterns into parallel slots and reports, per
//! fault, which slots detect it; it is built directly on top of `sppfp`'s
//! per-pattern walk rather than a separate bitwise gate evaluator; a true
//! word-packed 2-valued evaluator in the style of the teacher's
//! `SimpleSimulator` is future work.

use fxhash::FxHashMap;

use crate::encode::cone::forward_tfo;
use crate::fault::{Fault, FaultSite, FaultType};
use crate::ids::FaultId;
use crate::ids::NodeId;
use crate::network::{Node, Role, TpgNetwork};
use crate::testvector::TestVector;
use crate::val3::Val3;

/// Number of parallel pattern slots `ppsfp` packs into one detection
/// bitmask.
pub const WORD_WIDTH: usize = 64;

fn eval_node(net: &TpgNetwork, node: &Node, buf: &[Val3]) -> Val3 {
    match node.gate_type {
        Some(gt) => {
            let ins: Vec<Val3> = node.fanins.iter().map(|f| buf[f.index()]).collect();
            net.gate_type(gt).eval(&ins)
        }
        None => match node.fanins.as_slice() {
            [only] => buf[only.index()],
            _ => Val3::X,
        },
    }
}

/// Recomputes every non-PPI node of `buf` in ascending id order, leaving
/// PPI/DFF-output entries (the externally-driven ones) untouched.
fn run_comb(net: &TpgNetwork, buf: &mut [Val3]) {
    for i in 0..net.node_num() {
        let node = net.node(NodeId::new(i));
        if node.role.is_ppi() {
            continue;
        }
        buf[i] = eval_node(net, node, buf);
    }
}

/// Good-circuit state plus the per-fault skip flags `Drop` toggles.
pub struct Fsim<'a> {
    net: &'a TpgNetwork,
    previous: Vec<Val3>,
    current: Vec<Val3>,
    /// Dense index -> node id, for true primary inputs only; this is the
    /// numbering a transition-delay `TestVector`'s `launch_input` uses,
    /// which is narrower than the PPI numbering (it excludes DFF outputs).
    true_inputs: Vec<NodeId>,
    skip: Vec<bool>,
    patterns: Vec<Option<TestVector>>,
}

impl<'a> Fsim<'a> {
    pub fn new(net: &'a TpgNetwork) -> Fsim<'a> {
        let true_inputs = (0..net.ppi_num())
            .map(|i| net.ppi(i))
            .filter(|&id| matches!(net.node(id).role, Role::PrimaryInput { .. }))
            .collect();
        let n = net.node_num();
        Fsim {
            net,
            previous: vec![Val3::X; n],
            current: vec![Val3::X; n],
            true_inputs,
            skip: vec![false; net.faults().len()],
            patterns: (0..WORD_WIDTH).map(|_| None).collect(),
        }
    }

    pub fn set_skip(&mut self, f: FaultId) {
        self.skip[f.index()] = true;
    }

    pub fn clear_skip(&mut self, f: FaultId) {
        self.skip[f.index()] = false;
    }

    pub fn is_skipped(&self, f: FaultId) -> bool {
        self.skip[f.index()]
    }

    /// Fills parallel slot `slot` (< [`WORD_WIDTH`]) with a pattern for
    /// `ppsfp`. Patterns containing `X` bits are accepted but an `X` bit
    /// always simulates as a defined-but-arbitrary value at PPSFP time,
    /// since parallel simulation has no room for a third value; callers
    /// that care should `fill_random` first.
    pub fn set_pattern(&mut self, slot: usize, tv: &TestVector) {
        assert!(slot < WORD_WIDTH, "slot {slot} out of range");
        self.patterns[slot] = Some(tv.clone());
    }

    pub fn clear_patterns(&mut self) {
        for p in self.patterns.iter_mut() {
            *p = None;
        }
    }

    /// Initialises PPI-driven state directly, bypassing `TestVector`:
    /// `ppi_vec[i]` seeds PPI `i`'s current-frame value, `dff_vec[i]` its
    /// previous-frame value (consulted only for DFF-output PPIs). Used by
    /// the extractor/justifier round-trip check, which works in terms of
    /// raw per-node assignments rather than a packed vector.
    pub fn set_state(&mut self, ppi_vec: &[Val3], dff_vec: &[Val3]) {
        self.previous.iter_mut().for_each(|v| *v = Val3::X);
        for i in 0..self.net.ppi_num() {
            let id = self.net.ppi(i);
            if matches!(self.net.node(id).role, Role::DffOutput { .. }) {
                self.previous[id.index()] = dff_vec.get(i).copied().unwrap_or(Val3::X);
            }
        }
        run_comb(self.net, &mut self.previous);

        self.current.iter_mut().for_each(|v| *v = Val3::X);
        for i in 0..self.net.ppi_num() {
            let id = self.net.ppi(i);
            self.current[id.index()] = ppi_vec.get(i).copied().unwrap_or(Val3::X);
        }
        run_comb(self.net, &mut self.current);
    }

    /// Loads `tv` into `current` (and, in transition-delay mode, the
    /// launch state into `previous` first) and runs the good-circuit
    /// simulation.
    fn load_pattern(&mut self, tv: &TestVector) {
        self.previous.iter_mut().for_each(|v| *v = Val3::X);
        self.current.iter_mut().for_each(|v| *v = Val3::X);

        if tv.fault_type() == FaultType::TransitionDelay {
            for i in 0..self.net.ppi_num() {
                self.previous[self.net.ppi(i).index()] = tv.ppi_base(i);
            }
            run_comb(self.net, &mut self.previous);

            for (idx, &pi) in self.true_inputs.iter().enumerate() {
                self.current[pi.index()] = tv.launch_input(idx);
            }
            for i in 0..self.net.ppi_num() {
                let id = self.net.ppi(i);
                if let Role::DffOutput { .. } = self.net.node(id).role {
                    let din = self.net.node(id).alt_node.expect("dff output is paired");
                    self.current[id.index()] = self.previous[din.index()];
                }
            }
        } else {
            for i in 0..self.net.ppi_num() {
                self.current[self.net.ppi(i).index()] = tv.ppi_base(i);
            }
        }
        run_comb(self.net, &mut self.current);
    }

    /// Faulty value of every node reachable from `fault`'s injection site,
    /// relative to the already-simulated good circuit in `self.current`.
    fn propagate_fault(&self, fault: &Fault) -> FxHashMap<NodeId, Val3> {
        let net = self.net;
        let mut faulty: FxHashMap<NodeId, Val3> = FxHashMap::default();

        let start = match fault.site {
            FaultSite::Stem { node } => {
                faulty.insert(node, Val3::from_bool(fault.fval));
                node
            }
            FaultSite::Branch {
                output_node,
                input_pos,
            } => {
                let node = net.node(output_node);
                let ins: Vec<Val3> = node
                    .fanins
                    .iter()
                    .enumerate()
                    .map(|(pos, f)| {
                        if pos == input_pos {
                            Val3::from_bool(fault.fval)
                        } else {
                            self.current[f.index()]
                        }
                    })
                    .collect();
                let v = match node.gate_type {
                    Some(gt) => net.gate_type(gt).eval(&ins),
                    None => ins.first().copied().unwrap_or(Val3::X),
                };
                faulty.insert(output_node, v);
                output_node
            }
        };

        for &id in &forward_tfo(net, start) {
            if id == start {
                continue;
            }
            let node = net.node(id);
            let ins: Vec<Val3> = node
                .fanins
                .iter()
                .map(|f| *faulty.get(f).unwrap_or(&self.current[f.index()]))
                .collect();
            let v = match node.gate_type {
                Some(gt) => net.gate_type(gt).eval(&ins),
                None => match ins.as_slice() {
                    [only] => *only,
                    _ => Val3::X,
                },
            };
            faulty.insert(id, v);
        }
        faulty
    }

    /// Bitmask over the network's PPOs (bit `i` set when PPO `i`'s faulty
    /// value is defined and differs from the good value already sitting in
    /// `self.current`), capped at the first [`WORD_WIDTH`] PPOs.
    fn ppo_diff_bits(&self, faulty: &FxHashMap<NodeId, Val3>) -> u64 {
        let mut diff = 0u64;
        for i in 0..self.net.ppo_num().min(WORD_WIDTH) {
            let ppo = self.net.ppo(i);
            let good = self.current[ppo.index()];
            if let Some(&fv) = faulty.get(&ppo) {
                if fv.is_defined() && fv != good {
                    diff |= 1 << i;
                }
            }
        }
        diff
    }

    fn rep_faults_in_id_order(&self) -> Vec<FaultId> {
        let mut ids: Vec<FaultId> = self.net.rep_fault_list().to_vec();
        ids.sort_by_key(|f| f.index());
        ids
    }

    /// Single-pattern faulty simulation: evaluates the good circuit for
    /// `tv`, then for every un-skipped representative fault propagates a
    /// forward event from its site and reports the faults whose effect
    /// reaches at least one PPO.
    pub fn sppfp(&mut self, tv: &TestVector, mut cb: impl FnMut(FaultId, u64)) {
        self.load_pattern(tv);
        for fid in self.rep_faults_in_id_order() {
            if self.is_skipped(fid) {
                continue;
            }
            let fault = self.net.fault(fid);
            let faulty = self.propagate_fault(fault);
            let diff = self.ppo_diff_bits(&faulty);
            if diff != 0 {
                cb(fid, diff);
            }
        }
    }

    /// Parallel-pattern simulation across every filled slot: for each
    /// un-skipped fault, invokes `cb(fault, slot_bits)` where bit `s` of
    /// `slot_bits` is set when the pattern in slot `s` detects the fault.
    pub fn ppsfp(&mut self, mut cb: impl FnMut(FaultId, u64)) {
        let rep_faults = self.rep_faults_in_id_order();
        let mut detect: FxHashMap<FaultId, u64> = FxHashMap::default();

        for slot in 0..WORD_WIDTH {
            let Some(tv) = self.patterns[slot].clone() else {
                continue;
            };
            self.load_pattern(&tv);
            for &fid in &rep_faults {
                if self.is_skipped(fid) {
                    continue;
                }
                let fault = self.net.fault(fid);
                let faulty = self.propagate_fault(fault);
                if self.ppo_diff_bits(&faulty) != 0 {
                    *detect.entry(fid).or_insert(0) |= 1 << slot;
                }
            }
        }

        for fid in rep_faults {
            if let Some(&bits) = detect.get(&fid) {
                cb(fid, bits);
            }
        }
    }

    /// Number of signal transitions a fresh PPI assignment would cause
    /// relative to the currently stored state, optionally weighted by each
    /// toggling node's fanout count as a rough capacitance proxy. Used by
    /// power-aware pattern ordering; has no effect on detection.
    pub fn calc_wsa(&self, ppi_vec: &[Val3], weighted: bool) -> u32 {
        let mut scratch = self.current.clone();
        for i in 0..self.net.ppi_num() {
            scratch[self.net.ppi(i).index()] = ppi_vec.get(i).copied().unwrap_or(Val3::X);
        }
        run_comb(self.net, &mut scratch);

        let mut wsa = 0u32;
        for i in 0..self.net.node_num() {
            if self.current[i].is_defined() && scratch[i].is_defined() && self.current[i] != scratch[i] {
                wsa += if weighted {
                    self.net.node(NodeId::new(i)).fanout_num().max(1) as u32
                } else {
                    1
                };
            }
        }
        wsa
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::generators::{and_chain, fanout_reconverge};

    #[test]
    fn test_good_sim_matches_and_gate() {
        let net = and_chain(3, FaultType::StuckAt).unwrap();
        let mut fsim = Fsim::new(&net);
        let mut tv = TestVector::new_stuck_at(net.ppi_num());
        for i in 0..net.ppi_num() {
            tv.set(i, Val3::One);
        }
        let mut seen = Vec::new();
        fsim.sppfp(&tv, |f, bits| seen.push((f, bits)));
        // All-ones through an AND chain: stuck-at-0 faults on the chain are
        // exactly the ones a pattern of all ones can expose.
        assert!(!seen.is_empty());
    }

    #[test]
    fn test_sppfp_is_deterministic_in_fault_id_order() {
        let net = fanout_reconverge(FaultType::StuckAt).unwrap();
        let mut fsim = Fsim::new(&net);
        let mut tv = TestVector::new_stuck_at(net.ppi_num());
        for i in 0..net.ppi_num() {
            tv.set(i, Val3::One);
        }
        let mut order = Vec::new();
        fsim.sppfp(&tv, |f, _| order.push(f.index()));
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_set_skip_suppresses_detection() {
        let net = and_chain(3, FaultType::StuckAt).unwrap();
        let mut fsim = Fsim::new(&net);
        let mut tv = TestVector::new_stuck_at(net.ppi_num());
        for i in 0..net.ppi_num() {
            tv.set(i, Val3::One);
        }
        let mut baseline = Vec::new();
        fsim.sppfp(&tv, |f, _| baseline.push(f));
        assert!(!baseline.is_empty());
        for &f in &baseline {
            fsim.set_skip(f);
        }
        let mut after = Vec::new();
        fsim.sppfp(&tv, |f, _| after.push(f));
        assert!(after.is_empty());
    }

    #[test]
    fn test_ppsfp_matches_sppfp_over_same_slots() {
        let net = and_chain(3, FaultType::StuckAt).unwrap();
        let mut fsim = Fsim::new(&net);
        let mut tv = TestVector::new_stuck_at(net.ppi_num());
        for i in 0..net.ppi_num() {
            tv.set(i, Val3::One);
        }
        fsim.set_pattern(0, &tv);

        let mut from_sppfp = Vec::new();
        fsim.sppfp(&tv, |f, _| from_sppfp.push(f.index()));

        let mut from_ppsfp = Vec::new();
        fsim.ppsfp(|f, bits| {
            assert_eq!(bits, 1);
            from_ppsfp.push(f.index());
        });

        from_sppfp.sort();
        from_ppsfp.sort();
        assert_eq!(from_sppfp, from_ppsfp);
    }

    #[test]
    fn test_calc_wsa_counts_ppi_toggle() {
        let net = and_chain(2, FaultType::StuckAt).unwrap();
        let mut fsim = Fsim::new(&net);
        let mut tv = TestVector::new_stuck_at(net.ppi_num());
        for i in 0..net.ppi_num() {
            tv.set(i, Val3::Zero);
        }
        fsim.load_pattern(&tv);
        let flipped: Vec<Val3> = (0..net.ppi_num()).map(|_| Val3::One).collect();
        assert!(fsim.calc_wsa(&flipped, false) > 0);
    }
}
