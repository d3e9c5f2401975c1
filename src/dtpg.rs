//! DTPG driver: builds one `PropCone` per FFR/MFFC, solves every contained
//! representative fault under assumptions against it, and pushes every SAT
//! hit through the detect-op chain.

use std::time::{Duration, Instant};

use rustsat::types::Lit;

use crate::assign::{Assign, TimeFrame};
use crate::dop::DopList;
use crate::encode::cone::PropCone;
use crate::fault::{Fault, FaultStatusMgr};
use crate::ids::FaultId;
use crate::justify::{extract_and_justify, JustifyPolicy};
use crate::network::TpgNetwork;
use crate::sat::{SatOutcome, SatSolver};
use crate::sim::Fsim;
use crate::val3::Val3;

/// Which partition a `PropCone` is built over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConeGranularity {
    Ffr,
    Mffc,
}

pub struct DtpgConfig {
    pub cone: ConeGranularity,
    pub justifier: JustifyPolicy,
    pub conflict_limit: Option<u32>,
}

/// Outcome counters and timing for a full `run_dtpg` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct DtpgStats {
    pub det_count: usize,
    pub untestable_count: usize,
    pub abort_count: usize,
    /// Wall time spent building `PropCone`s (CNF generation), across every
    /// FFR/MFFC.
    pub cnf_gen_time: Duration,
    /// Wall time spent inside `SatSolver::solve`, across every call.
    pub sat_time: Duration,
}

/// Runs DTPG over every FFR or MFFC of `net`, in network order, against
/// every representative fault still `Undetected`. One solver is built per
/// cone (`S::default()`) and reused via assumptions for every fault the
/// cone contains; no clause is ever added to it after construction.
///
/// `on_cone_done(done, total)` is called once after every FFR/MFFC is fully
/// processed, so a caller can drive a progress indicator without this
/// driver depending on one itself; pass `|_, _| {}` to ignore it.
pub fn run_dtpg<S: SatSolver + Default>(
    net: &TpgNetwork,
    status: &mut FaultStatusMgr,
    fsim: &mut Fsim<'_>,
    dops: &mut DopList,
    config: &DtpgConfig,
    mut on_cone_done: impl FnMut(usize, usize),
) -> DtpgStats {
    let mut stats = DtpgStats::default();
    match config.cone {
        ConeGranularity::Ffr => {
            let total = net.ffr_num();
            for (done, ffr) in net.ffrs().enumerate() {
                let mut solver = S::default();
                let t0 = Instant::now();
                let cone = PropCone::build_simple(&mut solver, net, ffr.root);
                stats.cnf_gen_time += t0.elapsed();
                let mut ids = ffr.faults.clone();
                ids.sort_by_key(|f| f.index());
                for fid in ids {
                    process_fault(net, &cone, &mut solver, fid, status, fsim, dops, config, &mut stats);
                }
                on_cone_done(done + 1, total);
            }
        }
        ConeGranularity::Mffc => {
            let total = net.mffc_num();
            for (done, mffc) in net.mffcs().enumerate() {
                let mut solver = S::default();
                let t0 = Instant::now();
                let cone = PropCone::build_mffc(&mut solver, net, mffc);
                stats.cnf_gen_time += t0.elapsed();
                let mut ids = mffc.faults.clone();
                ids.sort_by_key(|f| f.index());
                for fid in ids {
                    process_fault(net, &cone, &mut solver, fid, status, fsim, dops, config, &mut stats);
                }
                on_cone_done(done + 1, total);
            }
        }
    }
    stats
}

fn process_fault<S: SatSolver>(
    net: &TpgNetwork,
    cone: &PropCone,
    solver: &mut S,
    fid: FaultId,
    status: &mut FaultStatusMgr,
    fsim: &mut Fsim<'_>,
    dops: &mut DopList,
    config: &DtpgConfig,
    stats: &mut DtpgStats,
) {
    if !status.is_undetected(fid) {
        return;
    }
    let fault = net.fault(fid).clone();
    let assumptions = assumptions_for(cone, &fault);

    let t0 = Instant::now();
    let outcome = solver.solve(&assumptions, config.conflict_limit);
    stats.sat_time += t0.elapsed();

    match outcome {
        SatOutcome::Sat => {
            let tv = extract_and_justify(net, &fault, cone, solver, config.justifier);
            dops.apply(&fault, &tv, net, status, fsim);
            stats.det_count += 1;
        }
        SatOutcome::Unsat => {
            status.set_untestable(fid);
            stats.untestable_count += 1;
        }
        SatOutcome::Abort => {
            stats.abort_count += 1;
        }
    }
}

/// Assumption set for one SAT call: the fault's structural activation/
/// propagation condition, the cone's FFR-selection literals (empty for a
/// simple cone), and the cone's own top-level "propagates to root" literal.
fn assumptions_for(cone: &PropCone, fault: &Fault) -> Vec<Lit> {
    let mut lits: Vec<Lit> = fault.condition.iter().map(|a| assign_to_lit(cone, a)).collect();
    lits.extend(cone.activation_assumptions(fault.ffr_root));
    lits.push(cone.prop_var(cone.root()));
    lits
}

fn assign_to_lit(cone: &PropCone, a: &Assign) -> Lit {
    let base = match a.time {
        TimeFrame::Current => cone.good_var(a.node),
        TimeFrame::Previous => cone
            .prev_var(a.node)
            .expect("fault condition references a previous frame the cone didn't build"),
    };
    match a.val {
        Val3::One => base,
        Val3::Zero => !base,
        Val3::X => unreachable!("a fault condition never assigns X"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultStatus;
    use crate::network::generators::{and_chain, fanout_reconverge, nor5};
    use crate::sat::KissatSolver;

    fn run_ffr(net: &TpgNetwork) -> (FaultStatusMgr, DtpgStats, DopList) {
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(net);
        let mut dops = DopList::new();
        dops.push(Box::new(crate::dop::Base));
        dops.push(Box::new(crate::dop::Drop));
        dops.push(Box::new(crate::dop::Verify::new()));

        let config = DtpgConfig {
            cone: ConeGranularity::Ffr,
            justifier: JustifyPolicy::First,
            conflict_limit: None,
        };
        let stats = run_dtpg::<KissatSolver>(net, &mut status, &mut fsim, &mut dops, &config, |_, _| {});
        (status, stats, dops)
    }

    #[test]
    fn test_every_fault_reaches_a_final_status() {
        let net = and_chain(4, crate::fault::FaultType::StuckAt).unwrap();
        let (status, stats, _dops) = run_ffr(&net);
        assert_eq!(stats.abort_count, 0);
        for &fid in net.rep_fault_list() {
            assert_ne!(status.status(fid), FaultStatus::Undetected);
        }
    }

    #[test]
    fn test_reconverging_fanout_is_fully_covered_under_mffc_granularity() {
        let net = fanout_reconverge(crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let mut dops = DopList::new();
        dops.push(Box::new(crate::dop::Base));

        let config = DtpgConfig {
            cone: ConeGranularity::Mffc,
            justifier: JustifyPolicy::SmallestTfi,
            conflict_limit: None,
        };
        let stats = run_dtpg::<KissatSolver>(&net, &mut status, &mut fsim, &mut dops, &config, |_, _| {});
        assert_eq!(stats.abort_count, 0);
        for &fid in net.rep_fault_list() {
            assert_ne!(status.status(fid), FaultStatus::Undetected);
        }
    }

    /// Collects every `(fault, tv)` the driver pushes through the chain, so
    /// the justifier's round-trip contract (§4.6: the returned `TestVector`
    /// must reproduce the fault effect at a PPO) can be checked directly
    /// against a fresh `Fsim`, independent of the `Drop`/`Verify` ops.
    struct Collect(std::rc::Rc<std::cell::RefCell<Vec<(crate::ids::FaultId, crate::testvector::TestVector)>>>);

    impl crate::dop::DetectOp for Collect {
        fn apply(
            &mut self,
            fault: &Fault,
            tv: &crate::testvector::TestVector,
            _net: &TpgNetwork,
            _status: &mut FaultStatusMgr,
            _fsim: &mut Fsim<'_>,
        ) {
            self.0.borrow_mut().push((fault.id, tv.clone()));
        }
    }

    #[test]
    fn test_justified_vectors_reproduce_their_fault_under_a_wide_gate() {
        let net = nor5(crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let collected = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut dops = DopList::new();
        dops.push(Box::new(crate::dop::Base));
        dops.push(Box::new(Collect(collected.clone())));

        let config = DtpgConfig {
            cone: ConeGranularity::Ffr,
            justifier: JustifyPolicy::First,
            conflict_limit: None,
        };
        let stats = run_dtpg::<KissatSolver>(&net, &mut status, &mut fsim, &mut dops, &config, |_, _| {});
        assert_eq!(stats.abort_count, 0);
        assert_eq!(
            status.untestable_count(),
            0,
            "a single NOR gate has no untestable fault"
        );

        let mut check_fsim = Fsim::new(&net);
        for (fid, tv) in collected.borrow().iter() {
            let mut detected = false;
            check_fsim.sppfp(tv, |hit, _bits| {
                if hit == *fid {
                    detected = true;
                }
            });
            assert!(detected, "justified vector for {fid:?} did not reproduce the fault");
        }
    }
}
