//! Detect-op pipeline: the post-processing chain the DTPG driver runs every
//! time a SAT call produces `(fault, tv)`.

use crate::fault::{Fault, FaultStatus, FaultStatusMgr};
use crate::ids::FaultId;
use crate::network::TpgNetwork;
use crate::sim::Fsim;
use crate::testvector::TestVector;

/// One stage of the detect-op chain. Implementors see the fault and test
/// vector that just satisfied a SAT call, plus the shared `FaultStatusMgr`
/// and `Fsim` the driver owns for the whole run.
pub trait DetectOp {
    fn apply(
        &mut self,
        fault: &Fault,
        tv: &TestVector,
        net: &TpgNetwork,
        status: &mut FaultStatusMgr,
        fsim: &mut Fsim<'_>,
    );
}

/// Marks `fault` detected. Always first in a real chain; every other op
/// here assumes `status.status(fault.id)` already reflects this call.
pub struct Base;

impl DetectOp for Base {
    fn apply(
        &mut self,
        fault: &Fault,
        _tv: &TestVector,
        _net: &TpgNetwork,
        status: &mut FaultStatusMgr,
        _fsim: &mut Fsim<'_>,
    ) {
        status.set_detected(fault.id);
    }
}

/// Fault-dropping accelerator: skips `fault` in future simulation, then
/// checks which other un-skipped faults this same pattern happens to
/// detect and retires those too.
pub struct Drop;

impl DetectOp for Drop {
    fn apply(
        &mut self,
        fault: &Fault,
        tv: &TestVector,
        _net: &TpgNetwork,
        status: &mut FaultStatusMgr,
        fsim: &mut Fsim<'_>,
    ) {
        assert_ne!(
            status.status(fault.id),
            FaultStatus::Untestable,
            "an untestable fault can never be detected"
        );
        fsim.set_skip(fault.id);

        let mut additional: Vec<FaultId> = Vec::new();
        fsim.sppfp(tv, |fid, _diff_bits| additional.push(fid));

        for fid in additional {
            status.set_detected(fid);
            fsim.set_skip(fid);
        }
    }
}

/// Appends every `(fault, tv)` it sees to a shared list, for collecting the
/// final pattern set.
#[derive(Default)]
pub struct TvList {
    pub vectors: Vec<(FaultId, TestVector)>,
}

impl TvList {
    pub fn new() -> TvList {
        TvList::default()
    }
}

impl DetectOp for TvList {
    fn apply(
        &mut self,
        fault: &Fault,
        tv: &TestVector,
        _net: &TpgNetwork,
        _status: &mut FaultStatusMgr,
        _fsim: &mut Fsim<'_>,
    ) {
        self.vectors.push((fault.id, tv.clone()));
    }
}

/// Re-simulates `tv` and records a mismatch if `fault` doesn't actually
/// come out detected — the round-trip check the justifier's contract
/// promises. Temporarily clears `fault`'s skip flag for the check (an
/// earlier `Drop` stage may have already set it) and restores it
/// afterwards, so verification never depends on chain ordering.
#[derive(Default)]
pub struct Verify {
    pub mismatches: Vec<(FaultId, TestVector)>,
}

impl Verify {
    pub fn new() -> Verify {
        Verify::default()
    }
}

impl DetectOp for Verify {
    fn apply(
        &mut self,
        fault: &Fault,
        tv: &TestVector,
        _net: &TpgNetwork,
        _status: &mut FaultStatusMgr,
        fsim: &mut Fsim<'_>,
    ) {
        let was_skipped = fsim.is_skipped(fault.id);
        if was_skipped {
            fsim.clear_skip(fault.id);
        }

        let mut detected_here = false;
        fsim.sppfp(tv, |fid, _diff_bits| {
            if fid == fault.id {
                detected_here = true;
            }
        });

        if was_skipped {
            fsim.set_skip(fault.id);
        }
        if !detected_here {
            self.mismatches.push((fault.id, tv.clone()));
        }
    }
}

/// No-op, standing in for a stripped-out stage of the chain.
pub struct Dummy;

impl DetectOp for Dummy {
    fn apply(
        &mut self,
        _fault: &Fault,
        _tv: &TestVector,
        _net: &TpgNetwork,
        _status: &mut FaultStatusMgr,
        _fsim: &mut Fsim<'_>,
    ) {
    }
}

/// Composes a sequence of `DetectOp`s, invoked in registration order.
#[derive(Default)]
pub struct DopList {
    ops: Vec<Box<dyn DetectOp>>,
}

impl DopList {
    pub fn new() -> DopList {
        DopList::default()
    }

    pub fn push(&mut self, op: Box<dyn DetectOp>) {
        self.ops.push(op);
    }

    pub fn apply(
        &mut self,
        fault: &Fault,
        tv: &TestVector,
        net: &TpgNetwork,
        status: &mut FaultStatusMgr,
        fsim: &mut Fsim<'_>,
    ) {
        for op in self.ops.iter_mut() {
            op.apply(fault, tv, net, status, fsim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::generators::and_chain;
    use crate::val3::Val3;

    fn all_ones_vector(net: &TpgNetwork) -> TestVector {
        let mut tv = TestVector::new_stuck_at(net.ppi_num());
        for i in 0..net.ppi_num() {
            tv.set(i, Val3::One);
        }
        tv
    }

    #[test]
    fn test_base_marks_detected() {
        let net = and_chain(3, crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let tv = all_ones_vector(&net);
        let fault = net.fault(net.rep_fault_list()[0]);

        let mut base = Base;
        base.apply(fault, &tv, &net, &mut status, &mut fsim);
        assert_eq!(status.status(fault.id), FaultStatus::Detected);
    }

    #[test]
    fn test_drop_skips_cascading_faults_and_is_idempotent() {
        let net = and_chain(3, crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let tv = all_ones_vector(&net);

        // find a fault this pattern actually detects.
        let mut seen = Vec::new();
        fsim.sppfp(&tv, |fid, _| seen.push(fid));
        let fault_id = seen[0];
        let fault = net.fault(fault_id).clone();

        let mut base = Base;
        let mut drop_op = Drop;
        base.apply(&fault, &tv, &net, &mut status, &mut fsim);
        drop_op.apply(&fault, &tv, &net, &mut status, &mut fsim);
        assert!(fsim.is_skipped(fault.id));

        let det_count_after_first = status.det_count();
        let snapshot: Vec<FaultStatus> = net
            .rep_fault_list()
            .iter()
            .map(|&f| status.status(f))
            .collect();

        drop_op.apply(&fault, &tv, &net, &mut status, &mut fsim);
        assert_eq!(status.det_count(), det_count_after_first);
        let snapshot2: Vec<FaultStatus> = net
            .rep_fault_list()
            .iter()
            .map(|&f| status.status(f))
            .collect();
        assert_eq!(snapshot, snapshot2);
    }

    #[test]
    fn test_verify_accepts_a_correct_vector() {
        let net = and_chain(3, crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let tv = all_ones_vector(&net);

        let mut seen = Vec::new();
        fsim.sppfp(&tv, |fid, _| seen.push(fid));
        let fault = net.fault(seen[0]).clone();

        let mut verify = Verify::new();
        verify.apply(&fault, &tv, &net, &mut status, &mut fsim);
        assert!(verify.mismatches.is_empty());
    }

    #[test]
    fn test_verify_flags_a_vector_that_does_not_detect_the_fault() {
        let net = and_chain(3, crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        // The all-zero pattern propagates no stuck-at-0 fault through an
        // AND chain, so no fault is actually detected.
        let tv = TestVector::new_stuck_at(net.ppi_num());
        let fault = net.fault(net.rep_fault_list()[0]).clone();

        let mut verify = Verify::new();
        verify.apply(&fault, &tv, &net, &mut status, &mut fsim);
        assert_eq!(verify.mismatches.len(), 1);
    }

    #[test]
    fn test_dop_list_runs_ops_in_order() {
        let net = and_chain(3, crate::fault::FaultType::StuckAt).unwrap();
        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let tv = all_ones_vector(&net);

        let mut seen = Vec::new();
        fsim.sppfp(&tv, |fid, _| seen.push(fid));
        let fault = net.fault(seen[0]).clone();

        let mut chain = DopList::new();
        chain.push(Box::new(Base));
        chain.push(Box::new(Drop));
        chain.push(Box::new(TvList::new()));

        chain.apply(&fault, &tv, &net, &mut status, &mut fsim);
        assert_eq!(status.status(fault.id), FaultStatus::Detected);
    }
}
