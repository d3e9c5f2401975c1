//! Summary statistics over a built network, mostly useful for the CLI's
//! `--progress`/summary output.

use std::fmt;

use crate::gate_type::GateType;
use crate::network::TpgNetwork;

/// Counts of nodes, gates, partitions and faults in a `TpgNetwork`.
#[derive(Clone, Debug)]
pub struct NetworkStats {
    pub node_num: usize,
    pub ppi_num: usize,
    pub ppo_num: usize,
    pub dff_num: usize,
    pub logic_num: usize,
    pub complex_num: usize,
    pub ffr_num: usize,
    pub mffc_num: usize,
    pub fault_num: usize,
    pub rep_fault_num: usize,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network stats:")?;
        writeln!(f, "  Nodes: {}", self.node_num)?;
        writeln!(f, "  PPIs: {}", self.ppi_num)?;
        writeln!(f, "  PPOs: {}", self.ppo_num)?;
        if self.dff_num != 0 {
            writeln!(f, "  Dff: {}", self.dff_num)?;
        }
        writeln!(f, "  Logic: {}", self.logic_num)?;
        if self.complex_num != 0 {
            writeln!(f, "      complex: {}", self.complex_num)?;
        }
        writeln!(f, "  FFRs: {}", self.ffr_num)?;
        writeln!(f, "  MFFCs: {}", self.mffc_num)?;
        writeln!(
            f,
            "  Faults: {} ({} representative)",
            self.fault_num, self.rep_fault_num
        )?;
        fmt::Result::Ok(())
    }
}

/// Computes the statistics of a built network.
pub fn stats(net: &TpgNetwork) -> NetworkStats {
    let mut logic_num = 0;
    let mut complex_num = 0;
    for n in net.nodes() {
        if n.role.is_logic() {
            logic_num += 1;
            if matches!(net.gate_type_of(n.id), GateType::Complex(_)) {
                complex_num += 1;
            }
        }
    }
    NetworkStats {
        node_num: net.node_num(),
        ppi_num: net.ppi_num(),
        ppo_num: net.ppo_num(),
        dff_num: net.dff_num(),
        logic_num,
        complex_num,
        ffr_num: net.ffr_num(),
        mffc_num: net.mffc_num(),
        fault_num: net.faults().len(),
        rep_fault_num: net.rep_fault_list().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultType;
    use crate::network::generators::and_chain;

    #[test]
    fn test_stats_counts() {
        let net = and_chain(3, FaultType::StuckAt).unwrap();
        let s = stats(&net);
        assert_eq!(s.logic_num, 2);
        assert_eq!(s.ppi_num, 3);
        assert_eq!(s.ppo_num, 1);
    }
}
