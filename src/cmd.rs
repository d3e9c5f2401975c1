//! Command line interface

use std::cell::RefCell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use kdam::{tqdm, BarExt};
use rand::SeedableRng;

use satpg::dop::{Base, DetectOp, DopList, Drop as DropOp, Verify};
use satpg::dtpg::{run_dtpg, ConeGranularity, DtpgConfig};
use satpg::fault::{Fault, FaultStatusMgr, FaultType};
use satpg::ids::FaultId;
use satpg::io::read_bench;
use satpg::justify::JustifyPolicy;
use satpg::network::stats::stats;
use satpg::network::TpgNetwork as Net;
use satpg::sat::KissatSolver;
use satpg::sim::Fsim;
use satpg::testvector::TestVector;
use satpg::NetlistInput;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Command line arguments
#[derive(Subcommand)]
pub enum Commands {
    /// Show statistics about a netlist: node/FFR/MFFC/fault counts
    #[clap()]
    Show(ShowArgs),

    /// Generate test patterns for every representative fault
    ///
    /// Builds one propagation cone per FFR (or MFFC), solves every fault it
    /// contains under assumptions, and prints a test vector per detected
    /// fault. Faults the SAT solver proves unreachable are reported
    /// untestable; faults that hit the conflict limit are left undetected.
    #[clap(alias = "atpg")]
    Atpg(AtpgArgs),
}

/// Shared input-format handling: only `.bench` (ISCAS89) is implemented.
/// `--blif` is accepted on the command line for surface parity with the
/// flags a full ATPG harness exposes, but has no reader behind it here.
fn read_netlist(path: &PathBuf, blif: bool) -> NetlistInput {
    if blif {
        eprintln!("BLIF input is not implemented by this core; pass --iscas89 with a .bench file");
        std::process::exit(1);
    }
    let f = File::open(path).unwrap_or_else(|e| {
        eprintln!("failed to open `{}`: {e}", path.display());
        std::process::exit(1);
    });
    read_bench(f).unwrap_or_else(|e| {
        eprintln!("failed to parse `{}`: {e}", path.display());
        std::process::exit(1);
    })
}

/// Command arguments for netlist statistics
#[derive(Args)]
pub struct ShowArgs {
    /// Netlist to show (.bench)
    file: PathBuf,

    /// Read the file as BLIF instead of ISCAS89 .bench (unimplemented)
    #[arg(long)]
    blif: bool,

    /// Build for transition-delay faults instead of stuck-at
    #[arg(long)]
    transition_delay: bool,
}

impl ShowArgs {
    pub fn run(&self) {
        let input = read_netlist(&self.file, self.blif);
        let fault_type = if self.transition_delay {
            FaultType::TransitionDelay
        } else {
            FaultType::StuckAt
        };
        let net = Net::build(&input, fault_type).unwrap_or_else(|e| {
            eprintln!("failed to build network: {e}");
            std::process::exit(1);
        });
        println!("{}", stats(&net));
    }
}

/// Collects every `(fault id, test vector)` pair the chain sees, so the CLI
/// can print the final pattern set after the run without needing to
/// downcast a `Box<dyn DetectOp>` back to a concrete type.
struct Collector(Rc<RefCell<Vec<(FaultId, TestVector)>>>);

impl DetectOp for Collector {
    fn apply(
        &mut self,
        fault: &Fault,
        tv: &TestVector,
        _net: &Net,
        _status: &mut FaultStatusMgr,
        _fsim: &mut Fsim<'_>,
    ) {
        self.0.borrow_mut().push((fault.id, tv.clone()));
    }
}

/// Command arguments for test pattern generation
#[derive(Args)]
pub struct AtpgArgs {
    /// Netlist to generate test patterns for (.bench)
    network: PathBuf,

    /// Output file for test patterns, one hex line per detected fault.
    /// Prints to stdout if omitted.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Read the file as BLIF instead of ISCAS89 .bench (unimplemented)
    #[arg(long)]
    blif: bool,

    /// Target transition-delay faults instead of stuck-at (the default)
    #[arg(long)]
    transition_delay: bool,

    /// Build one CNF per maximal fanout-free cone instead of per FFR
    /// (the default)
    #[arg(long)]
    mffc: bool,

    /// Use the smallest-transitive-fanin-input justifier (`bt2`) instead of
    /// the first-qualifying-input one (`bt1`, the default)
    #[arg(long)]
    bt2: bool,

    /// Conflict budget handed to the SAT solver for every fault; faults
    /// that exceed it are left undetected rather than failing the run
    #[arg(long)]
    conflict_limit: Option<u32>,

    /// Forwarded to the SAT client for logging purposes; this core only
    /// has one backend (kissat) so the string has no structural effect
    #[arg(long)]
    sat_option: Option<String>,

    /// Random seed used to fill leftover don't-care bits before printing
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Leave unconstrained bits as `X` instead of filling them randomly
    #[arg(long)]
    no_fill: bool,

    /// Show a progress bar over the FFR/MFFC work list
    #[arg(long)]
    progress: bool,
}

impl AtpgArgs {
    pub fn run(&self) {
        if let Some(opt) = &self.sat_option {
            eprintln!("sat_option `{opt}` noted, has no effect on the kissat backend");
        }

        let input = read_netlist(&self.network, self.blif);
        let fault_type = if self.transition_delay {
            FaultType::TransitionDelay
        } else {
            FaultType::StuckAt
        };
        let net = Net::build(&input, fault_type).unwrap_or_else(|e| {
            eprintln!("failed to build network: {e}");
            std::process::exit(1);
        });

        let cone = if self.mffc {
            ConeGranularity::Mffc
        } else {
            ConeGranularity::Ffr
        };
        let justifier = if self.bt2 {
            JustifyPolicy::SmallestTfi
        } else {
            JustifyPolicy::First
        };
        let config = DtpgConfig {
            cone,
            justifier,
            conflict_limit: self.conflict_limit,
        };

        let mut status = FaultStatusMgr::new(net.faults().len());
        let mut fsim = Fsim::new(&net);
        let collected: Rc<RefCell<Vec<(FaultId, TestVector)>>> = Rc::new(RefCell::new(Vec::new()));
        let mut dops = DopList::new();
        dops.push(Box::new(Base));
        dops.push(Box::new(DropOp));
        dops.push(Box::new(Verify::new()));
        dops.push(Box::new(Collector(collected.clone())));

        let total = match config.cone {
            ConeGranularity::Ffr => net.ffr_num(),
            ConeGranularity::Mffc => net.mffc_num(),
        };
        let mut pb = self.progress.then(|| tqdm!(total = total, desc = "DTPG"));

        let t0 = Instant::now();
        let run_stats = run_dtpg::<KissatSolver>(
            &net,
            &mut status,
            &mut fsim,
            &mut dops,
            &config,
            |_done, _total| {
                if let Some(pb) = pb.as_mut() {
                    let _ = pb.update(1);
                }
            },
        );
        let wall = t0.elapsed();

        eprintln!(
            "{} detected, {} untestable, {} aborted ({:.2?} wall, {:.2?} CNF, {:.2?} SAT)",
            run_stats.det_count,
            run_stats.untestable_count,
            run_stats.abort_count,
            wall,
            run_stats.cnf_gen_time,
            run_stats.sat_time,
        );

        let mut rng = rand::rngs::SmallRng::seed_from_u64(self.seed);
        let mut lines = Vec::new();
        for (fid, mut tv) in collected.borrow_mut().drain(..) {
            if !self.no_fill {
                tv.fill_random(&mut rng);
            }
            lines.push(format!("{fid}: {}", tv.hex_str()));
        }

        match &self.output {
            Some(path) => {
                std::fs::write(path, lines.join("\n") + "\n").unwrap_or_else(|e| {
                    eprintln!("failed to write `{}`: {e}", path.display());
                    std::process::exit(1);
                });
            }
            None => {
                for line in &lines {
                    println!("{line}");
                }
            }
        }
    }
}
