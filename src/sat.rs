//! The narrow SAT client interface the encoder and DTPG driver depend on:
//! fresh variable, clause/AND/OR/XOR gate, solve-under-assumptions with a
//! conflict budget. Everything above this trait is solver-agnostic; the
//! only implementation lives here, wrapping `rustsat` + `rustsat-kissat`.

use rustsat::instances::BasicVarManager;
use rustsat::solvers::{Solve, SolveIncremental, SolverResult};
use rustsat::types::{Lit, TernaryVal, Var};
use rustsat_kissat::Kissat;

use crate::val3::Val3;

/// Outcome of a bounded SAT call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SatOutcome {
    Sat,
    Unsat,
    /// The conflict budget was exhausted before a verdict was reached.
    Abort,
}

/// A SAT client able to build CNF incrementally and solve it repeatedly
/// under a changing set of assumptions, without ever adding a clause
/// between two solve calls for the same cone.
pub trait SatSolver {
    /// Allocates and returns a fresh literal (positive polarity).
    fn new_var(&mut self) -> Lit;

    fn add_clause(&mut self, lits: &[Lit]);

    /// Tseitin encoding of `out <-> AND(inputs)`.
    fn add_and_gate(&mut self, inputs: &[Lit], out: Lit) {
        let mut whole = Vec::with_capacity(inputs.len() + 1);
        whole.push(out);
        for &i in inputs {
            self.add_clause(&[!i, out]);
            whole.push(!i);
        }
        self.add_clause(&whole);
    }

    /// Tseitin encoding of `out <-> OR(inputs)`.
    fn add_or_gate(&mut self, inputs: &[Lit], out: Lit) {
        let mut whole = Vec::with_capacity(inputs.len() + 1);
        whole.push(!out);
        for &i in inputs {
            self.add_clause(&[i, !out]);
            whole.push(i);
        }
        self.add_clause(&whole);
    }

    /// Tseitin encoding of `out <-> (a XOR b)`.
    fn add_xor_gate(&mut self, a: Lit, b: Lit, out: Lit) {
        self.add_clause(&[!a, !b, !out]);
        self.add_clause(&[a, b, !out]);
        self.add_clause(&[a, !b, out]);
        self.add_clause(&[!a, b, out]);
    }

    /// Solves under `assumptions`, giving up after `conflict_limit`
    /// conflicts if one is given.
    fn solve(&mut self, assumptions: &[Lit], conflict_limit: Option<u32>) -> SatOutcome;

    /// Value of `lit` in the model of the last `Sat` outcome.
    fn model_val(&self, lit: Lit) -> Val3;
}

/// `rustsat-kissat`-backed implementation, one instance per propagation
/// cone (built once, solved many times under assumptions, then dropped).
pub struct KissatSolver {
    solver: Kissat,
    var_mgr: BasicVarManager,
}

impl KissatSolver {
    pub fn new() -> KissatSolver {
        KissatSolver {
            solver: Kissat::default(),
            var_mgr: BasicVarManager::default(),
        }
    }
}

impl Default for KissatSolver {
    fn default() -> Self {
        KissatSolver::new()
    }
}

impl SatSolver for KissatSolver {
    fn new_var(&mut self) -> Lit {
        let var: Var = self.var_mgr.new_var();
        Lit::positive(var)
    }

    fn add_clause(&mut self, lits: &[Lit]) {
        let clause = lits.iter().copied().collect();
        self.solver
            .add_clause(clause)
            .expect("adding a clause to the solver failed");
    }

    fn solve(&mut self, assumptions: &[Lit], conflict_limit: Option<u32>) -> SatOutcome {
        if let Some(limit) = conflict_limit {
            self.solver.set_conflict_limit(limit);
        }
        match self.solver.solve_assumps(assumptions) {
            Ok(SolverResult::Sat) => SatOutcome::Sat,
            Ok(SolverResult::Unsat) => SatOutcome::Unsat,
            Ok(SolverResult::Interrupted) => SatOutcome::Abort,
            Err(e) => {
                eprintln!("sat solver error: {e}");
                SatOutcome::Abort
            }
        }
    }

    fn model_val(&self, lit: Lit) -> Val3 {
        match self.solver.lit_val(lit) {
            Ok(TernaryVal::True) => Val3::One,
            Ok(TernaryVal::False) => Val3::Zero,
            Ok(TernaryVal::DontCare) => Val3::X,
            Err(e) => {
                eprintln!("sat solver error reading model: {e}");
                Val3::X
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivial in-memory solver used by tests that only exercise the
    /// default gate-encoding methods, without spinning up kissat.
    struct CountingSolver {
        clauses: Vec<Vec<Lit>>,
        next_var: u32,
    }

    impl CountingSolver {
        fn new() -> CountingSolver {
            CountingSolver {
                clauses: Vec::new(),
                next_var: 0,
            }
        }
    }

    impl SatSolver for CountingSolver {
        fn new_var(&mut self) -> Lit {
            let v = Var::new(self.next_var);
            self.next_var += 1;
            Lit::positive(v)
        }

        fn add_clause(&mut self, lits: &[Lit]) {
            self.clauses.push(lits.to_vec());
        }

        fn solve(&mut self, _assumptions: &[Lit], _conflict_limit: Option<u32>) -> SatOutcome {
            SatOutcome::Abort
        }

        fn model_val(&self, _lit: Lit) -> Val3 {
            Val3::X
        }
    }

    #[test]
    fn test_and_gate_clause_count() {
        let mut s = CountingSolver::new();
        let a = s.new_var();
        let b = s.new_var();
        let out = s.new_var();
        s.add_and_gate(&[a, b], out);
        // 2 inputs -> 2 "out -> input" clauses + 1 "all inputs -> out" clause.
        assert_eq!(s.clauses.len(), 3);
    }

    #[test]
    fn test_xor_gate_clause_count() {
        let mut s = CountingSolver::new();
        let a = s.new_var();
        let b = s.new_var();
        let out = s.new_var();
        s.add_xor_gate(a, b, out);
        assert_eq!(s.clauses.len(), 4);
    }
}
