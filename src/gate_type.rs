//! Registry of logic primitives and complex (expression-defined) cells.
//!
//! Every node in the network points at one entry of this registry. A
//! primitive is interpreted directly by the simulator and the CNF encoder.
//! A complex type carries an expression tree over its input literals; it is
//! expanded into a tree of primitive gates lazily, once, when the type is
//! registered (`GateTypeRegistry::register_complex`), and the registry
//! memoises the two quantities every other component needs: how many fresh
//! internal nodes the expansion costs, and the per-input controlling-value
//! table used by the back-tracer.

use itertools::iproduct;

use crate::val3::Val3;

/// The ten structural primitives. `And`/`Nand`/`Or`/`Nor` accept any arity
/// including zero; `Xor`/`Xnor` are always binary; `C0`/`C1` are nullary;
/// `Buff`/`Not` are unary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    C0,
    C1,
    Buff,
    Not,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Xnor,
}

impl Primitive {
    /// The value that alone determines this gate's output (`Some`), or
    /// `None` for gates with no controlling value (XOR/XNOR).
    pub fn controlling_value(self) -> Option<Val3> {
        use Primitive::*;
        match self {
            And | Nand => Some(Val3::Zero),
            Or | Nor => Some(Val3::One),
            _ => None,
        }
    }

    /// Whether the gate inverts its controlling value to produce the
    /// controlled output (`Nand`, `Nor`, `Not` do).
    fn inverting(self) -> bool {
        matches!(self, Primitive::Nand | Primitive::Nor | Primitive::Not)
    }

    /// Evaluates the primitive over already-gathered 3-valued inputs.
    pub fn eval(self, inputs: &[Val3]) -> Val3 {
        use Primitive::*;
        match self {
            C0 => Val3::Zero,
            C1 => Val3::One,
            Buff => inputs[0],
            Not => !inputs[0],
            And => inputs.iter().copied().fold(Val3::One, |a, b| a & b),
            Nand => !inputs.iter().copied().fold(Val3::One, |a, b| a & b),
            Or => inputs.iter().copied().fold(Val3::Zero, |a, b| a | b),
            Nor => !inputs.iter().copied().fold(Val3::Zero, |a, b| a | b),
            Xor => inputs[0] ^ inputs[1],
            Xnor => !(inputs[0] ^ inputs[1]),
        }
    }
}

/// A literal over a complex type's formal inputs: input position plus
/// polarity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputLit {
    pub pos: usize,
    pub inverted: bool,
}

/// Expression tree backing a complex gate type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Lit(InputLit),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Xor(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// A positive reference to input `pos`.
    pub fn input(pos: usize) -> Expr {
        Expr::Lit(InputLit {
            pos,
            inverted: false,
        })
    }

    fn eval(&self, inputs: &[Val3]) -> Val3 {
        match self {
            Expr::Lit(l) => {
                let v = inputs[l.pos];
                if l.inverted {
                    !v
                } else {
                    v
                }
            }
            Expr::And(v) => v.iter().map(|e| e.eval(inputs)).fold(Val3::One, |a, b| a & b),
            Expr::Or(v) => v.iter().map(|e| e.eval(inputs)).fold(Val3::Zero, |a, b| a | b),
            Expr::Xor(v) => v.iter().map(|e| e.eval(inputs)).fold(Val3::Zero, |a, b| a ^ b),
            Expr::Not(e) => !e.eval(inputs),
        }
    }

    fn max_input(&self) -> usize {
        match self {
            Expr::Lit(l) => l.pos,
            Expr::And(v) | Expr::Or(v) | Expr::Xor(v) => {
                v.iter().map(|e| e.max_input()).max().unwrap_or(0)
            }
            Expr::Not(e) => e.max_input(),
        }
    }

    /// Number of primitive operator nodes this expression expands into,
    /// following the left-associative binary cascade rule for n-ary
    /// And/Or/Xor with arity above two.
    fn op_node_count(&self) -> usize {
        match self {
            Expr::Lit(_) => 0,
            Expr::Not(e) => 1 + e.op_node_count(),
            Expr::And(v) | Expr::Or(v) => {
                let arity = v.len().max(1);
                (arity - 1) + v.iter().map(|e| e.op_node_count()).sum::<usize>()
            }
            Expr::Xor(v) => {
                let arity = v.len().max(1);
                (arity - 1) + v.iter().map(|e| e.op_node_count()).sum::<usize>()
            }
        }
    }
}

/// A complex cell type: an expression plus its memoised properties.
#[derive(Clone, Debug)]
pub struct ComplexType {
    pub expr: Expr,
    input_num: usize,
    extra_node_num: usize,
    /// `cval_table[pos][v]`: output implied when input `pos` is `v` and all
    /// others are `X`. Indexed by `v as usize` (`X` = 0, `Zero` = 1, `One` = 2).
    cval_table: Vec<[Val3; 3]>,
}

impl ComplexType {
    fn new(expr: Expr) -> ComplexType {
        let input_num = expr.max_input() + 1;
        // The root node itself becomes `out_lit`; it needs no fresh
        // literal of its own, only its non-leaf descendants do.
        let extra_node_num = expr.op_node_count().saturating_sub(1);
        let mut cval_table = vec![[Val3::X; 3]; input_num];
        for (pos, v) in iproduct!(0..input_num, [Val3::X, Val3::Zero, Val3::One]) {
            let mut inputs = vec![Val3::X; input_num];
            inputs[pos] = v;
            cval_table[pos][val_index(v)] = expr.eval(&inputs);
        }
        ComplexType {
            expr,
            input_num,
            extra_node_num,
            cval_table,
        }
    }

    pub fn input_num(&self) -> usize {
        self.input_num
    }

    pub fn extra_node_num(&self) -> usize {
        self.extra_node_num
    }

    /// Output value implied when input `pos` takes value `v`, all others `X`.
    pub fn cval(&self, pos: usize, v: Val3) -> Val3 {
        self.cval_table[pos][val_index(v)]
    }

    pub fn eval(&self, inputs: &[Val3]) -> Val3 {
        self.expr.eval(inputs)
    }
}

fn val_index(v: Val3) -> usize {
    match v {
        Val3::X => 0,
        Val3::Zero => 1,
        Val3::One => 2,
    }
}

/// One entry of the registry: either a primitive with a fixed arity, or a
/// complex expression-defined cell.
#[derive(Clone, Debug)]
pub enum GateType {
    Primitive(Primitive, usize),
    Complex(ComplexType),
}

impl GateType {
    pub fn input_num(&self) -> usize {
        match self {
            GateType::Primitive(_, n) => *n,
            GateType::Complex(c) => c.input_num(),
        }
    }

    pub fn extra_node_num(&self) -> usize {
        match self {
            GateType::Primitive(_, _) => 0,
            GateType::Complex(c) => c.extra_node_num(),
        }
    }

    pub fn eval(&self, inputs: &[Val3]) -> Val3 {
        match self {
            GateType::Primitive(p, _) => p.eval(inputs),
            GateType::Complex(c) => c.eval(inputs),
        }
    }

    /// Output value implied when input `pos` is `v`, all other inputs `X`.
    pub fn cval(&self, pos: usize, v: Val3) -> Val3 {
        match self {
            GateType::Primitive(p, n) => {
                let mut inputs = vec![Val3::X; *n];
                inputs[pos] = v;
                p.eval(&inputs)
            }
            GateType::Complex(c) => c.cval(pos, v),
        }
    }

    /// The controlling value of input `pos`, if the gate type has one,
    /// derived from the cval table rather than hardcoded per primitive so
    /// that complex cells get the same treatment.
    pub fn controlling_value(&self, pos: usize) -> Option<Val3> {
        if let GateType::Primitive(p, _) = self {
            return p.controlling_value();
        }
        for v in [Val3::Zero, Val3::One] {
            if self.cval(pos, v).is_defined() {
                return Some(v);
            }
        }
        None
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, GateType::Complex(_))
    }
}

/// A collection of registered gate types, deduplicating complex expressions
/// that reduce to something already known.
#[derive(Default)]
pub struct GateTypeRegistry {
    types: Vec<GateType>,
}

impl GateTypeRegistry {
    pub fn new() -> GateTypeRegistry {
        let mut reg = GateTypeRegistry { types: Vec::new() };
        // Primitives are always available at fixed, well-known indices.
        reg.types.push(GateType::Primitive(Primitive::C0, 0));
        reg.types.push(GateType::Primitive(Primitive::C1, 0));
        reg.types.push(GateType::Primitive(Primitive::Buff, 1));
        reg.types.push(GateType::Primitive(Primitive::Not, 1));
        reg
    }

    pub fn primitive(&self, p: Primitive, arity: usize) -> crate::ids::GateTypeId {
        if let Some(idx) = self.types.iter().position(|t| match t {
            GateType::Primitive(tp, n) => *tp == p && *n == arity,
            _ => false,
        }) {
            return crate::ids::GateTypeId::new(idx);
        }
        self.types.push(GateType::Primitive(p, arity));
        crate::ids::GateTypeId::new(self.types.len() - 1)
    }

    /// Registers a complex expression, collapsing it to a primitive when it
    /// trivially reduces to one (single positive/negative literal).
    pub fn register_complex(&mut self, expr: Expr) -> crate::ids::GateTypeId {
        if let Expr::Lit(l) = &expr {
            let arity = l.pos + 1;
            return if l.inverted {
                self.primitive(Primitive::Not, arity.max(1))
            } else {
                self.primitive(Primitive::Buff, arity.max(1))
            };
        }
        self.types.push(GateType::Complex(ComplexType::new(expr)));
        crate::ids::GateTypeId::new(self.types.len() - 1)
    }

    pub fn get(&self, id: crate::ids::GateTypeId) -> &GateType {
        &self.types[id.index()]
    }

    /// Flattens an n-ary Xor/Xnor expression into the left-associative
    /// cascade of binary Xor described for CNF expansion, used both to
    /// build the primitive sub-tree during encoding and to cross-check
    /// `extra_node_num`.
    pub fn xor_cascade(inputs: &[usize]) -> Expr {
        let mut it = inputs.iter().copied();
        let first = it.next().expect("xor needs at least one input");
        it.fold(Expr::input(first), |acc, pos| {
            Expr::Xor(vec![acc, Expr::input(pos)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_controlling_value() {
        assert_eq!(Primitive::And.controlling_value(), Some(Val3::Zero));
        assert_eq!(Primitive::Or.controlling_value(), Some(Val3::One));
        assert_eq!(Primitive::Xor.controlling_value(), None);
    }

    #[test]
    fn test_const0_truth_table() {
        let reg = GateTypeRegistry::new();
        let id = reg.primitive(Primitive::C0, 0);
        assert_eq!(reg.get(id).eval(&[]), Val3::Zero);
    }

    #[test]
    fn test_and2_truth_table() {
        let reg = GateTypeRegistry::new();
        let id = reg.primitive(Primitive::And, 2);
        let g = reg.get(id);
        assert_eq!(g.eval(&[Val3::Zero, Val3::Zero]), Val3::Zero);
        assert_eq!(g.eval(&[Val3::Zero, Val3::One]), Val3::Zero);
        assert_eq!(g.eval(&[Val3::One, Val3::Zero]), Val3::Zero);
        assert_eq!(g.eval(&[Val3::One, Val3::One]), Val3::One);
    }

    #[test]
    fn test_nor5_single_one_pattern() {
        let reg = GateTypeRegistry::new();
        let id = reg.primitive(Primitive::Nor, 5);
        let g = reg.get(id);
        assert_eq!(g.eval(&[Val3::Zero; 5]), Val3::One);
        for flip in 0..5 {
            let mut inputs = [Val3::Zero; 5];
            inputs[flip] = Val3::One;
            assert_eq!(g.eval(&inputs), Val3::Zero);
        }
    }

    #[test]
    fn test_complex_reduces_to_primitive() {
        let mut reg = GateTypeRegistry::new();
        let id = reg.register_complex(Expr::Not(Box::new(Expr::input(0))));
        assert!(!reg.get(id).is_complex());
        assert_eq!(reg.get(id).eval(&[Val3::Zero]), Val3::One);
    }

    #[test]
    fn test_complex_mux_extra_nodes_and_cval() {
        let mut reg = GateTypeRegistry::new();
        // mux(s, a, b) = (s & a) | (!s & b)
        let expr = Expr::Or(vec![
            Expr::And(vec![Expr::input(0), Expr::input(1)]),
            Expr::And(vec![
                Expr::Not(Box::new(Expr::input(0))),
                Expr::input(2),
            ]),
        ]);
        let id = reg.register_complex(expr);
        let g = reg.get(id);
        assert!(g.is_complex());
        assert_eq!(g.input_num(), 3);
        // 2 And + 1 Or + 1 Not = 4 operator nodes, minus 1 for the root.
        assert_eq!(g.extra_node_num(), 3);
        assert_eq!(
            g.eval(&[Val3::One, Val3::One, Val3::Zero]),
            Val3::One
        );
        assert_eq!(
            g.eval(&[Val3::Zero, Val3::One, Val3::Zero]),
            Val3::Zero
        );
        // select line unknown, both data inputs agree -> still defined
        assert_eq!(
            g.eval(&[Val3::X, Val3::One, Val3::One]),
            Val3::One
        );
        // select line unknown, data inputs disagree -> X
        assert_eq!(
            g.eval(&[Val3::X, Val3::One, Val3::Zero]),
            Val3::X
        );
    }

    #[test]
    fn test_xor_cascade_arity() {
        let expr = GateTypeRegistry::xor_cascade(&[0, 1, 2, 3]);
        // 4-input xor cascades into 3 binary xor nodes.
        assert_eq!(expr.op_node_count(), 3);
    }

    #[test]
    fn test_monotonicity_of_cval() {
        let reg = GateTypeRegistry::new();
        let id = reg.primitive(Primitive::And, 3);
        let g = reg.get(id);
        // Specialising input 0 from X never un-defines what was already
        // computable from the others; here it strictly adds information.
        assert_eq!(g.cval(0, Val3::X), Val3::X);
        assert_eq!(g.cval(0, Val3::Zero), Val3::Zero);
    }
}
