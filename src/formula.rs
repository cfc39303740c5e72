/*****************************************************************************************[formula.rs]
Copyright (c) 2019-2021, the limsat contributors

Permission is hereby granted, free of charge, to any person obtaining a copy of this software and
associated documentation files (the "Software"), to deal in the Software without restriction,
including without limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all copies or
substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT
NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT
OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
**************************************************************************************************/

//! The query contract and a quantifier-free formula evaluator.
//!
//! The solver core consumes queries through the [`Query`] trait only:
//! evaluation under a (possibly partial) model with nogood extraction, and
//! iteration over the atoms for vocabulary registration. [`Formula`] is
//! the concrete node tree for embeddings that do not bring their own;
//! action prefixes and quantifiers must have been eliminated upstream.

use crate::dense::TermMap;
use crate::lit::{Fun, Lit, Name};

/// A reduced query formula, as consumed by the solver core.
pub trait Query {
    /// True iff the model forces the formula true, i.e. every total
    /// extension of the assignment satisfies it. When the result is true
    /// and `nogood` is supplied, the buffer receives a minimal
    /// sub-assignment of model literals whose joint truth already forces
    /// the formula; its complement can serve as a learnt constraint.
    fn satisfied_by(&self, model: &TermMap<Fun, Name>, nogood: Option<&mut Vec<Lit>>) -> bool;

    /// Visit every `(f, n)` pair appearing in an atom.
    fn for_each_atom(&self, visit: &mut dyn FnMut(Fun, Name));
}

/// A quantifier-free formula over primitive literals.
///
/// Negation is kept structural and evaluated in negation normal form via a
/// polarity flag; an empty conjunction is the true constant, an empty
/// disjunction the false constant.
#[derive(Debug, Clone)]
pub enum Formula {
    Lit(Lit),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn lit(a: Lit) -> Self {
        Formula::Lit(a)
    }
    pub fn eq(f: Fun, n: Name) -> Self {
        Formula::Lit(Lit::eq(f, n))
    }
    pub fn neq(f: Fun, n: Name) -> Self {
        Formula::Lit(Lit::neq(f, n))
    }
    pub fn not(g: Formula) -> Self {
        Formula::Not(Box::new(g))
    }
    pub fn and(gs: Vec<Formula>) -> Self {
        Formula::And(gs)
    }
    pub fn or(gs: Vec<Formula>) -> Self {
        Formula::Or(gs)
    }
    /// The true constant.
    pub fn top() -> Self {
        Formula::And(vec![])
    }
    /// The false constant.
    pub fn bottom() -> Self {
        Formula::Or(vec![])
    }

    /// Three-valued evaluation under `model` with the node read in the
    /// polarity `pos`. On a determined result the witness buffer has been
    /// extended with assignment equalities grounding it; on `None` the
    /// buffer is unchanged.
    fn eval(&self, model: &TermMap<Fun, Name>, pos: bool, w: &mut Vec<Lit>) -> Option<bool> {
        match self {
            Formula::Lit(a) => {
                let m = model.get(a.fun()).cloned().unwrap_or(Name::NULL);
                if m.null() {
                    return None;
                }
                w.push(Lit::eq(a.fun(), m));
                Some(((m == a.name()) == a.pos()) == pos)
            }
            Formula::Not(g) => g.eval(model, !pos, w),
            Formula::And(gs) | Formula::Or(gs) => {
                // under the given polarity the node is conjunctive or
                // disjunctive; `conj` is the value a child must take for
                // the walk to continue
                let conj = matches!(self, Formula::And(_)) == pos;
                let mark = w.len();
                let mut undetermined = false;
                for g in gs {
                    let save = w.len();
                    match g.eval(model, pos, w) {
                        None => undetermined = true,
                        Some(v) if v == conj => {}
                        Some(_) => {
                            // one child decides the whole node; its
                            // witness replaces everything gathered so far
                            let decisive: Vec<Lit> = w.split_off(save);
                            w.truncate(mark);
                            w.extend(decisive);
                            return Some(!conj);
                        }
                    }
                }
                if undetermined {
                    w.truncate(mark);
                    return None;
                }
                Some(conj)
            }
        }
    }
}

impl Query for Formula {
    fn satisfied_by(&self, model: &TermMap<Fun, Name>, nogood: Option<&mut Vec<Lit>>) -> bool {
        let mut w = Vec::new();
        let forced = self.eval(model, true, &mut w) == Some(true);
        if forced {
            if let Some(out) = nogood {
                w.sort_unstable();
                w.dedup();
                out.clear();
                out.extend(w);
            }
        }
        forced
    }

    fn for_each_atom(&self, visit: &mut dyn FnMut(Fun, Name)) {
        match self {
            Formula::Lit(a) => visit(a.fun(), a.name()),
            Formula::Not(g) => g.for_each_atom(visit),
            Formula::And(gs) | Formula::Or(gs) => {
                for g in gs {
                    g.for_each_atom(visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn f(i: u32) -> Fun {
        Fun::from_id(i)
    }
    fn n(i: u32) -> Name {
        Name::from_id(i)
    }

    fn model(assign: &[(u32, u32)]) -> TermMap<Fun, Name> {
        let mut m = TermMap::new();
        for &(fi, ni) in assign {
            m.insert(f(fi), n(ni));
        }
        m
    }

    #[test]
    fn test_literal_three_valued() {
        let q = Formula::eq(f(1), n(1));
        assert!(q.satisfied_by(&model(&[(1, 1)]), None));
        assert!(!q.satisfied_by(&model(&[(1, 2)]), None));
        assert!(!q.satisfied_by(&model(&[]), None)); // unassigned: not forced
        let q = Formula::neq(f(1), n(1));
        assert!(q.satisfied_by(&model(&[(1, 2)]), None));
        assert!(!q.satisfied_by(&model(&[(1, 1)]), None));
    }

    #[test]
    fn test_negation_polarity() {
        let q = Formula::not(Formula::not(Formula::eq(f(1), n(1))));
        assert!(q.satisfied_by(&model(&[(1, 1)]), None));
        let q = Formula::not(Formula::eq(f(1), n(1)));
        assert!(q.satisfied_by(&model(&[(1, 2)]), None));
        assert!(!q.satisfied_by(&model(&[]), None));
    }

    #[test]
    fn test_connectives_partial() {
        let q = Formula::or(vec![Formula::eq(f(1), n(1)), Formula::eq(f(2), n(1))]);
        // one forced disjunct suffices even with the other unassigned
        assert!(q.satisfied_by(&model(&[(2, 1)]), None));
        assert!(!q.satisfied_by(&model(&[(1, 2)]), None));
        let q = Formula::and(vec![Formula::eq(f(1), n(1)), Formula::eq(f(2), n(1))]);
        assert!(!q.satisfied_by(&model(&[(1, 1)]), None));
        assert!(q.satisfied_by(&model(&[(1, 1), (2, 1)]), None));
    }

    #[test]
    fn test_constants() {
        assert!(Formula::top().satisfied_by(&model(&[]), None));
        assert!(!Formula::bottom().satisfied_by(&model(&[]), None));
    }

    #[test]
    fn test_nogood_is_minimal_sub_assignment() {
        let q = Formula::or(vec![Formula::eq(f(1), n(1)), Formula::eq(f(2), n(1))]);
        let m = model(&[(1, 2), (2, 1), (3, 5)]);
        let mut nogood = vec![];
        assert!(q.satisfied_by(&m, Some(&mut nogood)));
        // only the forcing disjunct's assignment is reported
        assert_eq!(nogood, vec![Lit::eq(f(2), n(1))]);
    }

    #[test]
    fn test_atom_iteration() {
        let q = Formula::and(vec![
            Formula::eq(f(1), n(1)),
            Formula::not(Formula::neq(f(2), n(3))),
        ]);
        let mut atoms = vec![];
        q.for_each_atom(&mut |fun, name| atoms.push((fun.id(), name.id())));
        assert_eq!(atoms, vec![(1, 1), (2, 3)]);
    }
}
