/*****************************************************************************************[clause.rs]
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

//! Clause normalisation and the pool allocator.
//!
//! A clause is an ordered, duplicate-free sequence of literals with no
//! valid pair and no subsumption pair among its members. Clauses live in a
//! [`Factory`] and are addressed by small integer references; the first two
//! literals of a stored clause are its watched positions and are swapped in
//! place as watchers move.

use crate::lit::Lit;
use std::ops;

/// A reference to a clause slot in the [`Factory`].
///
/// `NULL` marks decisions (no reason clause); `DOMAIN` is a virtual
/// reference for assignments derived by domain propagation and never
/// addresses a real slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CRef(i32);

impl Default for CRef {
    fn default() -> Self {
        CRef::NULL
    }
}

impl CRef {
    pub const NULL: CRef = CRef(0);
    pub const DOMAIN: CRef = CRef(-1);

    #[inline(always)]
    fn slot(self) -> usize {
        debug_assert!(self.0 > 0);
        self.0 as usize
    }
}

/// Outcome of normalising a literal buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// The clause is a tautology and can be discarded.
    Valid,
    /// The clause is empty, hence unsatisfiable.
    Empty,
    /// The clause collapsed to a single literal.
    Unit(Lit),
    /// Two or more literals remain.
    Wide,
}

/// Sort by packed id, drop duplicates and null literals, detect valid
/// pairs, and collapse subsumption pairs.
///
/// A pair `(a, b)` with `a` subsuming `b` makes `a` redundant in a
/// disjunction, so the subsuming equality is dropped in favour of the
/// subsumed inequality. On return the buffer is either empty, a unit, or
/// contains at least two literals that are pairwise neither valid nor
/// subsuming.
pub fn normalize(lits: &mut Vec<Lit>) -> Shape {
    lits.retain(|a| !a.null());
    lits.sort_unstable();
    lits.dedup();
    for i in 0..lits.len() {
        for j in i + 1..lits.len() {
            if Lit::valid(lits[i], lits[j]) {
                return Shape::Valid;
            }
        }
    }
    collapse_subsumed(lits);
    match lits.len() {
        0 => Shape::Empty,
        1 => Shape::Unit(lits[0]),
        _ => Shape::Wide,
    }
}

/// Normalisation fast path for learnt clauses.
///
/// Literals of a learnt clause are jointly falsified by the trail, so no
/// valid pair can occur and the asserting literal in slot 0 is never the
/// redundant member of a subsumption pair. Order is preserved.
pub fn normalize_learnt(lits: &mut Vec<Lit>) {
    let mut i = 1;
    'outer: while i < lits.len() {
        for j in 0..lits.len() {
            if i != j && Lit::subsumes(lits[i], lits[j]) {
                debug_assert!(!Lit::valid(lits[i], lits[j]));
                lits.swap_remove(i);
                continue 'outer;
            }
        }
        i += 1;
    }
}

fn collapse_subsumed(lits: &mut Vec<Lit>) {
    let mut i = 0;
    'outer: while i < lits.len() {
        for j in 0..lits.len() {
            if i != j && Lit::properly_subsumes(lits[i], lits[j]) {
                lits.remove(i);
                continue 'outer;
            }
        }
        i += 1;
    }
}

const LEARNT: u32 = 1 << 31;
const SIZE_MASK: u32 = !LEARNT;

/// Pool allocator for clauses.
///
/// All literals live in one packed array; each slot records its offset,
/// its current size and a learnt flag. Slot 0 is a dummy so that
/// [`CRef::NULL`] never addresses a live clause. Freed slots are reused
/// for later allocations that fit their capacity.
#[derive(Debug, Default)]
pub struct Factory {
    headers: Vec<u32>, // learnt flag | current size
    offsets: Vec<u32>,
    caps: Vec<u32>,
    lits: Vec<Lit>,
    free: Vec<CRef>,
    wasted: usize,
}

impl Factory {
    pub fn new() -> Self {
        Self {
            headers: vec![0],
            offsets: vec![0],
            caps: vec![0],
            lits: Vec::new(),
            free: Vec::new(),
            wasted: 0,
        }
    }

    /// Number of literal slots in use, freed slots included.
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    pub fn wasted(&self) -> usize {
        self.wasted
    }

    /// Store a clause and return its reference. The literals are expected
    /// to be normalised already.
    pub fn alloc(&mut self, lits: &[Lit], learnt: bool) -> CRef {
        debug_assert!(lits.len() >= 2);
        let flag = if learnt { LEARNT } else { 0 };
        // reuse a freed slot if one is large enough
        for i in 0..self.free.len() {
            let cr = self.free[i];
            if self.caps[cr.slot()] as usize >= lits.len() {
                self.free.swap_remove(i);
                let offset = self.offsets[cr.slot()] as usize;
                self.lits[offset..offset + lits.len()].copy_from_slice(lits);
                self.headers[cr.slot()] = flag | lits.len() as u32;
                self.wasted -= self.caps[cr.slot()] as usize;
                self.wasted += self.caps[cr.slot()] as usize - lits.len();
                return cr;
            }
        }
        let cr = CRef(self.headers.len() as i32);
        self.offsets.push(self.lits.len() as u32);
        self.caps.push(lits.len() as u32);
        self.headers.push(flag | lits.len() as u32);
        self.lits.extend_from_slice(lits);
        cr
    }

    /// Return a slot to the pool.
    pub fn free(&mut self, cr: CRef) {
        self.wasted += self.caps[cr.slot()] as usize;
        self.headers[cr.slot()] &= LEARNT;
        self.free.push(cr);
    }

    #[inline(always)]
    pub fn size(&self, cr: CRef) -> usize {
        (self.headers[cr.slot()] & SIZE_MASK) as usize
    }

    #[inline(always)]
    pub fn learnt(&self, cr: CRef) -> bool {
        self.headers[cr.slot()] & LEARNT != 0
    }
}

impl ops::Index<CRef> for Factory {
    type Output = [Lit];
    #[inline(always)]
    fn index(&self, cr: CRef) -> &[Lit] {
        let offset = self.offsets[cr.slot()] as usize;
        &self.lits[offset..offset + self.size(cr)]
    }
}

impl ops::IndexMut<CRef> for Factory {
    #[inline(always)]
    fn index_mut(&mut self, cr: CRef) -> &mut [Lit] {
        let offset = self.offsets[cr.slot()] as usize;
        let size = self.size(cr);
        &mut self.lits[offset..offset + size]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lit::{Fun, Name};

    fn eq(f: u32, n: u32) -> Lit {
        Lit::eq(Fun::from_id(f), Name::from_id(n))
    }
    fn neq(f: u32, n: u32) -> Lit {
        Lit::neq(Fun::from_id(f), Name::from_id(n))
    }

    #[test]
    fn test_normalize_dedup() {
        let mut c = vec![eq(1, 1), eq(2, 1), eq(1, 1)];
        assert_eq!(normalize(&mut c), Shape::Wide);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_normalize_valid_pair() {
        let mut c = vec![eq(1, 1), neq(1, 1)];
        assert_eq!(normalize(&mut c), Shape::Valid);
        let mut c = vec![neq(1, 1), eq(2, 1), neq(1, 2)];
        assert_eq!(normalize(&mut c), Shape::Valid);
    }

    #[test]
    fn test_normalize_subsumption_collapse() {
        // f = n1 subsumes f != n2: the equality goes, the inequality stays
        let mut c = vec![eq(1, 1), neq(1, 2)];
        assert_eq!(normalize(&mut c), Shape::Unit(neq(1, 2)));
        // collapse happens across other functions too
        let mut c = vec![eq(1, 1), neq(1, 2), eq(2, 1)];
        assert_eq!(normalize(&mut c), Shape::Wide);
        assert_eq!(c, vec![neq(1, 2), eq(2, 1)]);
    }

    #[test]
    fn test_normalize_learnt_keeps_slot0() {
        let mut c = vec![neq(1, 2), eq(1, 1)];
        normalize_learnt(&mut c);
        assert_eq!(c, vec![neq(1, 2)]);
        let mut c = vec![neq(2, 1), eq(1, 1), neq(1, 2)];
        normalize_learnt(&mut c);
        assert_eq!(c, vec![neq(2, 1), neq(1, 2)]);
    }

    #[test]
    fn test_factory_roundtrip_and_reuse() {
        let mut fy = Factory::new();
        let c1 = fy.alloc(&[eq(1, 1), eq(1, 2), eq(2, 1)], false);
        let c2 = fy.alloc(&[neq(1, 1), eq(3, 1)], true);
        assert_eq!(&fy[c1], &[eq(1, 1), eq(1, 2), eq(2, 1)][..]);
        assert!(!fy.learnt(c1));
        assert!(fy.learnt(c2));
        fy[c1].swap(0, 2);
        assert_eq!(fy[c1][0], eq(2, 1));
        fy.free(c1);
        let c3 = fy.alloc(&[eq(4, 1), eq(4, 2)], false);
        assert_eq!(c3, c1); // slot reused
        assert_eq!(&fy[c3], &[eq(4, 1), eq(4, 2)][..]);
    }
}
