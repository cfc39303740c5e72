/*****************************************************************************************[solver.rs]
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

//! The CDCL core.
//!
//! The solver decides satisfiability of a set of clauses over literals of
//! the form `f = n` / `f != n`. Assignments live on a trail; unit
//! propagation uses two watched literals per clause, indexed by function
//! symbol; excluding every name of a function's domain but one immediately
//! asserts the remaining equality (domain propagation); conflicts are
//! analysed to the first unique implication point, with the seen/wanted
//! book-keeping refined for the subsumption lattice of equality literals.

use {
    crate::clause::{self, CRef, Factory, Shape},
    crate::dense::{Comparator, DenseSet, HeapData, TermMap},
    crate::lit::{Fun, Lit, Name, Sort},
    smallvec::SmallVec,
    std::cmp,
    std::mem,
};

/// Decision levels; the root level is 1 and holds everything derived
/// without case splits.
pub type Level = usize;

pub const ROOT_LEVEL: Level = 1;

/// Result of a [`Solver::solve`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    /// No model exists (or a callback proved the run pointless).
    Unsat,
    /// A callback aborted the run; the solver is back at the root level.
    Unknown,
    /// A total model was found and accepted by the solution callback.
    Sat,
}

/// Supplies the sort of each function symbol and the reserved fresh name
/// of each sort, consumed while literals and clauses are registered.
///
/// The reserved name must be distinct from every name appearing in
/// clauses or queries, and its value per sort must remain stable for the
/// lifetime of the solver.
pub trait Vocab {
    fn sort_of(&self, f: Fun) -> Sort;
    fn extra_name(&mut self, s: Sort) -> Name;
}

/// Callbacks steering a single [`Solver::solve`] run.
///
/// All methods have neutral defaults; implementors override what they
/// need. Returning `false` from `on_conflict` or `on_decision` aborts the
/// run after the solver has returned to a consistent root state.
pub trait Callbacks {
    /// Called after every conflict analysis with the learnt clause and the
    /// level the solver is about to jump back to.
    fn on_conflict(&mut self, level: Level, learnt: &[Lit], btlevel: Level) -> bool {
        let _ = (level, learnt, btlevel);
        true
    }

    /// Called after every decision with the decided literal and the
    /// current partial model.
    fn on_decision(
        &mut self,
        level: Level,
        a: Lit,
        model: &TermMap<Fun, Name>,
        model_size: usize,
    ) -> bool {
        let _ = (level, a, model, model_size);
        true
    }

    /// Called when every registered function is assigned. Returning `true`
    /// accepts the assignment and ends the run with [`Truth::Sat`].
    /// Returning `false` rejects it; `nogood` should then hold a set of
    /// currently satisfied literals whose joint truth the caller refuses,
    /// which the solver turns into a learnt constraint before searching
    /// on.
    fn on_solution(
        &mut self,
        model: &TermMap<Fun, Name>,
        model_size: usize,
        nogood: &mut Vec<Lit>,
    ) -> bool {
        let _ = (model, model_size, nogood);
        true
    }
}

/// Per-pair metadata for every registered `(f, n)`.
///
/// Packed into a word of flag bits plus the reason reference:
/// `seen_subsumed` and `wanted` are scratch flags owned by conflict
/// analysis, `occurs` says some clause or query mentions the pair,
/// `model_neq` says the partial model derived `f != n`, and `level` (28
/// bits) is the decision level of the current assignment.
#[derive(Debug, Clone, Copy, Default)]
struct Data {
    bits: u32,
    reason: CRef,
}

const OCCURS: u32 = 1;
const MODEL_NEQ: u32 = 1 << 1;
const SEEN_SUBSUMED: u32 = 1 << 2;
const WANTED: u32 = 1 << 3;
const LEVEL_SHIFT: u32 = 4;

impl Data {
    #[inline(always)]
    fn occurs(self) -> bool {
        self.bits & OCCURS != 0
    }
    #[inline(always)]
    fn model_neq(self) -> bool {
        self.bits & MODEL_NEQ != 0
    }
    #[inline(always)]
    fn seen_subsumed(self) -> bool {
        self.bits & SEEN_SUBSUMED != 0
    }
    #[inline(always)]
    fn wanted(self) -> bool {
        self.bits & WANTED != 0
    }
    #[inline(always)]
    fn level(self) -> Level {
        (self.bits >> LEVEL_SHIFT) as Level
    }

    fn set_occurs(&mut self) {
        self.bits |= OCCURS;
    }
    fn set_seen_subsumed(&mut self, b: bool) {
        if b {
            self.bits |= SEEN_SUBSUMED;
        } else {
            self.bits &= !SEEN_SUBSUMED;
        }
    }
    fn set_wanted(&mut self, b: bool) {
        if b {
            self.bits |= WANTED;
        } else {
            self.bits &= !WANTED;
        }
    }

    /// Record the current assignment of the pair.
    fn update(&mut self, neq: bool, level: Level, reason: CRef) {
        debug_assert!(level < (1 << 28));
        self.bits = (self.bits & (OCCURS | SEEN_SUBSUMED | WANTED))
            | if neq { MODEL_NEQ } else { 0 }
            | (level as u32) << LEVEL_SHIFT;
        self.reason = reason;
    }

    /// Undo the assignment, keeping `occurs`.
    fn reset(&mut self) {
        self.bits &= OCCURS | SEEN_SUBSUMED | WANTED;
        self.reason = CRef::NULL;
    }
}

/// Ranks functions by activity, higher scores first.
struct ActivityCompare<'a> {
    activity: &'a TermMap<Fun, f64>,
}

impl<'a> Comparator<Fun> for ActivityCompare<'a> {
    fn cmp(&self, lhs: &Fun, rhs: &Fun) -> cmp::Ordering {
        PartialOrd::partial_cmp(&self.activity[*rhs], &self.activity[*lhs]).expect("NaN activity")
    }
}

type WatcherList = SmallVec<[CRef; 4]>;

/// The solver.
///
/// Clauses arrive at the root level through `add_literal` / `add_clause`,
/// which register their vocabulary via a [`Vocab`] supplier; embeddings
/// that interleave registration with clause ingestion can also call
/// `register` / `register_extra_name` directly, both idempotent. A
/// [`reset`](Solver::reset) restores a fresh search state between runs
/// while keeping the registered vocabulary and the original clauses.
pub struct Solver {
    /// True iff the empty clause has been derived; sticky.
    empty_clause: bool,

    factory: Factory,
    /// Original (problem) clauses.
    clauses: Vec<CRef>,
    /// Clauses learnt by conflict analysis or solution rejection.
    learnts: Vec<CRef>,
    /// When false, propagation ignores learnt clauses (they stay attached
    /// and still justify assignments made when they were active).
    propagate_with_learnt: bool,

    /// Functions occurring in clauses, their sorts, and the names of each
    /// sort (including the reserved extra name).
    funcs: DenseSet<Fun>,
    sorts: TermMap<Fun, Sort>,
    names: TermMap<Sort, DenseSet<Name>>,
    extra: TermMap<Sort, Name>,
    /// Per-function cursor into its sort's name set, caching where the
    /// last candidate scan ended.
    name_index: TermMap<Fun, usize>,

    /// `watchers[f]` lists the clauses whose watched positions mention `f`.
    watchers: TermMap<Fun, WatcherList>,

    /// Assignment trail, level boundaries, and the propagation cursor.
    /// `level_size[l]` is the trail index where level `l + 1` starts; the
    /// current level is `level_size.len()`.
    trail: Vec<Lit>,
    level_size: Vec<usize>,
    trail_head: usize,
    /// Length of the root trail prefix that was derived from the problem
    /// clauses alone. Facts beyond it may depend on per-run exclusions and
    /// are unwound by [`reset`](Solver::reset).
    clean_trail: usize,

    /// `model[f]` is the name assigned to `f`, or null. `data` holds the
    /// per-pair metadata, `domain_size[f]` the number of occurring names
    /// of `f` not yet excluded.
    model: TermMap<Fun, Name>,
    model_size: usize,
    data: TermMap<Fun, TermMap<Name, Data>>,
    domain_size: TermMap<Fun, u32>,

    /// Decision order: unassigned functions ranked by activity.
    order: HeapData<Fun>,
    activity: TermMap<Fun, f64>,
    bump_step: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Solver::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        Self {
            empty_clause: false,
            factory: Factory::new(),
            clauses: Vec::new(),
            learnts: Vec::new(),
            propagate_with_learnt: true,
            funcs: DenseSet::new(),
            sorts: TermMap::new(),
            names: TermMap::new(),
            extra: TermMap::new(),
            name_index: TermMap::new(),
            watchers: TermMap::new(),
            trail: Vec::new(),
            level_size: vec![0],
            trail_head: 0,
            clean_trail: 0,
            model: TermMap::new(),
            model_size: 0,
            data: TermMap::new(),
            domain_size: TermMap::new(),
            order: HeapData::new(),
            activity: TermMap::new(),
            bump_step: 1.0,
        }
    }

    /// The current partial model as a map from functions to names.
    #[inline]
    pub fn model(&self) -> &TermMap<Fun, Name> {
        &self.model
    }

    /// Number of functions currently assigned a name.
    #[inline]
    pub fn model_size(&self) -> usize {
        self.model_size
    }

    #[inline]
    pub fn current_level(&self) -> Level {
        self.level_size.len()
    }

    pub fn is_unsat(&self) -> bool {
        self.empty_clause
    }

    pub fn set_propagate_with_learnt(&mut self, b: bool) {
        self.propagate_with_learnt = b;
    }

    /// True iff `(f, n)` has been registered.
    pub fn registered(&self, f: Fun, n: Name) -> bool {
        self.data
            .get(f)
            .and_then(|ds| ds.get(n))
            .map_or(false, |d| d.occurs())
    }

    /// Make `(f, n)` part of the vocabulary: capacitate every term-indexed
    /// map, record the sort of `f`, enter `f` into the decision order, and
    /// count the pair towards `f`'s domain.
    pub fn register(&mut self, s: Sort, f: Fun, n: Name) {
        self.capacitate(s, f, n);
        if !self.funcs.contains(f) {
            self.funcs.insert(f);
            self.sorts[f] = s;
            let mut order = self.order.promote(ActivityCompare {
                activity: &self.activity,
            });
            if !order.contains(f) {
                order.insert(f);
            }
            let extra = self.extra[s];
            if !extra.null() {
                self.data[f].capacitate(extra);
                if !self.data[f][extra].occurs() {
                    self.data[f][extra].set_occurs();
                    self.domain_size[f] += 1;
                }
            }
        }
        debug_assert_eq!(self.sorts[f], s);
        if !self.data[f][n].occurs() {
            self.data[f][n].set_occurs();
            self.domain_size[f] += 1;
        }
        self.names[s].insert(n);
    }

    /// Record the reserved fresh name of sort `s`. The name must be
    /// distinct from every name occurring in clauses or queries; it serves
    /// as the default value of functions that are otherwise unconstrained.
    /// Idempotent; the name must not change once set.
    pub fn register_extra_name(&mut self, s: Sort, n: Name) {
        self.names.capacitate(s);
        self.extra.capacitate(s);
        if self.extra[s] == n {
            return;
        }
        debug_assert!(self.extra[s].null());
        self.extra[s] = n;
        self.names[s].insert(n);
        let fs: Vec<Fun> = self.funcs.iter().filter(|&f| self.sorts[f] == s).collect();
        for f in fs {
            self.data[f].capacitate(n);
            if !self.data[f][n].occurs() {
                self.data[f][n].set_occurs();
                self.domain_size[f] += 1;
            }
        }
    }

    fn capacitate(&mut self, s: Sort, f: Fun, n: Name) {
        self.names.capacitate(s);
        self.extra.capacitate(s);
        self.funcs.capacitate(f);
        self.sorts.capacitate(f);
        self.name_index.capacitate(f);
        self.watchers.capacitate(f);
        self.model.capacitate(f);
        self.data.capacitate(f);
        self.domain_size.capacitate(f);
        self.activity.capacitate(f);
        self.order.capacitate(f);
        self.data[f].capacitate(n);
        self.names[s].capacitate(n);
    }

    /// Register the vocabulary of one literal: the reserved name of its
    /// sort first, then the pair itself.
    fn register_lit(&mut self, a: Lit, vocab: &mut impl Vocab) {
        let f = a.fun();
        let s = vocab.sort_of(f);
        let extra = vocab.extra_name(s);
        self.register_extra_name(s, extra);
        self.register(s, f, a.name());
    }

    /// Insert a unit at the root level, registering its pair through
    /// `vocab`.
    pub fn add_literal(&mut self, a: Lit, vocab: &mut impl Vocab) {
        if a.null() {
            return;
        }
        debug_assert_eq!(self.current_level(), ROOT_LEVEL);
        self.register_lit(a, vocab);
        if self.falsifies(a) {
            self.empty_clause = true;
        } else {
            self.enqueue(a, CRef::NULL);
            self.clean_trail = self.trail.len();
        }
    }

    /// Insert a clause at the root level. The clause is normalised and the
    /// pair of every surviving literal registered through `vocab`;
    /// tautologies and clauses already satisfied at root are dropped,
    /// literals falsified at root are stripped.
    pub fn add_clause(&mut self, lits: &[Lit], vocab: &mut impl Vocab) {
        debug_assert_eq!(self.current_level(), ROOT_LEVEL);
        let mut c = lits.to_vec();
        match clause::normalize(&mut c) {
            Shape::Valid => {}
            Shape::Empty => self.empty_clause = true,
            Shape::Unit(a) => self.add_literal(a, vocab),
            Shape::Wide => {
                for i in 0..c.len() {
                    self.register_lit(c[i], vocab);
                }
                if c.iter().any(|&a| self.satisfies(a)) {
                    return;
                }
                let this = &*self;
                c.retain(|&a| !this.falsifies(a));
                match c.len() {
                    0 => self.empty_clause = true,
                    1 => self.add_literal(c[0], vocab),
                    _ => {
                        let cr = self.factory.alloc(&c, false);
                        self.clauses.push(cr);
                        self.attach_watchers(cr);
                    }
                }
            }
        }
    }

    /// Propagate everything pending at the root and sweep clauses that are
    /// satisfied there out of the store. A root conflict derives the empty
    /// clause.
    pub fn init(&mut self) {
        if self.empty_clause {
            return;
        }
        debug_assert_eq!(self.current_level(), ROOT_LEVEL);
        if self.propagate().is_some() {
            self.empty_clause = true;
            return;
        }
        self.clean_trail = self.trail.len();
        let mut i = 0;
        while i < self.clauses.len() {
            let cr = self.clauses[i];
            let mut sat = false;
            for k in 0..self.factory.size(cr) {
                let a = self.factory[cr][k];
                if self.satisfies(a) {
                    sat = true;
                    break;
                }
            }
            if sat {
                self.remove_watchers(cr);
                self.factory.free(cr);
                self.clauses.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Restore a fresh search state: back to root, learnt clauses dropped
    /// (unless kept), scratch cleared, every function's activity reseeded
    /// via `seed`, and the decision order rebuilt from the functions
    /// unassigned at root. Registration and original clauses survive.
    pub fn reset<F: FnMut(Fun) -> f64>(&mut self, keep_learnt: bool, mut seed: F) {
        self.backtrack(ROOT_LEVEL);
        // root facts derived during search may depend on per-run
        // exclusions; only the ingestion-time prefix survives
        self.undo_trail_from(self.clean_trail);
        if !keep_learnt && !self.learnts.is_empty() {
            let learnts = mem::take(&mut self.learnts);
            for &cr in &learnts {
                self.remove_watchers(cr);
                self.factory.free(cr);
            }
        }
        self.bump_step = 1.0;
        let fs: Vec<Fun> = self.funcs.iter().collect();
        for &f in &fs {
            self.activity[f] = seed(f);
        }
        let unassigned: Vec<Fun> = fs.into_iter().filter(|&f| self.model[f].null()).collect();
        self.order
            .promote(ActivityCompare {
                activity: &self.activity,
            })
            .build(&unassigned);
        self.propagate_with_learnt = true;
    }

    /// Run the CDCL loop. See [`Callbacks`] for the steering hooks.
    pub fn solve(&mut self, cb: &mut impl Callbacks) -> Truth {
        if self.empty_clause {
            return Truth::Unsat;
        }
        debug_assert_eq!(self.current_level(), ROOT_LEVEL);
        let mut learnt: Vec<Lit> = Vec::new();
        let mut nogood: Vec<Lit> = Vec::new();
        // a decision is reported only once it has propagated without
        // conflict, so the callback never sees a clause-falsifying state
        let mut pending: Option<Lit> = None;
        let mut go = true;
        while go {
            if let Some(conflict) = self.propagate() {
                pending = None;
                if self.current_level() == ROOT_LEVEL {
                    return Truth::Unsat;
                }
                let btlevel = self.analyze(conflict, &mut learnt);
                debug!("conflict at {}, backjump to {}", self.current_level(), btlevel);
                go &= cb.on_conflict(self.current_level(), &learnt, btlevel);
                self.backtrack(btlevel);
                if learnt.len() == 1 {
                    debug_assert!(!self.falsifies(learnt[0]));
                    self.enqueue(learnt[0], CRef::NULL);
                } else {
                    let cr = self.factory.alloc(&learnt, true);
                    self.learnts.push(cr);
                    self.attach_watchers(cr);
                    self.enqueue(learnt[0], cr);
                }
                learnt.clear();
            } else {
                if let Some(a) = pending.take() {
                    go &= cb.on_decision(self.current_level(), a, &self.model, self.model_size);
                    if !go {
                        continue;
                    }
                }
                let top = self.order.top();
                match top {
                    None => {
                        nogood.clear();
                        if cb.on_solution(&self.model, self.model_size, &mut nogood) {
                            return Truth::Sat;
                        }
                        trace!("assignment rejected, nogood {:?}", nogood);
                        if nogood.is_empty() {
                            // rejected under the empty sub-assignment: no
                            // acceptable assignment exists
                            self.backtrack(ROOT_LEVEL);
                            return Truth::Unsat;
                        }
                        if self.propagate_with_learnt {
                            if !self.exclude_assignment(&nogood) {
                                return Truth::Unsat;
                            }
                        } else if self.nogood_at_root(&nogood) {
                            self.backtrack(ROOT_LEVEL);
                            return Truth::Unsat;
                        } else {
                            // the exclusion would not propagate without
                            // learnt clauses; stop
                            go = false;
                        }
                    }
                    Some(f) => {
                        let n = self.candidate_name(f);
                        if n.null() {
                            return Truth::Unsat;
                        }
                        self.new_level();
                        let a = Lit::eq(f, n);
                        trace!("decide {:?} at {}", a, self.current_level());
                        self.enqueue(a, CRef::NULL);
                        pending = Some(a);
                    }
                }
            }
        }
        self.backtrack(ROOT_LEVEL);
        Truth::Unknown
    }

    // ---------- assignment ----------

    fn satisfies(&self, a: Lit) -> bool {
        let (p, f, n) = (a.pos(), a.fun(), a.name());
        let m = self.model[f];
        (p && m == n) || (!p && ((!m.null() && m != n) || self.data[f][n].model_neq()))
    }

    fn falsifies(&self, a: Lit) -> bool {
        let (p, f, n) = (a.pos(), a.fun(), a.name());
        let m = self.model[f];
        (!p && m == n) || (p && ((!m.null() && m != n) || self.data[f][n].model_neq()))
    }

    /// Level of the trail assignment that falsifies `a`.
    fn level_of_complementary(&self, a: Lit) -> Level {
        debug_assert!(self.falsifies(a));
        let (f, n) = (a.fun(), a.name());
        if a.pos() && self.data[f][n].model_neq() {
            self.data[f][n].level()
        } else {
            self.data[f][self.model[f]].level()
        }
    }

    /// Level of the trail assignment that satisfies `a`.
    fn level_of(&self, a: Lit) -> Level {
        debug_assert!(self.satisfies(a));
        let (f, n) = (a.fun(), a.name());
        if !a.pos() && self.data[f][n].model_neq() {
            self.data[f][n].level()
        } else {
            self.data[f][self.model[f]].level()
        }
    }

    /// Reason of the trail assignment that satisfies `a`.
    fn reason_of(&self, a: Lit) -> CRef {
        debug_assert!(self.satisfies(a));
        let (f, n) = (a.fun(), a.name());
        if !a.pos() && self.data[f][n].model_neq() {
            self.data[f][n].reason
        } else {
            self.data[f][self.model[f]].reason
        }
    }

    fn new_level(&mut self) {
        self.level_size.push(self.trail.len());
    }

    /// Put `a` on the trail. No-op if `a` is already satisfied, or if `a`
    /// is a positive literal whose pair is excluded. A positive assignment
    /// fixes the model value and retires the function from the decision
    /// order; a negative one shrinks the domain and, when a single
    /// candidate remains, asserts it immediately with a domain reason.
    fn enqueue(&mut self, a: Lit, reason: CRef) {
        let (p, f, n) = (a.pos(), a.fun(), a.name());
        debug_assert!(self.data[f][n].occurs());
        if !self.model[f].null() || self.data[f][n].model_neq() {
            debug_assert!(self.satisfies(a) || (p && self.data[f][n].model_neq()));
            return;
        }
        let level = self.current_level();
        self.trail.push(a);
        self.data[f][n].update(!p, level, reason);
        if p {
            self.model[f] = n;
            self.model_size += 1;
            self.order_remove(f);
        } else {
            self.domain_size[f] -= 1;
            if self.domain_size[f] == 1 {
                let n2 = self.candidate_name(f);
                debug_assert!(!n2.null());
                trace!("domain propagation {:?} = {:?}", f, n2);
                self.trail.push(Lit::eq(f, n2));
                self.data[f][n2].update(false, level, CRef::DOMAIN);
                self.model[f] = n2;
                self.model_size += 1;
                self.order_remove(f);
            } else {
                self.bump_to_front(f);
            }
        }
        debug_assert!(self.satisfies(a));
    }

    /// Undo every assignment above level `l`.
    fn backtrack(&mut self, l: Level) {
        if l >= self.current_level() {
            self.trail_head = self.trail.len();
            return;
        }
        let start = self.level_size[l];
        self.undo_trail_from(start);
        self.level_size.truncate(l);
    }

    fn undo_trail_from(&mut self, start: usize) {
        for i in start..self.trail.len() {
            let a = self.trail[i];
            let (p, f, n) = (a.pos(), a.fun(), a.name());
            self.model[f] = Name::NULL;
            if p {
                self.model_size -= 1;
                if !self.data[f][n].model_neq() {
                    self.data[f][n].reset();
                }
                let mut order = self.order.promote(ActivityCompare {
                    activity: &self.activity,
                });
                if !order.contains(f) {
                    order.insert(f);
                }
            } else {
                self.data[f][n].reset();
                self.domain_size[f] += 1;
            }
        }
        self.trail.truncate(start);
        self.trail_head = self.trail.len();
    }

    /// The next candidate value for `f`: scan its sort's names backwards
    /// from the cached cursor, wrapping once, for a name that occurs and
    /// is not excluded.
    fn candidate_name(&mut self, f: Fun) -> Name {
        debug_assert!(self.model[f].null());
        let s = self.sorts[f];
        let size = self.names[s].upper_bound();
        let offset = self.name_index[f].min(size.saturating_sub(1));
        for i in (0..=offset).rev() {
            let n = self.names[s].at(i);
            if !n.null() && self.data[f][n].occurs() && !self.data[f][n].model_neq() {
                self.name_index[f] = i;
                return n;
            }
        }
        for i in (offset + 1..size).rev() {
            let n = self.names[s].at(i);
            if !n.null() && self.data[f][n].occurs() && !self.data[f][n].model_neq() {
                self.name_index[f] = i;
                return n;
            }
        }
        Name::NULL
    }

    // ---------- activity ----------

    fn order_remove(&mut self, f: Fun) {
        let mut order = self.order.promote(ActivityCompare {
            activity: &self.activity,
        });
        if order.contains(f) {
            order.remove(f);
        }
    }

    /// Increase `f`'s activity by the current bump step, rescaling all
    /// scores when they grow too large.
    fn bump(&mut self, f: Fun) {
        self.activity[f] += self.bump_step;
        if self.activity[f] > 1e100 {
            for (_, x) in self.activity.iter_mut() {
                *x *= 1e-100;
            }
            self.bump_step *= 1e-100;
        }
        let mut order = self.order.promote(ActivityCompare {
            activity: &self.activity,
        });
        if order.contains(f) {
            order.increase(f);
        }
    }

    /// Raise `f` to the highest current activity, then bump it.
    fn bump_to_front(&mut self, f: Fun) {
        let max = self
            .activity
            .iter()
            .fold(0.0_f64, |acc, (_, &x)| if x > acc { x } else { acc });
        if self.activity[f] < max {
            self.activity[f] = max;
        }
        self.bump(f);
    }

    // ---------- propagation ----------

    fn attach_watchers(&mut self, cr: CRef) {
        debug_assert!(self.factory.size(cr) >= 2);
        let f0 = self.factory[cr][0].fun();
        let f1 = self.factory[cr][1].fun();
        self.watchers[f0].push(cr);
        if f0 != f1 {
            self.watchers[f1].push(cr);
        }
    }

    fn remove_watchers(&mut self, cr: CRef) {
        debug_assert!(self.factory.size(cr) >= 2);
        let f0 = self.factory[cr][0].fun();
        let f1 = self.factory[cr][1].fun();
        self.watchers[f0].retain(|&mut x| x != cr);
        if f0 != f1 {
            self.watchers[f1].retain(|&mut x| x != cr);
        }
    }

    /// Exhaust the propagation queue; returns the conflicting clause, if
    /// any.
    fn propagate(&mut self) -> Option<CRef> {
        let mut conflict = None;
        while conflict.is_none() && self.trail_head < self.trail.len() {
            let a = self.trail[self.trail_head];
            self.trail_head += 1;
            conflict = self.propagate_lit(a);
        }
        conflict
    }

    /// Walk the watchers of `a`'s function. For each watched clause the
    /// two-bit state `w` records which watched positions are falsified
    /// (bit 0 for position 0, bit 1 for position 1); non-falsified
    /// replacements from the tail are swapped into the watched positions
    /// and the watcher moves with them.
    fn propagate_lit(&mut self, a: Lit) -> Option<CRef> {
        let f = a.fun();
        let mut conflict = None;
        let mut ws = mem::take(&mut self.watchers[f]);
        let mut i = 0;
        let mut j = 0;
        while i < ws.len() {
            let cr = ws[i];
            if self.factory.size(cr) == 0 {
                // watcher of a freed clause
                i += 1;
                continue;
            }
            if self.factory.learnt(cr) && !self.propagate_with_learnt {
                ws[j] = ws[i];
                j += 1;
                i += 1;
                continue;
            }
            let f0 = self.factory[cr][0].fun();
            let f1 = self.factory[cr][1].fun();
            if f0 != f && f1 != f {
                // watcher moved away earlier
                i += 1;
                continue;
            }
            let c0 = self.factory[cr][0];
            let c1 = self.factory[cr][1];
            let mut w = (self.falsifies(c1) as u8) << 1 | self.falsifies(c0) as u8;
            if w == 0 || self.satisfies(c0) || self.satisfies(c1) {
                ws[j] = ws[i];
                j += 1;
                i += 1;
                continue;
            }
            // find new watched literals if necessary
            let size = self.factory.size(cr);
            let mut k = 2;
            while w != 0 && k < size {
                let ck = self.factory[cr][k];
                if !self.falsifies(ck) {
                    let l = (w >> 1) as usize;
                    debug_assert!(self.falsifies(self.factory[cr][l]));
                    let fk = ck.fun();
                    if fk != f0 && fk != f1 && fk != self.factory[cr][1 - l].fun() {
                        self.watchers[fk].push(cr);
                    }
                    self.factory[cr].swap(l, k);
                    w = (w - 1) >> 1; // 11 -> 01, 10 -> 00, 01 -> 00
                }
                k += 1;
            }
            let moved = {
                let c = &self.factory[cr];
                c[0].fun() != f && c[1].fun() != f
            };
            if w == 3 {
                // all watched and all remaining literals falsified
                debug_assert!(!moved);
                ws[j] = cr;
                j += 1;
                i += 1;
                while i < ws.len() {
                    ws[j] = ws[i];
                    j += 1;
                    i += 1;
                }
                self.trail_head = self.trail.len();
                conflict = Some(cr);
            } else if w != 0 {
                let l = (w >> 1) as usize;
                let b = self.factory[cr][1 - l];
                debug_assert!(!self.falsifies(b));
                self.enqueue(b, cr);
                if !moved {
                    ws[j] = cr;
                    j += 1;
                }
                i += 1;
            } else {
                if !moved {
                    ws[j] = cr;
                    j += 1;
                }
                i += 1;
            }
        }
        ws.truncate(j);
        debug_assert!(self.watchers[f].is_empty());
        self.watchers[f] = ws;
        conflict
    }

    // ---------- conflict analysis ----------

    /// `see_subsuming(a)` marks the single pair slot that identifies every
    /// literal subsumed by `a` as seen. For `f = n` that is `(f, n)`; for
    /// `f != n` the slot `(f, n)` doubles for every `f = n'` with
    /// `n' != n`, because the trail can only falsify those through
    /// `model[f] = n`.
    fn see_subsuming(&mut self, a: Lit) {
        debug_assert!(self.falsifies(a));
        self.data[a.fun()][a.name()].set_seen_subsumed(true);
    }

    /// Dual of [`see_subsuming`](Solver::see_subsuming).
    fn seen_subsumed(&self, a: Lit) -> bool {
        debug_assert!(self.falsifies(a));
        let (f, n) = (a.fun(), a.name());
        let m = self.model[f];
        self.data[f][n].seen_subsumed()
            || (a.pos() && !m.null() && self.data[f][m].seen_subsumed())
    }

    /// Mark the one trail literal on level `l` complementary to `a` as
    /// wanted. Only a single slot is marked, so un-marking while walking
    /// the trail needs no rescan.
    fn want_complementary_on_level(&mut self, a: Lit, l: Level) {
        debug_assert!(self.falsifies(a));
        let (f, n) = (a.fun(), a.name());
        if !a.pos() {
            debug_assert_eq!(self.model[f], n);
            debug_assert_eq!(self.data[f][n].level(), l);
            self.data[f][n].set_wanted(true);
        } else if self.data[f][n].level() == l && self.data[f][n].model_neq() {
            self.data[f][n].set_wanted(true);
        } else {
            let m = self.model[f];
            debug_assert!(!m.null());
            debug_assert_eq!(self.data[f][m].level(), l);
            self.data[f][m].set_wanted(true);
        }
    }

    fn wanted_complementary_on_level(&self, a: Lit, l: Level) -> bool {
        debug_assert!(self.falsifies(a));
        let (f, n) = (a.fun(), a.name());
        let m = self.model[f];
        if !a.pos() {
            self.data[f][n].wanted()
        } else {
            (self.data[f][n].level() == l && self.data[f][n].wanted())
                || (!m.null() && self.data[f][m].wanted())
        }
    }

    fn is_wanted(&self, a: Lit) -> bool {
        debug_assert!(self.satisfies(a));
        self.data[a.fun()][a.name()].wanted()
    }

    fn analyze_handle(&mut self, a: Lit, trail_a: Lit, learnt: &mut Vec<Lit>, depth: &mut u32) {
        if a == trail_a {
            return;
        }
        debug_assert!(self.falsifies(a));
        let l = self.level_of_complementary(a);
        debug_assert!(l <= self.current_level());
        if l == ROOT_LEVEL || self.seen_subsumed(a) || self.wanted_complementary_on_level(a, l) {
            return;
        }
        if l < self.current_level() {
            learnt.push(a);
            self.see_subsuming(a);
        } else {
            *depth += 1;
            self.want_complementary_on_level(a, l);
        }
        self.bump(a.fun());
    }

    /// First-UIP conflict analysis. `learnt[0]` receives the flipped UIP;
    /// the returned level is the backjump target, and the literal defining
    /// it sits in `learnt[1]`.
    fn analyze(&mut self, mut conflict: CRef, learnt: &mut Vec<Lit>) -> Level {
        debug_assert!(conflict != CRef::NULL);
        let mut depth: u32 = 0;
        let mut trail_a = Lit::NULL;
        let mut trail_i = self.trail.len();
        learnt.clear();
        learnt.push(Lit::NULL); // room for the UIP
        loop {
            if conflict == CRef::DOMAIN {
                // the implicit clause: f takes one of its occurring names
                debug_assert!(!trail_a.null() && trail_a.pos());
                let f = trail_a.fun();
                let s = self.sorts[f];
                for idx in 0..self.names[s].upper_bound() {
                    let n = self.names[s].at(idx);
                    if !n.null() && self.data[f][n].occurs() {
                        self.analyze_handle(Lit::eq(f, n), trail_a, learnt, &mut depth);
                    }
                }
            } else {
                for idx in 0..self.factory.size(conflict) {
                    let a = self.factory[conflict][idx];
                    self.analyze_handle(a, trail_a, learnt, &mut depth);
                }
            }
            debug_assert!(depth > 0);
            loop {
                trail_i -= 1;
                if self.is_wanted(self.trail[trail_i]) {
                    break;
                }
            }
            trail_a = self.trail[trail_i];
            self.data[trail_a.fun()][trail_a.name()].set_wanted(false);
            depth -= 1;
            if depth == 0 {
                break;
            }
            conflict = self.reason_of(trail_a);
        }
        learnt[0] = trail_a.flip();

        for &a in learnt.iter() {
            self.data[a.fun()][a.name()].set_seen_subsumed(false);
        }

        clause::normalize_learnt(learnt);

        let btlevel = if learnt.len() == 1 {
            ROOT_LEVEL
        } else {
            let mut max_i = 1;
            let mut btlevel = self.level_of_complementary(learnt[1]);
            for i in 2..learnt.len() {
                let l = self.level_of_complementary(learnt[i]);
                if btlevel < l {
                    max_i = i;
                    btlevel = l;
                }
            }
            learnt.swap(1, max_i);
            btlevel
        };
        debug_assert!(btlevel < self.current_level() && btlevel >= ROOT_LEVEL);
        debug_assert!(learnt.iter().all(|&a| self.falsifies(a)));
        btlevel
    }

    /// True iff every literal of the nogood holds at the root level, so
    /// that its exclusion could never be lifted by backtracking.
    fn nogood_at_root(&self, nogood: &[Lit]) -> bool {
        nogood.iter().all(|&a| self.level_of(a) == ROOT_LEVEL)
    }

    /// Learn the complement of a set of currently satisfied literals after
    /// a rejected total assignment, backtrack far enough for the new
    /// clause to bite, and let the search continue. Returns false when the
    /// exclusion empties the search space.
    fn exclude_assignment(&mut self, nogood: &[Lit]) -> bool {
        debug_assert!(nogood.iter().all(|&a| self.satisfies(a)));
        let mut c: Vec<Lit> = nogood.iter().map(|&a| a.flip()).collect();
        clause::normalize_learnt(&mut c);
        if c.is_empty() {
            self.backtrack(ROOT_LEVEL);
            return false;
        }
        let mut lmax = ROOT_LEVEL;
        for &a in &c {
            let l = self.level_of_complementary(a);
            if l > lmax {
                lmax = l;
            }
        }
        if lmax == ROOT_LEVEL {
            self.backtrack(ROOT_LEVEL);
            return false;
        }
        if c.len() == 1 {
            // assert the exclusion as a fact of this run
            self.backtrack(ROOT_LEVEL);
            self.enqueue(c[0], CRef::NULL);
            return true;
        }
        self.backtrack(lmax - 1);
        // the two watched positions must not be falsified
        let mut front = 0;
        for i in 0..c.len() {
            if !self.falsifies(c[i]) {
                c.swap(front, i);
                front += 1;
            }
        }
        debug_assert!(front >= 1);
        let cr = self.factory.alloc(&c, true);
        self.learnts.push(cr);
        if front == 1 {
            // unit under the restored trail
            let unit = self.factory[cr][0];
            self.attach_watchers(cr);
            self.enqueue(unit, cr);
        } else {
            self.attach_watchers(cr);
        }
        true
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
    fn eq(fi: u32, ni: u32) -> Lit {
        Lit::eq(f(fi), n(ni))
    }
    fn neq(fi: u32, ni: u32) -> Lit {
        Lit::neq(f(fi), n(ni))
    }

    /// Single-sorted vocabulary reserving name 100 as the fresh name.
    struct TestVocab;
    impl Vocab for TestVocab {
        fn sort_of(&self, _f: Fun) -> Sort {
            Sort::from_id(1)
        }
        fn extra_name(&mut self, _s: Sort) -> Name {
            Name::from_id(100)
        }
    }

    fn solver(clauses: &[&[Lit]]) -> Solver {
        let mut sat = Solver::new();
        for c in clauses {
            sat.add_clause(c, &mut TestVocab);
        }
        sat
    }

    struct Noop;
    impl Callbacks for Noop {}

    /// Accepts any total assignment satisfying `want`, rejects the rest
    /// with the obvious nogood.
    struct Require(Lit);
    impl Callbacks for Require {
        fn on_solution(
            &mut self,
            model: &TermMap<Fun, Name>,
            _model_size: usize,
            nogood: &mut Vec<Lit>,
        ) -> bool {
            let f = self.0.fun();
            let m = model[f];
            let ok = (m == self.0.name()) == self.0.pos();
            if !ok {
                nogood.push(Lit::eq(f, m));
            }
            ok
        }
    }

    #[test]
    fn test_data_is_packed() {
        use std::mem;
        assert_eq!(mem::size_of::<Data>(), 8);
    }

    #[test]
    fn test_unit_propagation() {
        // (f1 = a | g2 = c), f1 != a  ~~>  g2 = c, f1 = extra
        let mut sat = solver(&[&[eq(1, 1), eq(2, 3)], &[neq(1, 1)]]);
        sat.init();
        assert!(!sat.is_unsat());
        assert_eq!(sat.solve(&mut Noop), Truth::Sat);
        assert_eq!(sat.model()[f(2)], n(3));
        assert_eq!(sat.model()[f(1)], n(100)); // domain propagation onto the extra name
    }

    #[test]
    fn test_trail_consistency() {
        let mut sat = solver(&[&[eq(1, 1), eq(1, 2), eq(1, 3)], &[neq(1, 1)]]);
        sat.init();
        // f1 != a shrinks the domain: a, b, c, extra minus a
        assert_eq!(sat.domain_size[f(1)], 3);
        assert!(sat.data[f(1)][n(1)].model_neq());
        assert!(sat.model[f(1)].null());
        assert_eq!(sat.solve(&mut Noop), Truth::Sat);
        assert!(!sat.model()[f(1)].null());
    }

    #[test]
    fn test_complementary_units_unsat() {
        let mut sat = solver(&[&[eq(1, 1)], &[eq(1, 2)]]);
        sat.init();
        assert!(sat.is_unsat());
        assert_eq!(sat.solve(&mut Noop), Truth::Unsat);
    }

    #[test]
    fn test_conflict_learns_and_recovers() {
        // f1 must avoid a; both clauses force f1 = a once g2 = c fails
        let mut sat = solver(&[
            &[eq(1, 1), eq(2, 3)],
            &[eq(1, 1), neq(2, 3)],
            &[neq(1, 1), eq(2, 3)],
        ]);
        sat.init();
        assert_eq!(sat.solve(&mut Noop), Truth::Sat);
        // all three clauses hold under the final model
        assert_eq!(sat.model()[f(1)], n(1));
        assert_eq!(sat.model()[f(2)], n(3));
    }

    #[test]
    fn test_watcher_invariant_after_propagate() {
        let mut sat = solver(&[
            &[eq(1, 1), eq(2, 1), eq(3, 1)],
            &[neq(1, 1), eq(2, 2), eq(3, 2)],
        ]);
        sat.init();
        assert!(sat.propagate().is_none());
        for &cr in &sat.clauses {
            let c0 = sat.factory[cr][0];
            let c1 = sat.factory[cr][1];
            let satisfied = (0..sat.factory.size(cr)).any(|k| sat.satisfies(sat.factory[cr][k]));
            assert!(satisfied || (!sat.falsifies(c0) && !sat.falsifies(c1)));
        }
    }

    #[test]
    fn test_learnt_falsified_at_learning_time() {
        struct Check;
        impl Callbacks for Check {
            fn on_conflict(&mut self, _level: Level, learnt: &[Lit], btlevel: Level) -> bool {
                assert!(!learnt.is_empty());
                assert!(btlevel >= ROOT_LEVEL);
                true
            }
        }
        let mut sat = solver(&[
            &[eq(1, 1), eq(2, 1)],
            &[eq(1, 1), neq(2, 1)],
            &[neq(1, 1), eq(3, 1), eq(2, 2)],
        ]);
        sat.init();
        assert_eq!(sat.solve(&mut Check), Truth::Sat);
    }

    #[test]
    fn test_solution_rejection_searches_on() {
        // f1 in {a, b}; reject every assignment until f1 = a
        let mut sat = solver(&[&[eq(1, 1), eq(1, 2)]]);
        sat.init();
        let mut cb = Require(eq(1, 1));
        assert_eq!(sat.solve(&mut cb), Truth::Sat);
        assert_eq!(sat.model()[f(1)], n(1));
    }

    #[test]
    fn test_solution_rejection_unsat_when_forced() {
        // f1 = a is forced at root; requiring f1 = b must fail
        let mut sat = solver(&[&[eq(1, 1)]]);
        sat.init();
        let mut cb = Require(eq(1, 2));
        assert_eq!(sat.solve(&mut cb), Truth::Unsat);
    }

    #[test]
    fn test_solution_rejection_empty_nogood_unsat() {
        struct RejectAll;
        impl Callbacks for RejectAll {
            fn on_solution(
                &mut self,
                _model: &TermMap<Fun, Name>,
                _model_size: usize,
                _nogood: &mut Vec<Lit>,
            ) -> bool {
                false
            }
        }
        // satisfiable, but every assignment is rejected without a literal
        // to exclude: the run is refuted outright
        let mut sat = solver(&[&[eq(1, 1), eq(1, 2)]]);
        sat.init();
        assert_eq!(sat.solve(&mut RejectAll), Truth::Unsat);
        assert_eq!(sat.current_level(), ROOT_LEVEL);
    }

    #[test]
    fn test_solution_rejection_at_root_without_learnt_propagation() {
        // the nogood holds at root, so the rejection is final even though
        // no learnt exclusion could propagate
        let mut sat = solver(&[&[eq(1, 1)]]);
        sat.init();
        sat.set_propagate_with_learnt(false);
        let mut cb = Require(eq(1, 2));
        assert_eq!(sat.solve(&mut cb), Truth::Unsat);
        assert_eq!(sat.current_level(), ROOT_LEVEL);
    }

    #[test]
    fn test_conflict_callback_aborts() {
        struct Abort;
        impl Callbacks for Abort {
            fn on_conflict(&mut self, _l: Level, _c: &[Lit], _b: Level) -> bool {
                false
            }
        }
        let mut sat = solver(&[
            &[eq(1, 1), eq(2, 1)],
            &[eq(1, 1), neq(2, 1)],
            &[neq(1, 1), eq(2, 1)],
            &[neq(1, 1), neq(2, 1)],
        ]);
        sat.init();
        let r = sat.solve(&mut Abort);
        // aborted or refuted, but always back at root
        assert!(r == Truth::Unknown || r == Truth::Unsat);
        assert_eq!(sat.current_level(), ROOT_LEVEL);
    }

    #[test]
    fn test_reset_drops_learnts_keeps_problem() {
        let mut sat = solver(&[
            &[eq(1, 1), eq(2, 1)],
            &[eq(1, 1), neq(2, 1)],
            &[neq(1, 1), eq(2, 1)],
        ]);
        sat.init();
        assert_eq!(sat.solve(&mut Noop), Truth::Sat);
        sat.reset(false, |_| 0.0);
        assert!(sat.learnts.is_empty());
        assert_eq!(sat.solve(&mut Noop), Truth::Sat);
        assert_eq!(sat.model()[f(1)], n(1));
    }

    #[test]
    fn test_activity_seed_biases_first_decision() {
        let mut sat = solver(&[&[eq(1, 1), eq(1, 2)], &[eq(2, 1), eq(2, 2)]]);
        sat.init();
        sat.reset(false, |g| if g == f(2) { 1000.0 } else { 0.0 });
        struct FirstDecision(Option<Lit>);
        impl Callbacks for FirstDecision {
            fn on_decision(
                &mut self,
                _l: Level,
                a: Lit,
                _m: &TermMap<Fun, Name>,
                _s: usize,
            ) -> bool {
                if self.0.is_none() {
                    self.0 = Some(a);
                }
                true
            }
        }
        let mut cb = FirstDecision(None);
        assert_eq!(sat.solve(&mut cb), Truth::Sat);
        assert_eq!(cb.0.unwrap().fun(), f(2));
    }
}
