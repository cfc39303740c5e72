/*****************************************************************************************[limsat.rs]
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

//! Limited-belief satisfiability driver.
//!
//! [`LimSat`] owns the master clause set and a reusable [`Solver`]. A
//! query is entailed at split level `k` iff there is **no** covering
//! family of models that, for every size-`k` subset of the functions at
//! play, contains or admits a model assigning all of them while not
//! satisfying the query. The driver searches for exactly such a family;
//! [`LimSat::solve`] negates the outcome.

use {
    crate::dense::{DenseSet, TermMap, TermMapBool},
    crate::formula::Query,
    crate::lit::{Fun, Lit, Name, Sort},
    crate::solver::{Callbacks, Level, Solver, Truth, Vocab},
    std::collections::BTreeSet,
};

/// Assigns a sort to every function symbol; supplied by the embedding.
pub trait Sorts {
    fn sort_of(&self, f: Fun) -> Sort;
}

/// The single-sorted embedding.
#[derive(Debug, Default, Clone, Copy)]
pub struct OneSort;

impl Sorts for OneSort {
    fn sort_of(&self, _f: Fun) -> Sort {
        Sort::from_id(1)
    }
}

/// Driver options.
#[derive(Debug, Clone, Copy)]
pub struct LimSatOpts {
    /// Conflict budget of each individual SAT run.
    pub max_conflicts: u32,
    /// Activity seed for the functions a run is asked to assign.
    pub activity_offset: f64,
}

impl Default for LimSatOpts {
    fn default() -> Self {
        Self {
            max_conflicts: 50,
            activity_offset: 1000.0,
        }
    }
}

impl LimSatOpts {
    /// Check that options are valid.
    pub fn check(&self) -> bool {
        self.max_conflicts >= 1 && self.activity_offset > 0.0
    }
}

/// The limited-belief driver. See the module documentation.
pub struct LimSat<S: Sorts> {
    sorts: S,
    opts: LimSatOpts,

    /// Master clause set, deduplicated, plus the insertion-ordered view
    /// from which the solver is (re)loaded.
    clauses: BTreeSet<Vec<Lit>>,
    clauses_vec: Vec<Vec<Lit>>,

    /// `domains[f][n]` iff the pair occurs in a clause or a query.
    domains: TermMap<Fun, TermMapBool<Name>>,
    sorts_seen: DenseSet<Sort>,
    max_name_id: u32,
    /// Reserved fresh names, one per sort, allocated above every name ever
    /// seen once the first solve runs and stable from then on.
    extra: TermMap<Sort, Name>,
    extra_frozen: bool,
    next_extra_id: u32,

    sat: Solver,
    sat_init_index: usize,
}

impl<S: Sorts> LimSat<S> {
    pub fn new(sorts: S) -> Self {
        Self::with_opts(sorts, LimSatOpts::default())
    }

    pub fn with_opts(sorts: S, opts: LimSatOpts) -> Self {
        assert!(opts.check());
        Self {
            sorts,
            opts,
            clauses: BTreeSet::new(),
            clauses_vec: Vec::new(),
            domains: TermMap::new(),
            sorts_seen: DenseSet::new(),
            max_name_id: 0,
            extra: TermMap::new(),
            extra_frozen: false,
            next_extra_id: 0,
            sat: Solver::new(),
            sat_init_index: 0,
        }
    }

    /// Insert a clause into the master set. Returns true iff it was new.
    pub fn add_clause(&mut self, lits: &[Lit]) -> bool {
        let mut c = lits.to_vec();
        c.sort_unstable();
        if self.clauses.contains(&c) {
            return false;
        }
        debug!("add clause {:?}", c);
        for &a in &c {
            self.note_pair(a.fun(), a.name());
        }
        self.clauses.insert(c.clone());
        self.clauses_vec.push(c);
        true
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// Decide whether `query` is entailed at split level `k`.
    pub fn solve<Q: Query>(&mut self, k: usize, query: &Q) -> bool {
        !self.find_models(k, query)
    }

    // ---------- vocabulary ----------

    fn note_pair(&mut self, f: Fun, n: Name) {
        self.domains.capacitate(f);
        self.domains[f].capacitate(n);
        if self.domains[f].get(n) {
            return;
        }
        self.domains[f].set(n, true);
        if n.id() > self.max_name_id {
            self.max_name_id = n.id();
        }
        let s = self.sorts.sort_of(f);
        self.note_sort(s);
        if !self.sat.registered(f, n) {
            self.sat.register(s, f, n);
        }
    }

    fn note_sort(&mut self, s: Sort) {
        if self.sorts_seen.contains(s) {
            return;
        }
        self.sorts_seen.insert(s);
        if self.extra_frozen {
            self.assign_extra(s);
        }
    }

    fn assign_extra(&mut self, s: Sort) {
        self.extra.capacitate(s);
        if !self.extra[s].null() {
            return;
        }
        // names seen after the freeze may have overtaken the counter
        if self.next_extra_id <= self.max_name_id {
            self.next_extra_id = self.max_name_id + 1;
        }
        let n = Name::from_id(self.next_extra_id);
        self.next_extra_id += 1;
        self.extra[s] = n;
        self.sat.register_extra_name(s, n);
    }

    /// Register the pairs a query mentions, so the core can split on them.
    fn update_domains_for_query<Q: Query>(&mut self, query: &Q) {
        let mut pairs = Vec::new();
        query.for_each_atom(&mut |f, n| pairs.push((f, n)));
        for (f, n) in pairs {
            self.note_pair(f, n);
        }
    }

    /// Reserve the extra names (first run only), reseed the solver, and
    /// feed it the clauses it has not seen yet.
    fn init_sat(&mut self, wanted: &TermMapBool<Fun>) {
        if !self.extra_frozen {
            self.extra_frozen = true;
            self.next_extra_id = self.max_name_id + 1;
            let sorts: Vec<Sort> = self.sorts_seen.iter().collect();
            for s in sorts {
                self.assign_extra(s);
            }
        }
        let offset = self.opts.activity_offset;
        self.sat
            .reset(false, |f| if wanted.get(f) { offset } else { 0.0 });
        while self.sat_init_index < self.clauses_vec.len() {
            let c = self.clauses_vec[self.sat_init_index].clone();
            let mut vocab = DriverVocab {
                sorts: &self.sorts,
                extra: &self.extra,
            };
            self.sat.add_clause(&c, &mut vocab);
            self.sat_init_index += 1;
        }
        self.sat.init();
    }

    // ---------- model search ----------

    fn find_models<Q: Query>(&mut self, k: usize, query: &Q) -> bool {
        self.update_domains_for_query(query);
        // Find models such that every function is assigned a value in some
        // model. A model assigning f1, ..., fm covers every size-k subset
        // of {f1, ..., fm}.
        let (models, newly_assigned_in) = match self.find_covering_models(k, query) {
            Some(fcm) => fcm,
            None => return false,
        };
        if k == 0 {
            return true;
        }
        // Now check the size-k sets that mix functions from different
        // covering models and are therefore not covered yet.
        let mut union: Vec<Fun> = newly_assigned_in.iter().flatten().cloned().collect();
        union.sort_unstable();
        union.dedup();
        for_each_k_subset(&union, k, |must| {
            if models.iter().any(|m| assigns_all_funs(m, must)) {
                return true;
            }
            let mut wanted = TermMapBool::new();
            for &f in must {
                wanted.insert(f);
            }
            self.find_model(k, query, false, true, &wanted).is_some()
        })
    }

    /// Iterate until every function wanted by some clause or the query is
    /// assigned in one of the returned models.
    #[allow(clippy::type_complexity)]
    fn find_covering_models<Q: Query>(
        &mut self,
        k: usize,
        query: &Q,
    ) -> Option<(Vec<TermMap<Fun, Name>>, Vec<Vec<Fun>>)> {
        let mut models: Vec<TermMap<Fun, Name>> = Vec::new();
        let mut newly_assigned_in: Vec<Vec<Fun>> = Vec::new();
        let mut wanted: TermMapBool<Fun> = TermMapBool::new();
        for (f, dm) in self.domains.iter() {
            if dm.any() {
                wanted.insert(f);
            }
        }
        let mut propagate_with_learnt = true;
        let mut wanted_is_must = false;
        loop {
            let fm = self.find_model(k, query, propagate_with_learnt, wanted_is_must, &wanted);
            let fm = match fm {
                None if propagate_with_learnt => {
                    // learnt propagation can bar partial models the
                    // semantics admits; retry without it
                    propagate_with_learnt = false;
                    continue;
                }
                None => return None,
                Some(fm) => fm,
            };
            if k == 0 {
                return Some((models, newly_assigned_in));
            }
            let (mut newly_assigned, all_assigned) = unwant_assigned(&fm, &mut wanted);
            if newly_assigned.is_empty() && !wanted_is_must {
                wanted_is_must = true;
                continue;
            }
            // drop earlier models whose contribution the new model covers
            let mut i = 0;
            while i < models.len() {
                if assigns_all_funs(&fm, &newly_assigned_in[i]) {
                    newly_assigned = merge(&newly_assigned, &newly_assigned_in[i]);
                    models.remove(i);
                    newly_assigned_in.remove(i);
                } else {
                    i += 1;
                }
            }
            models.push(fm);
            newly_assigned_in.push(newly_assigned);
            if all_assigned {
                return Some((models, newly_assigned_in));
            }
        }
    }

    /// One SAT run. Succeeds with a total model not satisfying the query,
    /// or with the largest intermediate model of size at least `k` that
    /// falsifies it (and assigns all of `wanted`, when `wanted_is_must`).
    fn find_model<Q: Query>(
        &mut self,
        k: usize,
        query: &Q,
        propagate_with_learnt: bool,
        wanted_is_must: bool,
        wanted: &TermMapBool<Fun>,
    ) -> Option<TermMap<Fun, Name>> {
        self.init_sat(wanted);
        self.sat.set_propagate_with_learnt(propagate_with_learnt);
        let mut cb = FindModelCb {
            query,
            k,
            wanted,
            wanted_is_must,
            max_conflicts: self.opts.max_conflicts,
            n_conflicts: 0,
            best: None,
        };
        let truth = self.sat.solve(&mut cb);
        debug!(
            "find_model: k={} learnt={} must={} -> {:?}",
            k, propagate_with_learnt, wanted_is_must, truth
        );
        if truth == Truth::Sat {
            return Some(self.sat.model().clone());
        }
        match cb.best {
            Some((size, model)) if size >= k => Some(model),
            _ => None,
        }
    }
}

/// The registration view the driver hands to [`Solver::add_clause`]: the
/// embedding's sort map plus the driver's reserved names, which are all
/// assigned before any clause reaches the solver.
struct DriverVocab<'a, S: Sorts> {
    sorts: &'a S,
    extra: &'a TermMap<Sort, Name>,
}

impl<'a, S: Sorts> Vocab for DriverVocab<'a, S> {
    fn sort_of(&self, f: Fun) -> Sort {
        self.sorts.sort_of(f)
    }

    fn extra_name(&mut self, s: Sort) -> Name {
        let n = self.extra[s];
        debug_assert!(!n.null());
        n
    }
}

/// Callbacks of one `find_model` run: conflict budget, best-snapshot
/// tracking, and the query check on total assignments.
struct FindModelCb<'a, Q: Query> {
    query: &'a Q,
    k: usize,
    wanted: &'a TermMapBool<Fun>,
    wanted_is_must: bool,
    max_conflicts: u32,
    n_conflicts: u32,
    best: Option<(usize, TermMap<Fun, Name>)>,
}

impl<'a, Q: Query> FindModelCb<'a, Q> {
    fn snapshot(&mut self, model: &TermMap<Fun, Name>, model_size: usize) {
        let best_size = self.best.as_ref().map_or(0, |&(s, _)| s);
        if self.k <= model_size
            && (self.best.is_none() || best_size < model_size)
            && (!self.wanted_is_must || assigns_all(model, self.wanted))
            && !self.query.satisfied_by(model, None)
        {
            self.best = Some((model_size, model.clone()));
        }
    }
}

impl<'a, Q: Query> Callbacks for FindModelCb<'a, Q> {
    fn on_conflict(&mut self, _level: Level, _learnt: &[Lit], _btlevel: Level) -> bool {
        self.n_conflicts += 1;
        self.n_conflicts <= self.max_conflicts
    }

    fn on_decision(
        &mut self,
        _level: Level,
        _a: Lit,
        model: &TermMap<Fun, Name>,
        model_size: usize,
    ) -> bool {
        self.snapshot(model, model_size);
        true
    }

    fn on_solution(
        &mut self,
        model: &TermMap<Fun, Name>,
        model_size: usize,
        nogood: &mut Vec<Lit>,
    ) -> bool {
        let sat = self.query.satisfied_by(model, Some(nogood));
        if !sat {
            self.snapshot(model, model_size);
        }
        // accept iff the total assignment does not satisfy the query
        !sat
    }
}

fn assigns(model: &TermMap<Fun, Name>, f: Fun) -> bool {
    model.get(f).map_or(false, |n| !n.null())
}

fn assigns_all(model: &TermMap<Fun, Name>, wanted: &TermMapBool<Fun>) -> bool {
    wanted.iter().all(|(f, w)| !w || assigns(model, f))
}

fn assigns_all_funs(model: &TermMap<Fun, Name>, funs: &[Fun]) -> bool {
    funs.iter().all(|&f| assigns(model, f))
}

/// Clear the wanted flag of every function the model assigns; returns the
/// newly assigned functions (in id order) and whether none remain wanted.
fn unwant_assigned(
    model: &TermMap<Fun, Name>,
    wanted: &mut TermMapBool<Fun>,
) -> (Vec<Fun>, bool) {
    let pending: Vec<Fun> = wanted
        .iter()
        .filter(|&(_, w)| w)
        .map(|(f, _)| f)
        .collect();
    let mut newly_assigned = Vec::new();
    let mut all_assigned = true;
    for f in pending {
        if assigns(model, f) {
            wanted.set(f, false);
            newly_assigned.push(f);
        } else {
            all_assigned = false;
        }
    }
    (newly_assigned, all_assigned)
}

/// Union of two sorted function lists.
fn merge(xs: &[Fun], ys: &[Fun]) -> Vec<Fun> {
    let mut zs = Vec::with_capacity(xs.len() + ys.len());
    let (mut i, mut j) = (0, 0);
    while i < xs.len() || j < ys.len() {
        if j == ys.len() || (i < xs.len() && xs[i] < ys[j]) {
            zs.push(xs[i]);
            i += 1;
        } else {
            if i < xs.len() && xs[i] == ys[j] {
                i += 1;
            }
            zs.push(ys[j]);
            j += 1;
        }
    }
    zs
}

/// Call `pred` on every size-`k` subset of `pool` (in lexicographic index
/// order); stops and returns false on the first failing subset.
fn for_each_k_subset(pool: &[Fun], k: usize, mut pred: impl FnMut(&[Fun]) -> bool) -> bool {
    if k == 0 || k > pool.len() {
        return true;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    let mut buf: Vec<Fun> = Vec::with_capacity(k);
    loop {
        buf.clear();
        buf.extend(idx.iter().map(|&i| pool[i]));
        if !pred(&buf) {
            return false;
        }
        // advance to the next combination
        let mut i = k;
        loop {
            if i == 0 {
                return true;
            }
            i -= 1;
            if idx[i] != i + pool.len() - k {
                break;
            }
        }
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn f(i: u32) -> Fun {
        Fun::from_id(i)
    }

    #[test]
    fn test_k_subsets() {
        let pool: Vec<Fun> = (1..=4).map(f).collect();
        let mut seen = Vec::new();
        assert!(for_each_k_subset(&pool, 2, |s| {
            seen.push((s[0].id(), s[1].id()));
            true
        }));
        assert_eq!(
            seen,
            vec![(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]
        );
        assert!(!for_each_k_subset(&pool, 3, |s| s[0].id() != 1));
        assert!(for_each_k_subset(&pool, 5, |_| false)); // nothing to check
    }

    #[test]
    fn test_merge_sorted_union() {
        let xs = vec![f(1), f(3), f(5)];
        let ys = vec![f(2), f(3), f(6)];
        assert_eq!(merge(&xs, &ys), vec![f(1), f(2), f(3), f(5), f(6)]);
        assert_eq!(merge(&[], &ys), ys);
        assert_eq!(merge(&xs, &[]), xs);
    }
}
