//! End-to-end scenarios for the limited-belief driver.

use limsat::{Formula, Fun, LimSat, Lit, Name, OneSort};

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

fn kb(clauses: &[&[Lit]]) -> LimSat<OneSort> {
    let mut l = LimSat::new(OneSort);
    for c in clauses {
        assert!(l.add_clause(c));
    }
    l
}

#[test]
fn forced_unit_is_believed_at_level_zero() {
    let mut l = kb(&[&[eq(1, 1)]]);
    let q = Formula::eq(f(1), n(1));
    assert!(l.solve(0, &q));
}

#[test]
fn unforced_disjunct_is_not_believed() {
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    let q = Formula::eq(f(1), n(1));
    // no splits: unit propagation derives nothing, so f1 = a is not forced
    assert!(!l.solve(0, &q));
    // one split on f1 admits the value b, which does not force the query
    assert!(!l.solve(1, &q));
}

#[test]
fn disjunction_of_candidates_is_believed() {
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    let q = Formula::or(vec![Formula::eq(f(1), n(1)), Formula::eq(f(1), n(2))]);
    // every way of splitting on f1 leaves a clause-satisfying value that
    // satisfies the query, except the fresh name, which falsifies the
    // clause itself
    assert!(l.solve(1, &q));
}

#[test]
fn inconsistent_kb_believes_everything() {
    let mut l = kb(&[&[eq(1, 1)], &[eq(1, 2)]]);
    assert!(l.solve(0, &Formula::top()));
    assert!(l.solve(0, &Formula::bottom()));
    assert!(l.solve(0, &Formula::eq(f(7), n(9))));
}

#[test]
fn tautology_is_always_believed() {
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    assert!(l.solve(0, &Formula::top()));
    assert!(l.solve(1, &Formula::top()));
}

#[test]
fn falsity_is_believed_only_when_inconsistent() {
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    assert!(!l.solve(0, &Formula::bottom()));
    let mut l = kb(&[&[eq(1, 1)], &[neq(1, 1)]]);
    assert!(l.solve(0, &Formula::bottom()));
}

#[test]
fn unit_propagation_chain_is_believed() {
    // f1 != a together with (f1 = a | g2 = c) forces g2 = c without splits
    let mut l = kb(&[&[eq(1, 1), eq(2, 3)], &[neq(1, 1)]]);
    let q = Formula::eq(f(2), n(3));
    assert!(l.solve(0, &q));
    // and f1 is pinned to the reserved fresh name, so f1 != a is forced too
    assert!(l.solve(0, &Formula::neq(f(1), n(1))));
}

#[test]
fn covering_family_over_three_functions() {
    // three functions, two candidate names each
    let mut l = kb(&[
        &[eq(1, 1), eq(1, 2)],
        &[eq(2, 1), eq(2, 2)],
        &[eq(3, 1), eq(3, 2)],
    ]);
    let q = Formula::and(vec![
        Formula::eq(f(1), n(1)),
        Formula::eq(f(2), n(1)),
        Formula::eq(f(3), n(1)),
    ]);
    // splitting any two functions leaves an assignment avoiding the value
    // a somewhere, so the conjunction is not forced
    assert!(!l.solve(2, &q));
    // but its negation-free weakening over one function is not forced
    // either, while the per-function disjunction is
    let one = Formula::or(vec![Formula::eq(f(1), n(1)), Formula::eq(f(1), n(2))]);
    assert!(l.solve(1, &one));
}

#[test]
fn covering_idempotence() {
    let mut l = kb(&[
        &[eq(1, 1), eq(1, 2)],
        &[eq(2, 1), eq(2, 2)],
        &[eq(1, 1), eq(2, 2)],
    ]);
    let q = Formula::eq(f(1), n(1));
    let first = l.solve(1, &q);
    let second = l.solve(1, &q);
    assert_eq!(first, second);
    let third = l.solve(2, &q);
    let fourth = l.solve(2, &q);
    assert_eq!(third, fourth);
}

#[test]
fn strengthening_the_kb_after_a_query() {
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    let q = Formula::eq(f(1), n(1));
    assert!(!l.solve(0, &q));
    // pinning f1 = a afterwards makes the query a unit-propagation fact
    assert!(l.add_clause(&[eq(1, 1)]));
    assert!(l.solve(0, &q));
    // re-adding is a no-op
    assert!(!l.add_clause(&[eq(1, 1)]));
    assert!(l.solve(0, &q));
}

#[test]
fn negative_clause_strengthening_flips_the_answer() {
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    let q = Formula::eq(f(1), n(2));
    assert!(!l.solve(0, &q));
    assert!(l.add_clause(&[neq(1, 1)]));
    // now f1 = b is forced by domain reasoning
    assert!(l.solve(0, &q));
}

#[test]
fn query_vocabulary_extends_domains() {
    // the query mentions a name the clauses never use; it must become a
    // candidate value for the split
    let mut l = kb(&[&[eq(1, 1), eq(1, 2)]]);
    let q = Formula::eq(f(1), n(9));
    assert!(!l.solve(0, &q));
    assert!(!l.solve(1, &q));
}
