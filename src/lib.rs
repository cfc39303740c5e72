/*****************************************************************************************[lib.rs]
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

//! A CDCL-style satisfiability core for a multi-valued language in which
//! every atom equates a function symbol with a standard name, together with
//! a driver that decides limited-belief entailment by searching for a
//! covering family of partial models.
//!
//! The crate splits into a handful of layers, leaves first:
//!
//! - [`lit`]: interned `Sort`/`Fun`/`Name` handles and the packed [`Lit`]
//!   with its constant-time subsumption algebra;
//! - [`dense`]: array-backed maps, sets and the index-tracked heap used for
//!   the decision order;
//! - [`clause`]: clause normalisation and the pool [`Factory`];
//! - [`solver`]: the two-watched-literal CDCL core with domain propagation
//!   over the "exactly one name per function" constraint;
//! - [`limsat`]: the [`LimSat`] driver that repeatedly invokes the core to
//!   cover every size-`k` subset of functions with a query-falsifying model;
//! - [`formula`]: the [`Query`] contract and a quantifier-free [`Formula`]
//!   evaluator that reports satisfaction under partial models.

//======== LOG ============

// stubs when logging is not enabled
#[cfg(not(feature = "logging"))]
#[macro_use]
pub(crate) mod log {
    macro_rules! trace {
        ($( $x:expr ),*) => {};
    }
    macro_rules! debug {
        ($( $x:expr ),*) => {};
    }
    macro_rules! info {
        ($( $x:expr ),*) => {};
    }
}

#[cfg(feature = "logging")]
#[macro_use]
pub extern crate log;

//======== PUBLIC INTERFACE ============

pub mod clause;
pub mod dense;
pub mod formula;
pub mod limsat;
pub mod lit;
pub mod solver;

pub use crate::{
    clause::{CRef, Factory},
    dense::{DenseSet, TermMap, TermMapBool},
    formula::{Formula, Query},
    limsat::{LimSat, LimSatOpts, OneSort, Sorts},
    lit::{Fun, Lit, Name, Sort},
    solver::{Callbacks, Solver, Truth, Vocab},
};
