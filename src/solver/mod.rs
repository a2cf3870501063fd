//! Solver adapter.
//!
//! Encodes compiled constraints as bounded integer problems and answers the
//! violation query: does some assignment within the declared estimates break
//! at least one constraint?
//!
//! | Answer   | Verdict  |
//! |----------|----------|
//! | unsat    | PASS     |
//! | sat      | REJECT   |
//! | gave up  | UNKNOWN  |
//!
//! The search is deterministic: the same constraints and bounds always give
//! the same answer and counterexample.

mod search;
mod session;
mod smtlib;

pub use session::{SolveOutcome, SolverConfig, SolverSession};
pub use smtlib::render as render_smtlib;

use crate::compiler::CompiledConstraints;

/// Solve a compiled set in a fresh session.
#[must_use]
pub fn solve(compiled: &CompiledConstraints, config: &SolverConfig, cancel: Option<&dyn Fn() -> bool>) -> SolveOutcome {
    let mut session = SolverSession::open(config.clone());
    if let Some(cancel) = cancel {
        session = session.with_cancel(cancel);
    }
    session.load(compiled);
    session.check()
}
