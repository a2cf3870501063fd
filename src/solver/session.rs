//! Scoped solver sessions.

use super::search::{self, Budget, Goal, Range, Search};
use super::smtlib;
use crate::compiler::{Comparison, CompiledConstraints, Constraint, Expr, Variable};
use crate::types::{Assignment, Counterexample, UnknownReason, Verdict};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Solver limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall-clock limit for one deployment's solve, in milliseconds
    pub timeout_ms: u64,
    /// Maximum number of search steps for one deployment's solve
    pub max_steps: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_steps: 1_000_000,
        }
    }
}

impl SolverConfig {
    /// The timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Answer to "is there a usage within estimates violating a constraint?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// No violation exists
    Unsat,
    /// A violating assignment
    Sat(Counterexample),
    /// Undecided
    Unknown(UnknownReason),
}

impl From<SolveOutcome> for Verdict {
    fn from(outcome: SolveOutcome) -> Self {
        match outcome {
            SolveOutcome::Unsat => Self::Pass,
            SolveOutcome::Sat(cex) => Self::Reject(cex),
            SolveOutcome::Unknown(reason) => Self::Unknown { reason },
        }
    }
}

/// One solver context: declared variables, asserted constraints, limits.
///
/// A session is opened per deployment solve and dropped afterwards; nothing
/// is shared between sessions.
///
/// ```rust
/// use cloudcap::compiler::{Aggregation, Comparison, CompiledConstraints, Constraint, Expr, VarId, Variable};
/// use cloudcap::solver::{SolveOutcome, SolverConfig, SolverSession};
///
/// let mut session = SolverSession::open(SolverConfig::default());
/// session.declare(Variable {
///     id: VarId(0),
///     resource: "Q1".into(),
///     metric: "throughput".into(),
///     min: 0,
///     max: 1500,
/// });
/// session.assert(Constraint {
///     id: "Q1/throughput".into(),
///     resource: "Q1".into(),
///     rule: "throughput".into(),
///     metric: "throughput".into(),
///     aggregation: Aggregation::None,
///     lhs: Expr::Var(VarId(0)),
///     comparison: Comparison::Le,
///     rhs: Expr::Const(1000),
/// });
/// match session.check() {
///     SolveOutcome::Sat(cex) => assert!(cex.value_of("Q1", "throughput").unwrap() > 1000),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub struct SolverSession<'a> {
    config: SolverConfig,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    cancel: Option<&'a dyn Fn() -> bool>,
    steps: u64,
}

impl<'a> SolverSession<'a> {
    /// Open an empty session.
    #[must_use]
    pub fn open(config: SolverConfig) -> Self {
        tracing::trace!(timeout_ms = config.timeout_ms, max_steps = config.max_steps, "Solver session opened");
        Self {
            config,
            variables: Vec::new(),
            constraints: Vec::new(),
            cancel: None,
            steps: 0,
        }
    }

    /// Stop searching as soon as `cancel` returns true.
    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a dyn Fn() -> bool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Declare a bounded variable. Its `id` must equal its declaration
    /// position.
    pub fn declare(&mut self, variable: Variable) {
        debug_assert_eq!(variable.id.0, self.variables.len());
        self.variables.push(variable);
    }

    /// Assert a constraint over declared variables.
    pub fn assert(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Declare and assert everything in a compiled set.
    pub fn load(&mut self, compiled: &CompiledConstraints) {
        for variable in &compiled.variables {
            self.declare(variable.clone());
        }
        for constraint in &compiled.constraints {
            self.assert(constraint.clone());
        }
    }

    /// Search steps used by the last `check`.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Decide whether some assignment within bounds violates at least one
    /// asserted constraint.
    ///
    /// Constraints are examined in assertion order; the first violation found
    /// becomes the counterexample, annotated with every constraint it breaks.
    pub fn check(&mut self) -> SolveOutcome {
        let domain: Vec<Range> = self
            .variables
            .iter()
            .map(|v| (i128::from(v.min), i128::from(v.max)))
            .collect();
        let mut budget = Budget {
            deadline: Instant::now() + self.config.timeout(),
            max_steps: self.config.max_steps,
            steps: 0,
            cancel: self.cancel,
        };

        let mut outcome = SolveOutcome::Unsat;
        'constraints: for constraint in &self.constraints {
            let diff = Expr::Sum(vec![
                constraint.lhs.clone(),
                Expr::Scale(-1, Box::new(constraint.rhs.clone())),
            ]);
            for goal in violation_goals(constraint.comparison) {
                match search::search(&diff, goal, &domain, &mut budget) {
                    Search::Exhausted => {}
                    Search::Found(point) => {
                        tracing::debug!(constraint = %constraint.id, steps = budget.steps, "Violation found");
                        outcome = SolveOutcome::Sat(self.counterexample(&point));
                        break 'constraints;
                    }
                    Search::Stopped(reason) => {
                        tracing::debug!(constraint = %constraint.id, steps = budget.steps, %reason, "Solver stopped");
                        outcome = SolveOutcome::Unknown(reason);
                        break 'constraints;
                    }
                }
            }
        }

        self.steps = budget.steps;
        outcome
    }

    fn counterexample(&self, point: &[i128]) -> Counterexample {
        let violated = self
            .constraints
            .iter()
            .filter(|c| !c.holds(point))
            .map(|c| c.id.clone())
            .collect();
        let mut assignments: Vec<Assignment> = self
            .variables
            .iter()
            .zip(point)
            .map(|(v, value)| Assignment {
                resource: v.resource.clone(),
                metric: v.metric.clone(),
                value: u64::try_from(*value).unwrap_or_default(),
            })
            .collect();
        assignments.sort();
        Counterexample {
            deployment: None,
            assignments,
            violated,
        }
    }

    /// Render the query as an SMT-LIB2 script.
    #[must_use]
    pub fn to_smtlib(&self) -> String {
        smtlib::render(&self.variables, &self.constraints)
    }
}

impl Drop for SolverSession<'_> {
    fn drop(&mut self) {
        tracing::trace!(
            variables = self.variables.len(),
            constraints = self.constraints.len(),
            steps = self.steps,
            "Solver session released"
        );
    }
}

/// Targets on `lhs - rhs` under which the comparison fails.
fn violation_goals(comparison: Comparison) -> Vec<Goal> {
    match comparison {
        Comparison::Le => vec![Goal::AtLeast(1)],
        Comparison::Lt => vec![Goal::AtLeast(0)],
        Comparison::Ge => vec![Goal::AtMost(-1)],
        Comparison::Gt => vec![Goal::AtMost(0)],
        Comparison::Eq => vec![Goal::AtLeast(1), Goal::AtMost(-1)],
    }
}
