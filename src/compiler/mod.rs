//! Constraint compilation.
//!
//! The compiler walks a deployment's resources, looks up the capacity rules
//! registered for each resource type, and instantiates them against the
//! resource's properties and the declared usage estimates.
//!
//! ```text
//! Deployment ──┐
//!              ├──▶ ConstraintCompiler ──▶ CompiledConstraints
//! RuleRegistry ┘                           ├── variables (one per estimate)
//!                                          ├── constraints
//!                                          └── skipped rules
//! ```
//!
//! Aggregating rules (`sum`, `max`) bound the usage flowing into a resource:
//! the estimates of every resource referencing it, plus its own.

mod compile;
mod constraint;
mod rules;

pub use compile::{ConstraintCompiler, MissingEstimatePolicy};
pub use constraint::{
    Aggregation, Comparison, CompiledConstraints, Constraint, Expr, SkipReason, SkippedRule, VarId,
    Variable,
};
pub use rules::{BoundExpr, BoundValue, Condition, PropertyPath, Rule, RuleRegistry};
