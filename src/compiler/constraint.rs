//! Compiled constraint representation.
//!
//! A [`Constraint`] is `lhs ⋈ rhs` over integer [`Expr`]essions whose leaves
//! are literals and bounded usage [`Variable`]s. Evaluation uses `i128` so
//! sums and products of `u64` bounds never overflow in practice.

use crate::types::{Metric, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Index of a usage variable inside a [`CompiledConstraints`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VarId(pub usize);

/// A bounded integer variable standing for one declared usage estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    /// Position in the variable table
    pub id: VarId,
    /// Resource the estimate belongs to
    pub resource: ResourceId,
    /// Metric name
    pub metric: Metric,
    /// Lower bound (inclusive)
    pub min: u64,
    /// Upper bound (inclusive)
    pub max: u64,
}

impl Variable {
    /// Display name, `resource.metric`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.resource, self.metric)
    }
}

/// Integer expression over usage variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Literal
    Const(i64),
    /// Usage variable
    Var(VarId),
    /// Sum of terms (empty sum is 0)
    Sum(Vec<Expr>),
    /// Maximum of terms (must be non-empty)
    Max(Vec<Expr>),
    /// Minimum of terms (must be non-empty)
    Min(Vec<Expr>),
    /// Constant multiple
    Scale(i64, Box<Expr>),
}

impl Expr {
    /// Sum of variables, collapsing the single-term case.
    #[must_use]
    pub fn sum_of(vars: &[VarId]) -> Self {
        match vars {
            [single] => Self::Var(*single),
            _ => Self::Sum(vars.iter().copied().map(Self::Var).collect()),
        }
    }

    /// Maximum of variables, collapsing the single-term case.
    ///
    /// `vars` must not be empty.
    #[must_use]
    pub fn max_of(vars: &[VarId]) -> Self {
        match vars {
            [single] => Self::Var(*single),
            _ => Self::Max(vars.iter().copied().map(Self::Var).collect()),
        }
    }

    /// Evaluate under a full assignment indexed by [`VarId`].
    #[must_use]
    pub fn eval(&self, values: &[i128]) -> i128 {
        match self {
            Self::Const(c) => i128::from(*c),
            Self::Var(v) => values.get(v.0).copied().unwrap_or(0),
            Self::Sum(terms) => terms.iter().map(|t| t.eval(values)).sum(),
            Self::Max(terms) => terms.iter().map(|t| t.eval(values)).max().unwrap_or(0),
            Self::Min(terms) => terms.iter().map(|t| t.eval(values)).min().unwrap_or(0),
            Self::Scale(k, inner) => i128::from(*k) * inner.eval(values),
        }
    }

    /// Every variable occurring in the expression, in first-seen order.
    #[must_use]
    pub fn variables(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<VarId>) {
        match self {
            Self::Const(_) => {}
            Self::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            Self::Sum(terms) | Self::Max(terms) | Self::Min(terms) => {
                for t in terms {
                    t.collect_variables(out);
                }
            }
            Self::Scale(_, inner) => inner.collect_variables(out),
        }
    }

    /// Render with variable names.
    #[must_use]
    pub fn render(&self, variables: &[Variable]) -> String {
        let join = |terms: &[Expr], sep: &str| {
            terms
                .iter()
                .map(|t| t.render(variables))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            Self::Const(c) => c.to_string(),
            Self::Var(v) => variables
                .get(v.0)
                .map_or_else(|| format!("v{}", v.0), Variable::name),
            Self::Sum(terms) if terms.is_empty() => "0".to_string(),
            Self::Sum(terms) => format!("({})", join(terms, " + ")),
            Self::Max(terms) => format!("max({})", join(terms, ", ")),
            Self::Min(terms) => format!("min({})", join(terms, ", ")),
            Self::Scale(k, inner) => format!("{k} * {}", inner.render(variables)),
        }
    }
}

/// Relational operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `<=`
    Le,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `==`
    Eq,
}

impl Comparison {
    /// Whether `lhs ⋈ rhs` holds.
    #[must_use]
    pub fn holds(self, lhs: i128, rhs: i128) -> bool {
        match self {
            Self::Le => lhs <= rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
            Self::Eq => lhs == rhs,
        }
    }

    /// Operator symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Eq => "=",
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How usage flowing into a resource is combined before bounding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Bound the resource's own usage
    #[default]
    None,
    /// Bound the sum of dependents' usage
    Sum,
    /// Bound the largest dependent usage
    Max,
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Sum => write!(f, "SUM"),
            Self::Max => write!(f, "MAX"),
        }
    }
}

/// One compiled inequality, tagged with the resource and rule that produced
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Stable id, `Resource/rule`
    pub id: String,
    /// Target resource
    pub resource: ResourceId,
    /// Rule id
    pub rule: String,
    /// Constrained metric
    pub metric: Metric,
    /// Aggregation mode
    pub aggregation: Aggregation,
    /// Left-hand side
    pub lhs: Expr,
    /// Operator
    pub comparison: Comparison,
    /// Right-hand side
    pub rhs: Expr,
}

impl Constraint {
    /// Whether the constraint holds under `values`.
    #[must_use]
    pub fn holds(&self, values: &[i128]) -> bool {
        self.comparison.holds(self.lhs.eval(values), self.rhs.eval(values))
    }

    /// Render as `lhs op rhs` with variable names.
    #[must_use]
    pub fn render(&self, variables: &[Variable]) -> String {
        format!(
            "{} {} {}",
            self.lhs.render(variables),
            self.comparison,
            self.rhs.render(variables)
        )
    }
}

/// Why a rule instantiation produced no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The rule's `when` condition did not hold
    ConditionFalse,
    /// A property the bound needs is absent and has no default
    MissingProperty {
        /// Dotted property path
        path: String,
    },
    /// No usage estimate feeds the rule's metric
    NoUsage,
    /// A dependent without an estimate was left out of an aggregate; the
    /// constraint still covers the remaining dependents
    UncoveredDependent {
        /// The dependent's logical id
        dependent: ResourceId,
    },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConditionFalse => write!(f, "condition not met"),
            Self::MissingProperty { path } => write!(f, "property '{path}' not set"),
            Self::NoUsage => write!(f, "no usage estimate"),
            Self::UncoveredDependent { dependent } => {
                write!(f, "dependent '{dependent}' has no usage estimate")
            }
        }
    }
}

/// A rule instantiation that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    /// Resource the rule applied to
    pub resource: ResourceId,
    /// Rule id
    pub rule: String,
    /// Why it was skipped
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Output of one compile pass over a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledConstraints {
    /// Constraints in (resource, rule) order
    pub constraints: Vec<Constraint>,
    /// Variable table indexed by [`VarId`]
    pub variables: Vec<Variable>,
    /// Rules that produced nothing
    pub skipped: Vec<SkippedRule>,
}

impl CompiledConstraints {
    /// Look up a variable.
    #[must_use]
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    /// Ids of every constraint violated under `values`.
    #[must_use]
    pub fn violated(&self, values: &[i128]) -> Vec<String> {
        self.constraints
            .iter()
            .filter(|c| !c.holds(values))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Whether there is nothing to check.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}
