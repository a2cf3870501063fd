//! Core data types used throughout CloudCap.
//!
//! This module defines the fundamental data structures for representing:
//! - Nested template values (`Value`, `Scalar`)
//! - Deployment identity (`Region`, `Account`, `DeploymentId`)
//! - Usage estimates (`UsageEstimate`, `UsageEstimates`)
//! - Analysis outcomes (`Verdict`, `Counterexample`)
//! - Report and graph output formats

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Name of a usage metric (e.g. `nrequests`, `concurrency`).
pub type Metric = String;

/// Logical id of a resource inside a template (e.g. `MyQueue`).
pub type ResourceId = String;

/// A leaf value inside a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// `null` / `~`
    Null,
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Integer(i64),
    /// Floating point literal
    Float(f64),
    /// String literal
    String(String),
}

impl Scalar {
    /// Numeric interpretation of the scalar.
    ///
    /// CloudFormation frequently quotes numbers (`"5"`), so numeric strings
    /// are accepted as well.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A nested template value: a scalar, an ordered sequence, or a string-keyed
/// mapping.
///
/// Every traversal in the crate (structural scanning, reference detection,
/// property lookup) is plain recursion over this closed union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Leaf value
    Scalar(Scalar),
    /// Ordered sequence
    Sequence(Vec<Value>),
    /// Mapping of string keys to values
    Mapping(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Self::Mapping(BTreeMap::new())
    }
}

impl Value {
    /// The value as a string, if it is a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The value as a scalar, if it is a leaf.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a mapping, if it is one.
    #[must_use]
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// The value as a sequence, if it is one.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric interpretation of a scalar value.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    /// Follow a path of mapping keys.
    ///
    /// ```rust
    /// use cloudcap::types::Value;
    /// use serde_json::json;
    ///
    /// let props = Value::from(json!({"ProvisionedThroughput": {"ReadCapacityUnits": 5}}));
    /// let rcu = props.get_path(&["ProvisionedThroughput", "ReadCapacityUnits"]);
    /// assert_eq!(rcu.and_then(Value::as_f64), Some(5.0));
    /// ```
    #[must_use]
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter().try_fold(self, |current, key| {
            current.as_mapping().and_then(|m| m.get(key.as_ref()))
        })
    }

    /// Whether the value is a single-key mapping with the given key.
    #[must_use]
    pub fn single_key(&self) -> Option<(&str, &Value)> {
        let map = self.as_mapping()?;
        if map.len() != 1 {
            return None;
        }
        map.iter().next().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Scalar(Scalar::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Scalar(Scalar::Integer(i))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Scalar(Scalar::Null),
            serde_json::Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Scalar(Scalar::Integer(i)),
                None => Self::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Self::Scalar(Scalar::String(s)),
            serde_json::Value::Array(items) => {
                Self::Sequence(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Mapping(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// AWS region, as an opaque caller-supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub String);

impl Region {
    /// Create a region from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The partition the region belongs to (`aws`, `aws-cn`, `aws-us-gov`).
    #[must_use]
    pub fn partition(&self) -> &'static str {
        if self.0.starts_with("cn-") {
            "aws-cn"
        } else if self.0.starts_with("us-gov-") {
            "aws-us-gov"
        } else {
            "aws"
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AWS account, as an opaque caller-supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(pub String);

impl Account {
    /// Create an account from its id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a deployment: one (region, account) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    /// The region
    pub region: Region,
    /// The account
    pub account: Account,
}

impl DeploymentId {
    /// Create a deployment id.
    #[must_use]
    pub fn new(region: Region, account: Account) -> Self {
        Self { region, account }
    }
}

impl Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.account)
    }
}

/// A declared interval bound on a runtime metric of a resource.
///
/// Bounds are non-negative by construction and `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEstimate {
    min: u64,
    max: u64,
}

impl UsageEstimate {
    /// Create an estimate for `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEstimate` if `min > max`.
    pub fn new(resource: &str, metric: &str, min: u64, max: u64) -> Result<Self> {
        if min > max {
            return Err(crate::err!(InvalidEstimate {
                resource: resource.to_string(),
                metric: metric.to_string(),
                message: format!("lower bound {min} exceeds upper bound {max}"),
            }));
        }
        Ok(Self { min, max })
    }

    /// An estimate pinned to a single value.
    #[must_use]
    pub fn exactly(value: u64) -> Self {
        Self { min: value, max: value }
    }

    /// An estimate of `[0, max]`.
    #[must_use]
    pub fn up_to(max: u64) -> Self {
        Self { min: 0, max }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> u64 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> u64 {
        self.max
    }
}

impl Display for UsageEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Usage estimates keyed by (resource id, metric), in deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageEstimates {
    entries: BTreeMap<(ResourceId, Metric), UsageEstimate>,
}

impl UsageEstimates {
    /// Create an empty estimate set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or replace) an estimate.
    pub fn insert(&mut self, resource: impl Into<String>, metric: impl Into<String>, estimate: UsageEstimate) {
        self.entries.insert((resource.into(), metric.into()), estimate);
    }

    /// Look up an estimate.
    #[must_use]
    pub fn get(&self, resource: &str, metric: &str) -> Option<UsageEstimate> {
        self.entries
            .get(&(resource.to_string(), metric.to_string()))
            .copied()
    }

    /// Iterate over all estimates in (resource, metric) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, UsageEstimate)> {
        self.entries
            .iter()
            .map(|((r, m), e)| (r.as_str(), m.as_str(), *e))
    }

    /// Merge another set into this one; later entries win.
    pub fn extend(&mut self, other: UsageEstimates) {
        self.entries.extend(other.entries);
    }

    /// Number of declared estimates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no estimates are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One variable value inside a counterexample.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    /// Resource id
    pub resource: ResourceId,
    /// Metric name
    pub metric: Metric,
    /// Value within the declared estimate
    pub value: u64,
}

/// A concrete usage within estimates that violates at least one constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterexample {
    /// The deployment the counterexample belongs to, once attributed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentId>,
    /// Value of every usage variable, ordered by (resource, metric)
    pub assignments: Vec<Assignment>,
    /// Ids of every constraint the assignment violates
    pub violated: Vec<String>,
}

impl Counterexample {
    /// Value assigned to `(resource, metric)`.
    #[must_use]
    pub fn value_of(&self, resource: &str, metric: &str) -> Option<u64> {
        self.assignments
            .iter()
            .find(|a| a.resource == resource && a.metric == metric)
            .map(|a| a.value)
    }
}

/// Why the solver could not decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// The configured deadline passed
    Timeout,
    /// The configured search budget ran out
    StepBudgetExhausted,
    /// The solve was cancelled (another deployment already rejected)
    Cancelled,
}

impl Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "solver timed out"),
            Self::StepBudgetExhausted => write!(f, "solver step budget exhausted"),
            Self::Cancelled => write!(f, "solve cancelled"),
        }
    }
}

/// The ternary analysis outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// All constraints hold for every usage within estimates
    Pass,
    /// Some usage within estimates violates a constraint
    Reject(Counterexample),
    /// The solver could not decide
    Unknown {
        /// Why the solver gave up
        reason: UnknownReason,
    },
}

impl Verdict {
    /// Short tag for display.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Reject(_) => "REJECT",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Whether this is `PASS`.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Whether this is `REJECT`.
    #[must_use]
    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject(_))
    }

    /// Whether this is `UNKNOWN`.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    /// The counterexample of a `REJECT`.
    #[must_use]
    pub fn counterexample(&self) -> Option<&Counterexample> {
        match self {
            Self::Reject(cex) => Some(cex),
            _ => None,
        }
    }

    /// Process exit code: PASS 0, REJECT 1, UNKNOWN 2.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Reject(_) => 1,
            Self::Unknown { .. } => 2,
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ReportFormat {
    /// Plain text format
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Graph output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum GraphFormat {
    /// DOT format (Graphviz)
    #[default]
    Dot,
    /// JSON format
    Json,
}
