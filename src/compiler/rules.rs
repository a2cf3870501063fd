//! Capacity rules and the rule registry.
//!
//! A [`Rule`] bounds one usage metric of a resource type. Bounds may read the
//! resource's own properties (e.g. provisioned throughput), and a rule may
//! apply only when a condition on the properties holds (e.g. FIFO queues).
//!
//! Rules are plain data so they can be written in the configuration file:
//!
//! ```yaml
//! rules:
//!   AWS::Kinesis::Stream:
//!     - id: records
//!       metric: records
//!       comparison: le
//!       bound:
//!         product:
//!           - literal: 1000
//!           - property: { path: ShardCount, default: 1 }
//!       aggregation: sum
//! ```

use super::constraint::{Aggregation, Comparison};
use crate::error::Result;
use crate::graph::Resource;
use crate::types::{Metric, Scalar, Value};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A property path, written either as `A.B` or as `[A, B]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PropertyPath(pub Vec<String>);

impl PropertyPath {
    /// Build a path from a dotted string.
    #[must_use]
    pub fn parse(dotted: &str) -> Self {
        Self(dotted.split('.').map(str::to_string).collect())
    }

    /// Dotted form.
    #[must_use]
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Resolve against a resource's properties.
    #[must_use]
    pub fn lookup<'a>(&self, resource: &'a Resource) -> Option<&'a Value> {
        resource.property(&self.0)
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Dotted(String),
            Segments(Vec<String>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Dotted(s) => Self::parse(&s),
            Repr::Segments(v) => Self(v),
        })
    }
}

/// Right-hand side of a rule, evaluated against the resource's properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundExpr {
    /// A fixed number
    Literal(i64),
    /// A numeric property of the resource
    Property {
        /// Where to read it
        path: PropertyPath,
        /// Value when the property is absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<i64>,
    },
    /// Product of bounds
    Product(Vec<BoundExpr>),
    /// Sum of bounds
    Sum(Vec<BoundExpr>),
}

/// Result of evaluating a bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    /// The bound evaluated to a number
    Known(i64),
    /// A property the bound needs is not set
    Missing(PropertyPath),
}

impl BoundExpr {
    /// Evaluate against `resource`.
    ///
    /// Fractional property values are rounded down.
    ///
    /// # Errors
    ///
    /// Returns `RuleDefinition` if a property is present but not numeric, or
    /// if the result overflows.
    pub fn evaluate(&self, rule: &str, resource: &Resource) -> Result<BoundValue> {
        match self {
            Self::Literal(n) => Ok(BoundValue::Known(*n)),
            Self::Property { path, default } => match path.lookup(resource) {
                Some(value) => match value.as_f64() {
                    Some(n) if n.is_finite() => Ok(BoundValue::Known(n.floor() as i64)),
                    _ => Err(crate::err!(RuleDefinition {
                        rule: rule.to_string(),
                        message: format!(
                            "property '{}' of '{}' is not numeric",
                            path.dotted(),
                            resource.id
                        ),
                    })),
                },
                None => Ok(default.map_or_else(|| BoundValue::Missing(path.clone()), BoundValue::Known)),
            },
            Self::Product(terms) => Self::fold(terms, rule, resource, 1, i64::checked_mul),
            Self::Sum(terms) => Self::fold(terms, rule, resource, 0, i64::checked_add),
        }
    }

    fn fold(
        terms: &[BoundExpr],
        rule: &str,
        resource: &Resource,
        init: i64,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<BoundValue> {
        let mut acc = init;
        for term in terms {
            match term.evaluate(rule, resource)? {
                BoundValue::Known(n) => {
                    acc = op(acc, n).ok_or_else(|| {
                        crate::err!(RuleDefinition {
                            rule: rule.to_string(),
                            message: "bound overflows".to_string(),
                        })
                    })?;
                }
                missing @ BoundValue::Missing(_) => return Ok(missing),
            }
        }
        Ok(BoundValue::Known(acc))
    }

    fn validate(&self, rule: &str) -> Result<()> {
        match self {
            Self::Literal(_) => Ok(()),
            Self::Property { path, .. } => {
                if path.0.is_empty() || path.0.iter().any(String::is_empty) {
                    return Err(crate::err!(RuleDefinition {
                        rule: rule.to_string(),
                        message: format!("invalid property path '{}'", path.dotted()),
                    }));
                }
                Ok(())
            }
            Self::Product(terms) | Self::Sum(terms) => {
                if terms.is_empty() {
                    return Err(crate::err!(RuleDefinition {
                        rule: rule.to_string(),
                        message: "product/sum bound needs at least one term".to_string(),
                    }));
                }
                terms.iter().try_for_each(|t| t.validate(rule))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Literal(n) => n.to_string(),
            Self::Property { path, default: Some(d) } => format!("{} (default {d})", path.dotted()),
            Self::Property { path, default: None } => path.dotted(),
            Self::Product(terms) => terms.iter().map(Self::describe).collect::<Vec<_>>().join(" * "),
            Self::Sum(terms) => terms.iter().map(Self::describe).collect::<Vec<_>>().join(" + "),
        }
    }
}

/// Guard deciding whether a rule applies to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The property equals `value` (booleans and numbers also match their
    /// string spelling)
    PropertyEquals {
        /// Property path
        path: PropertyPath,
        /// Expected value
        value: Scalar,
    },
    /// The property is set
    PropertyPresent {
        /// Property path
        path: PropertyPath,
    },
    /// The property is not set
    PropertyAbsent {
        /// Property path
        path: PropertyPath,
    },
    /// Negation
    Not(Box<Condition>),
}

impl Condition {
    /// Whether the condition holds for `resource`.
    #[must_use]
    pub fn holds(&self, resource: &Resource) -> bool {
        match self {
            Self::PropertyEquals { path, value } => path
                .lookup(resource)
                .and_then(Value::as_scalar)
                .is_some_and(|actual| scalars_match(actual, value)),
            Self::PropertyPresent { path } => path.lookup(resource).is_some(),
            Self::PropertyAbsent { path } => path.lookup(resource).is_none(),
            Self::Not(inner) => !inner.holds(resource),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::PropertyEquals { path, value } => format!("{} == {value}", path.dotted()),
            Self::PropertyPresent { path } => format!("{} set", path.dotted()),
            Self::PropertyAbsent { path } => format!("{} unset", path.dotted()),
            Self::Not(inner) => format!("not ({})", inner.describe()),
        }
    }
}

/// Compare scalars the way templates spell them: `true` matches `"true"`,
/// `5` matches `"5"`.
fn scalars_match(actual: &Scalar, expected: &Scalar) -> bool {
    if actual == expected {
        return true;
    }
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return a == b;
    }
    actual.to_string().eq_ignore_ascii_case(&expected.to_string())
}

/// A capacity rule for one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule id, unique per resource type
    pub id: String,
    /// The usage metric being bounded
    pub metric: Metric,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Relational operator
    #[serde(default = "default_comparison")]
    pub comparison: Comparison,
    /// Right-hand side
    pub bound: BoundExpr,
    /// How dependents' usage is combined
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Optional guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,
}

fn default_comparison() -> Comparison {
    Comparison::Le
}

impl Rule {
    /// A `metric <= bound` rule.
    #[must_use]
    pub fn at_most(id: &str, metric: &str, bound: BoundExpr) -> Self {
        Self {
            id: id.to_string(),
            metric: metric.to_string(),
            description: None,
            comparison: Comparison::Le,
            bound,
            aggregation: Aggregation::None,
            when: None,
        }
    }

    /// Set the aggregation mode.
    #[must_use]
    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the comparison.
    #[must_use]
    pub fn comparing(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Guard the rule with a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }

    /// Attach a description.
    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Check the rule is well formed.
    ///
    /// # Errors
    ///
    /// Returns `RuleDefinition` for an empty id or metric, or a malformed
    /// bound.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(crate::err!(RuleDefinition {
                rule: self.id.clone(),
                message: "rule id must not be empty".to_string(),
            }));
        }
        if self.metric.trim().is_empty() {
            return Err(crate::err!(RuleDefinition {
                rule: self.id.clone(),
                message: "metric must not be empty".to_string(),
            }));
        }
        self.bound.validate(&self.id)
    }

    /// One-line summary, e.g. `SUM(nrequests) <= 300 when FifoQueue == true`.
    #[must_use]
    pub fn summary(&self) -> String {
        let lhs = match self.aggregation {
            Aggregation::None => self.metric.clone(),
            agg => format!("{agg}({})", self.metric),
        };
        let mut out = format!("{lhs} {} {}", self.comparison, self.bound.describe());
        if let Some(cond) = &self.when {
            out.push_str(&format!(" when {}", cond.describe()));
        }
        out
    }
}

/// Resource type → rules.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Vec<Rule>>,
}

impl RuleRegistry {
    /// A registry with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The builtin AWS service-quota rules.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (resource_type, rule) in builtin_rules() {
            registry.insert(resource_type, rule);
        }
        registry
    }

    /// Register a rule, replacing any rule with the same id for the type.
    ///
    /// # Errors
    ///
    /// Returns `RuleDefinition` if the rule is malformed.
    pub fn register(&mut self, resource_type: &str, rule: Rule) -> Result<()> {
        rule.validate()?;
        self.insert(resource_type, rule);
        Ok(())
    }

    /// Register every rule of a `type → rules` map.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleDefinition` error.
    pub fn extend(&mut self, rules: &BTreeMap<String, Vec<Rule>>) -> Result<()> {
        for (resource_type, list) in rules {
            for rule in list {
                self.register(resource_type, rule.clone())?;
            }
        }
        Ok(())
    }

    fn insert(&mut self, resource_type: &str, rule: Rule) {
        let list = self.rules.entry(resource_type.to_string()).or_default();
        if let Some(existing) = list.iter_mut().find(|r| r.id == rule.id) {
            tracing::debug!(resource_type, rule = %rule.id, "Overriding rule");
            *existing = rule;
        } else {
            list.push(rule);
        }
    }

    /// Rules for a resource type, or `None` when the type has none.
    #[must_use]
    pub fn rules_for(&self, resource_type: &str) -> Option<&[Rule]> {
        self.rules
            .get(resource_type)
            .map(Vec::as_slice)
            .filter(|rules| !rules.is_empty())
    }

    /// Every (type, rule) pair, ordered by type.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules
            .iter()
            .flat_map(|(t, rules)| rules.iter().map(move |r| (t.as_str(), r)))
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn literal(n: i64) -> BoundExpr {
    BoundExpr::Literal(n)
}

fn property(path: &str) -> BoundExpr {
    BoundExpr::Property { path: PropertyPath::parse(path), default: None }
}

fn equals(path: &str, value: impl Into<Scalar>) -> Condition {
    Condition::PropertyEquals { path: PropertyPath::parse(path), value: value.into() }
}

// Default AWS service quotas, per second unless noted.
fn builtin_rules() -> Vec<(&'static str, Rule)> {
    let fifo_queue = equals("FifoQueue", true);
    let fifo_topic = equals("FifoTopic", true);
    let on_demand = equals("BillingMode", "PAY_PER_REQUEST");

    vec![
        (
            "AWS::SQS::Queue",
            Rule::at_most("fifo-throughput", "nrequests", literal(300))
                .aggregate(Aggregation::Sum)
                .when(fifo_queue.clone())
                .describe("FIFO queues accept 300 API calls per second"),
        ),
        (
            "AWS::SQS::Queue",
            Rule::at_most("inflight", "inflight", literal(120_000))
                .when(Condition::Not(Box::new(fifo_queue.clone())))
                .describe("Standard queues allow 120,000 in-flight messages"),
        ),
        (
            "AWS::SQS::Queue",
            Rule::at_most("fifo-inflight", "inflight", literal(20_000))
                .when(fifo_queue)
                .describe("FIFO queues allow 20,000 in-flight messages"),
        ),
        (
            "AWS::Lambda::Function",
            Rule::at_most("reserved-concurrency", "concurrency", property("ReservedConcurrentExecutions"))
                .when(Condition::PropertyPresent { path: PropertyPath::parse("ReservedConcurrentExecutions") })
                .describe("Concurrency cannot exceed the reserved concurrency"),
        ),
        (
            "AWS::Lambda::Function",
            Rule::at_most("account-concurrency", "concurrency", literal(1000))
                .describe("Default regional concurrency quota"),
        ),
        (
            "AWS::DynamoDB::Table",
            Rule::at_most("read-capacity", "read_capacity", property("ProvisionedThroughput.ReadCapacityUnits"))
                .aggregate(Aggregation::Sum)
                .when(Condition::Not(Box::new(on_demand.clone())))
                .describe("Reads cannot exceed provisioned read capacity units"),
        ),
        (
            "AWS::DynamoDB::Table",
            Rule::at_most("write-capacity", "write_capacity", property("ProvisionedThroughput.WriteCapacityUnits"))
                .aggregate(Aggregation::Sum)
                .when(Condition::Not(Box::new(on_demand.clone())))
                .describe("Writes cannot exceed provisioned write capacity units"),
        ),
        (
            "AWS::DynamoDB::Table",
            Rule::at_most("on-demand-read", "read_capacity", literal(40_000))
                .aggregate(Aggregation::Sum)
                .when(on_demand.clone())
                .describe("On-demand tables serve 40,000 read request units"),
        ),
        (
            "AWS::DynamoDB::Table",
            Rule::at_most("on-demand-write", "write_capacity", literal(40_000))
                .aggregate(Aggregation::Sum)
                .when(on_demand)
                .describe("On-demand tables serve 40,000 write request units"),
        ),
        (
            "AWS::SNS::Topic",
            Rule::at_most("publish", "nrequests", literal(30_000))
                .aggregate(Aggregation::Sum)
                .when(Condition::Not(Box::new(fifo_topic.clone())))
                .describe("Standard topics accept 30,000 publishes per second"),
        ),
        (
            "AWS::SNS::Topic",
            Rule::at_most("fifo-publish", "nrequests", literal(300))
                .aggregate(Aggregation::Sum)
                .when(fifo_topic)
                .describe("FIFO topics accept 300 publishes per second"),
        ),
        (
            "AWS::Kinesis::Stream",
            Rule::at_most(
                "records",
                "records",
                BoundExpr::Product(vec![
                    literal(1000),
                    BoundExpr::Property { path: PropertyPath::parse("ShardCount"), default: Some(1) },
                ]),
            )
            .aggregate(Aggregation::Sum)
            .describe("Each shard ingests 1,000 records per second"),
        ),
        (
            "AWS::ApiGateway::RestApi",
            Rule::at_most("throttle", "nrequests", literal(10_000))
                .aggregate(Aggregation::Sum)
                .describe("Default account-level throttle"),
        ),
        (
            "AWS::S3::Bucket",
            Rule::at_most("put-rate", "put_requests", literal(3500))
                .aggregate(Aggregation::Sum)
                .describe("3,500 PUT/COPY/POST/DELETE per second per prefix"),
        ),
        (
            "AWS::S3::Bucket",
            Rule::at_most("get-rate", "get_requests", literal(5500))
                .aggregate(Aggregation::Sum)
                .describe("5,500 GET/HEAD per second per prefix"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn resource(resource_type: &str, properties: serde_json::Value) -> Resource {
        Resource {
            id: "R".into(),
            resource_type: resource_type.into(),
            properties: Value::from(properties),
        }
    }

    #[test]
    fn test_builtin_registry_lookup() {
        let registry = RuleRegistry::builtin();
        assert!(registry.rules_for("AWS::SQS::Queue").is_some());
        assert!(registry.rules_for("AWS::IAM::Role").is_none());
        assert!(registry.iter().all(|(_, r)| r.validate().is_ok()));
    }

    #[test]
    fn test_register_overrides_same_id() {
        let mut registry = RuleRegistry::builtin();
        let before = registry.len();
        registry
            .register("AWS::ApiGateway::RestApi", Rule::at_most("throttle", "nrequests", literal(5000)))
            .unwrap();
        assert_eq!(registry.len(), before);
        let rules = registry.rules_for("AWS::ApiGateway::RestApi").unwrap();
        assert_eq!(rules[0].bound, literal(5000));
    }

    #[test]
    fn test_register_rejects_empty_metric() {
        let mut registry = RuleRegistry::empty();
        let err = registry.register("X", Rule::at_most("r", "", literal(1))).unwrap_err();
        assert!(err.to_string().contains("metric must not be empty"));
    }

    #[test]
    fn test_bound_reads_properties() {
        let table = resource(
            "AWS::DynamoDB::Table",
            json!({"ProvisionedThroughput": {"ReadCapacityUnits": "5", "WriteCapacityUnits": 7}}),
        );
        assert_eq!(
            property("ProvisionedThroughput.ReadCapacityUnits").evaluate("r", &table).unwrap(),
            BoundValue::Known(5)
        );
        let product = BoundExpr::Product(vec![literal(2), property("ProvisionedThroughput.WriteCapacityUnits")]);
        assert_eq!(product.evaluate("r", &table).unwrap(), BoundValue::Known(14));
        assert!(matches!(property("Missing").evaluate("r", &table).unwrap(), BoundValue::Missing(_)));
    }

    #[test]
    fn test_non_numeric_property_is_an_error() {
        let f = resource("AWS::Lambda::Function", json!({"ReservedConcurrentExecutions": {"Ref": "P"}}));
        assert!(property("ReservedConcurrentExecutions").evaluate("r", &f).is_err());
    }

    #[test]
    fn test_conditions() {
        let fifo = resource("AWS::SQS::Queue", json!({"FifoQueue": "true"}));
        let standard = resource("AWS::SQS::Queue", json!({}));
        let cond = equals("FifoQueue", true);
        assert!(cond.holds(&fifo));
        assert!(!cond.holds(&standard));
        assert!(Condition::Not(Box::new(cond)).holds(&standard));
    }

    #[test]
    fn test_rule_from_yaml() {
        let yaml = r"
id: records
metric: records
bound:
  product:
    - literal: 1000
    - property: { path: ShardCount, default: 1 }
aggregation: sum
when:
  property_present: { path: [StreamModeDetails, StreamMode] }
";
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.comparison, Comparison::Le);
        assert_eq!(rule.aggregation, Aggregation::Sum);
        assert_eq!(rule.summary(), "SUM(records) <= 1000 * ShardCount (default 1) when StreamModeDetails.StreamMode set");
    }
}
