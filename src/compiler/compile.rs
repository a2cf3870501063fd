//! Rule instantiation over a deployment.

use super::constraint::{
    Aggregation, CompiledConstraints, Constraint, Expr, SkipReason, SkippedRule, VarId, Variable,
};
use super::rules::{BoundValue, Rule, RuleRegistry};
use crate::error::Result;
use crate::graph::Resource;
use crate::model::Deployment;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do when a resource a rule ranges over has no estimate for the
/// rule's metric: the resource itself for NONE rules, each dependent for SUM
/// and MAX rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEstimatePolicy {
    /// Leave the resource out and record why
    #[default]
    Skip,
    /// Fail compilation with `MissingEstimate`
    Error,
}

/// A compiled rule plus the dependents it could not cover.
struct Instance {
    constraint: Constraint,
    uncovered: Vec<ResourceId>,
}

/// Turns a deployment's resources and usage estimates into constraints.
///
/// ```rust
/// use cloudcap::compiler::{BoundExpr, ConstraintCompiler, Rule, RuleRegistry};
/// use cloudcap::graph::Template;
/// use cloudcap::model::Deployment;
/// use cloudcap::types::{Account, Region, UsageEstimate, Value};
///
/// let mut registry = RuleRegistry::empty();
/// registry
///     .register("Queue", Rule::at_most("throughput", "throughput", BoundExpr::Literal(1000)))
///     .unwrap();
///
/// let mut deployment = Deployment::new(Region::new("us-east-1"), Account::new("1"));
/// deployment
///     .ingest(&Template::new().with_resource("Q1", "Queue", Value::default()))
///     .unwrap();
/// deployment.set_estimate("Q1", "throughput", UsageEstimate::up_to(500));
///
/// let compiled = ConstraintCompiler::new(&registry).compile(&deployment).unwrap();
/// assert_eq!(compiled.constraints.len(), 1);
/// assert_eq!(compiled.constraints[0].id, "Q1/throughput");
/// ```
#[derive(Debug, Clone)]
pub struct ConstraintCompiler<'r> {
    registry: &'r RuleRegistry,
    missing_estimate: MissingEstimatePolicy,
}

impl<'r> ConstraintCompiler<'r> {
    /// Create a compiler over `registry`.
    #[must_use]
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            registry,
            missing_estimate: MissingEstimatePolicy::default(),
        }
    }

    /// Set the missing-estimate policy.
    #[must_use]
    pub fn with_missing_estimate(mut self, policy: MissingEstimatePolicy) -> Self {
        self.missing_estimate = policy;
        self
    }

    /// Compile every applicable rule of every resource in `deployment`.
    ///
    /// # Errors
    ///
    /// `RuleDefinition` when a bound reads a non-numeric property, and
    /// `MissingEstimate` under [`MissingEstimatePolicy::Error`].
    pub fn compile(&self, deployment: &Deployment) -> Result<CompiledConstraints> {
        let mut out = CompiledConstraints::default();
        let mut index: HashMap<(&str, &str), VarId> = HashMap::new();

        for (resource, metric, estimate) in deployment.estimates().iter() {
            if deployment.resource(resource).is_none() {
                tracing::warn!(
                    deployment = %deployment.id(),
                    resource,
                    metric,
                    "Ignoring estimate for unknown resource"
                );
                continue;
            }
            let id = VarId(out.variables.len());
            out.variables.push(Variable {
                id,
                resource: resource.to_string(),
                metric: metric.to_string(),
                min: estimate.min(),
                max: estimate.max(),
            });
            index.insert((resource, metric), id);
        }

        for resource in deployment.resources() {
            let Some(rules) = self.registry.rules_for(&resource.resource_type) else {
                tracing::trace!(resource = %resource.id, resource_type = %resource.resource_type, "No rules registered");
                continue;
            };
            for rule in rules {
                match self.instantiate(deployment, resource, rule, &index)? {
                    Ok(Instance { constraint, uncovered }) => {
                        out.constraints.push(constraint);
                        for dependent in uncovered {
                            tracing::debug!(resource = %resource.id, rule = %rule.id, %dependent, "Dependent left out of aggregate");
                            out.skipped.push(SkippedRule {
                                resource: resource.id.clone(),
                                rule: rule.id.clone(),
                                reason: SkipReason::UncoveredDependent { dependent },
                            });
                        }
                    }
                    Err(reason) => {
                        tracing::debug!(resource = %resource.id, rule = %rule.id, %reason, "Rule skipped");
                        out.skipped.push(SkippedRule {
                            resource: resource.id.clone(),
                            rule: rule.id.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        tracing::debug!(
            deployment = %deployment.id(),
            constraints = out.constraints.len(),
            variables = out.variables.len(),
            skipped = out.skipped.len(),
            "Compiled constraints"
        );
        Ok(out)
    }

    /// Instantiate one rule; the inner `Err` is a skip, not a failure.
    fn instantiate(
        &self,
        deployment: &Deployment,
        resource: &Resource,
        rule: &Rule,
        index: &HashMap<(&str, &str), VarId>,
    ) -> Result<std::result::Result<Instance, SkipReason>> {
        if let Some(condition) = &rule.when {
            if !condition.holds(resource) {
                return Ok(Err(SkipReason::ConditionFalse));
            }
        }

        // The target's own usage is the aggregate of its dependents, so an
        // aggregating rule never reads the target's estimate.
        let sources: Vec<&Resource> = match rule.aggregation {
            Aggregation::None => vec![resource],
            Aggregation::Sum | Aggregation::Max => deployment.dependents(&resource.id),
        };

        let mut vars = Vec::with_capacity(sources.len());
        let mut uncovered = Vec::new();
        for source in sources {
            match index.get(&(source.id.as_str(), rule.metric.as_str())) {
                Some(var) => vars.push(*var),
                None => uncovered.push(source.id.clone()),
            }
        }

        if let Some(missing) = uncovered.first() {
            if self.missing_estimate == MissingEstimatePolicy::Error {
                return Err(crate::err!(MissingEstimate {
                    resource: missing.clone(),
                    metric: rule.metric.clone(),
                    rule: rule.id.clone(),
                }));
            }
        }

        if vars.is_empty() {
            return Ok(Err(SkipReason::NoUsage));
        }

        let bound = match rule.bound.evaluate(&rule.id, resource)? {
            BoundValue::Known(n) => n,
            BoundValue::Missing(path) => {
                return Ok(Err(SkipReason::MissingProperty { path: path.dotted() }));
            }
        };

        let lhs = match rule.aggregation {
            Aggregation::Max => Expr::max_of(&vars),
            Aggregation::None | Aggregation::Sum => Expr::sum_of(&vars),
        };

        Ok(Ok(Instance {
            constraint: Constraint {
                id: format!("{}/{}", resource.id, rule.id),
                resource: resource.id.clone(),
                rule: rule.id.clone(),
                metric: rule.metric.clone(),
                aggregation: rule.aggregation,
                lhs,
                comparison: rule.comparison,
                rhs: Expr::Const(bound),
            },
            uncovered,
        }))
    }

    /// Every (resource, metric) pair the registry could constrain in
    /// `deployment`, whether or not an estimate is declared.
    ///
    /// Aggregating rules ask for the metric on each direct dependent only.
    #[must_use]
    pub fn wanted_estimates(&self, deployment: &Deployment) -> Vec<(String, String)> {
        let mut wanted = Vec::new();
        for resource in deployment.resources() {
            let Some(rules) = self.registry.rules_for(&resource.resource_type) else {
                continue;
            };
            for rule in rules.iter().filter(|r| r.when.as_ref().map_or(true, |c| c.holds(resource))) {
                if rule.aggregation == Aggregation::None {
                    wanted.push((resource.id.clone(), rule.metric.clone()));
                } else {
                    for dependent in deployment.dependents(&resource.id) {
                        wanted.push((dependent.id.clone(), rule.metric.clone()));
                    }
                }
            }
        }
        wanted.sort();
        wanted.dedup();
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::rules::{BoundExpr, Condition, PropertyPath};
    use crate::error::CloudcapError;
    use crate::graph::Template;
    use crate::types::{Account, Region, UsageEstimate, Value};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry(rule: Rule) -> RuleRegistry {
        let mut registry = RuleRegistry::empty();
        registry.register("Queue", rule).unwrap();
        registry
    }

    fn fan_in() -> Deployment {
        let template = Template::new()
            .with_resource("Queue", "Queue", Value::default())
            .with_resource("A", "Producer", Value::from(json!({"Target": {"Ref": "Queue"}})))
            .with_resource("B", "Producer", Value::from(json!({"Target": {"Fn::GetAtt": ["Queue", "Arn"]}})))
            .with_resource("C", "Producer", Value::from(json!({"Target": {"Ref": "Queue"}})));
        let mut deployment = Deployment::new(Region::new("us-east-1"), Account::new("1"));
        deployment.ingest(&template).unwrap();
        deployment.set_estimate("A", "nrequests", UsageEstimate::up_to(10));
        deployment.set_estimate("B", "nrequests", UsageEstimate::up_to(10));
        deployment
    }

    #[test]
    fn test_sum_combines_dependents_with_estimates() {
        let registry = registry(
            Rule::at_most("total", "nrequests", BoundExpr::Literal(15)).aggregate(Aggregation::Sum),
        );
        let compiled = ConstraintCompiler::new(&registry).compile(&fan_in()).unwrap();
        assert_eq!(compiled.constraints.len(), 1);
        let c = &compiled.constraints[0];
        assert_eq!(c.id, "Queue/total");
        assert_eq!(c.render(&compiled.variables), "(A.nrequests + B.nrequests) <= 15");
    }

    #[test]
    fn test_max_aggregation() {
        let registry = registry(
            Rule::at_most("peak", "nrequests", BoundExpr::Literal(8)).aggregate(Aggregation::Max),
        );
        let compiled = ConstraintCompiler::new(&registry).compile(&fan_in()).unwrap();
        assert_eq!(compiled.constraints[0].render(&compiled.variables), "max(A.nrequests, B.nrequests) <= 8");
    }

    #[test]
    fn test_unregistered_types_produce_nothing() {
        let compiled = ConstraintCompiler::new(&RuleRegistry::empty()).compile(&fan_in()).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.skipped.is_empty());
        assert_eq!(compiled.variables.len(), 2);
    }

    #[test]
    fn test_missing_own_estimate_is_skipped() {
        let registry = registry(Rule::at_most("own", "nrequests", BoundExpr::Literal(5)));
        let compiled = ConstraintCompiler::new(&registry).compile(&fan_in()).unwrap();
        assert!(compiled.constraints.is_empty());
        assert_eq!(compiled.skipped[0].reason, SkipReason::NoUsage);
    }

    #[test]
    fn test_missing_own_estimate_error_policy() {
        let registry = registry(Rule::at_most("own", "nrequests", BoundExpr::Literal(5)));
        let err = ConstraintCompiler::new(&registry)
            .with_missing_estimate(MissingEstimatePolicy::Error)
            .compile(&fan_in())
            .unwrap_err();
        assert!(matches!(err, CloudcapError::MissingEstimate { .. }));
    }

    #[test]
    fn test_condition_and_missing_property_skips() {
        let mut registry = RuleRegistry::empty();
        registry
            .register(
                "Queue",
                Rule::at_most("fifo", "nrequests", BoundExpr::Literal(300))
                    .aggregate(Aggregation::Sum)
                    .when(Condition::PropertyPresent { path: PropertyPath::parse("FifoQueue") }),
            )
            .unwrap();
        registry
            .register(
                "Queue",
                Rule::at_most(
                    "provisioned",
                    "nrequests",
                    BoundExpr::Property { path: PropertyPath::parse("Limit"), default: None },
                )
                .aggregate(Aggregation::Sum),
            )
            .unwrap();
        let compiled = ConstraintCompiler::new(&registry).compile(&fan_in()).unwrap();
        assert!(compiled.constraints.is_empty());
        assert_eq!(compiled.skipped[0].reason, SkipReason::ConditionFalse);
        assert_eq!(compiled.skipped[1].reason, SkipReason::MissingProperty { path: "Limit".into() });
    }

    #[test]
    fn test_estimate_for_unknown_resource_is_ignored() {
        let mut deployment = fan_in();
        deployment.set_estimate("Ghost", "nrequests", UsageEstimate::up_to(1));
        let compiled = ConstraintCompiler::new(&RuleRegistry::empty()).compile(&deployment).unwrap();
        assert!(compiled.variables.iter().all(|v| v.resource != "Ghost"));
    }

    #[test]
    fn test_wanted_estimates_follow_dependents() {
        let registry = registry(
            Rule::at_most("total", "nrequests", BoundExpr::Literal(15)).aggregate(Aggregation::Sum),
        );
        let wanted = ConstraintCompiler::new(&registry).wanted_estimates(&fan_in());
        let names: Vec<String> = wanted.iter().map(|(r, m)| format!("{r}.{m}")).collect();
        assert_eq!(names, vec!["A.nrequests", "B.nrequests", "C.nrequests"]);
    }

    #[test]
    fn test_sum_ignores_target_estimate() {
        let registry = registry(
            Rule::at_most("total", "nrequests", BoundExpr::Literal(25)).aggregate(Aggregation::Sum),
        );
        let mut deployment = fan_in();
        deployment.set_estimate("Queue", "nrequests", UsageEstimate::up_to(10));

        let compiled = ConstraintCompiler::new(&registry).compile(&deployment).unwrap();
        let c = &compiled.constraints[0];
        assert_eq!(c.render(&compiled.variables), "(A.nrequests + B.nrequests) <= 25");

        let at_max: Vec<i128> = compiled.variables.iter().map(|v| i128::from(v.max)).collect();
        assert!(compiled.violated(&at_max).is_empty());
    }

    #[test]
    fn test_uncovered_dependent_is_recorded() {
        let registry = registry(
            Rule::at_most("total", "nrequests", BoundExpr::Literal(15)).aggregate(Aggregation::Sum),
        );
        let compiled = ConstraintCompiler::new(&registry).compile(&fan_in()).unwrap();
        assert_eq!(compiled.constraints.len(), 1);
        assert_eq!(
            compiled.skipped,
            vec![SkippedRule {
                resource: "Queue".into(),
                rule: "total".into(),
                reason: SkipReason::UncoveredDependent { dependent: "C".into() },
            }]
        );
    }

    #[test]
    fn test_uncovered_dependent_error_policy() {
        let registry = registry(
            Rule::at_most("total", "nrequests", BoundExpr::Literal(15)).aggregate(Aggregation::Sum),
        );
        let err = ConstraintCompiler::new(&registry)
            .with_missing_estimate(MissingEstimatePolicy::Error)
            .compile(&fan_in())
            .unwrap_err();
        assert!(matches!(
            err,
            CloudcapError::MissingEstimate { ref resource, ref rule, .. } if resource == "C" && rule == "total"
        ));
    }

    #[test]
    fn test_fully_covered_aggregate_passes_error_policy() {
        let registry = registry(
            Rule::at_most("total", "nrequests", BoundExpr::Literal(30)).aggregate(Aggregation::Sum),
        );
        let mut deployment = fan_in();
        deployment.set_estimate("C", "nrequests", UsageEstimate::up_to(10));
        let compiled = ConstraintCompiler::new(&registry)
            .with_missing_estimate(MissingEstimatePolicy::Error)
            .compile(&deployment)
            .unwrap();
        assert_eq!(compiled.constraints.len(), 1);
        assert!(compiled.skipped.is_empty());
    }
}
