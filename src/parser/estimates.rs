//! Usage-estimate files.
//!
//! An estimate file maps resources (by logical id or ARN) to metrics and
//! their estimated range:
//!
//! ```yaml
//! Queue:
//!   nrequests: 250            # exactly 250, i.e. [250, 250]
//! Producer:
//!   nrequests: [0, 200]       # [min, max]
//! "arn:aws:lambda:us-east-1:123456789012:function:worker":
//!   concurrency: { min: 10, max: 50 }
//! ```

use crate::compiler::{ConstraintCompiler, RuleRegistry};
use crate::error::{CloudcapError, Result};
use crate::model::AwsModel;
use crate::types::{DeploymentId, Scalar, UsageEstimate, UsageEstimates, Value};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Estimates as written in a file, keyed by resource id or ARN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EstimateFile {
    entries: BTreeMap<String, BTreeMap<String, UsageEstimate>>,
}

impl EstimateFile {
    /// Read and parse an estimate file.
    ///
    /// # Errors
    ///
    /// `FileNotFound`, `Io`, `TemplateParse` for invalid YAML, or
    /// `InvalidEstimate`.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(crate::err!(FileNotFound { path: path.to_path_buf() }));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CloudcapError::io(path, e, file!(), line!()))?;
        Self::parse(&content, path)
    }

    /// Parse estimate file text. `file` is only used in error messages.
    ///
    /// # Errors
    ///
    /// `TemplateParse` for invalid YAML or a malformed layout, and
    /// `InvalidEstimate` for bad ranges.
    pub fn parse(content: &str, file: &Path) -> Result<Self> {
        let fail = |message: String| CloudcapError::template_parse(file, message, file!(), line!());

        let document: Option<Value> = serde_yaml::from_str(content).map_err(|e| fail(e.to_string()))?;
        let Some(document) = document else {
            return Ok(Self::default());
        };
        let Some(resources) = document.as_mapping() else {
            return Err(fail("estimate file must map resources to metrics".to_string()));
        };

        let mut entries = BTreeMap::new();
        for (resource, metrics) in resources {
            let Some(metrics) = metrics.as_mapping() else {
                return Err(fail(format!("estimates for '{resource}' must map metrics to ranges")));
            };
            let mut parsed = BTreeMap::new();
            for (metric, range) in metrics {
                parsed.insert(metric.clone(), parse_range(resource, metric, range)?);
            }
            entries.insert(resource.clone(), parsed);
        }

        tracing::debug!(resources = entries.len(), "Estimate file parsed");
        Ok(Self { entries })
    }

    /// Number of resources with estimates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the file declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attach the estimates to the deployments owning each resource.
    ///
    /// ARN keys go to the deployment whose resource has that ARN; logical
    /// ids go to every deployment defining the id. Keys matching nothing are
    /// reported and dropped.
    pub fn apply_to(&self, model: &mut AwsModel) {
        for (key, metrics) in &self.entries {
            let targets: Vec<(DeploymentId, String)> = if key.starts_with("arn:") {
                model
                    .resource_by_arn(key)
                    .map(|(d, r)| (d.id().clone(), r.id.clone()))
                    .into_iter()
                    .collect()
            } else {
                model
                    .deployments()
                    .iter()
                    .filter(|d| d.resource(key).is_some())
                    .map(|d| (d.id().clone(), key.clone()))
                    .collect()
            };

            if targets.is_empty() {
                tracing::warn!(resource = %key, "Estimate names no known resource; ignoring");
                continue;
            }

            for (deployment, resource) in targets {
                if let Some(deployment) = model.deployment_mut(&deployment) {
                    let mut estimates = UsageEstimates::new();
                    for (metric, estimate) in metrics {
                        estimates.insert(resource.as_str(), metric.as_str(), *estimate);
                    }
                    deployment.add_estimates(estimates);
                }
            }
        }
    }
}

fn parse_range(resource: &str, metric: &str, value: &Value) -> Result<UsageEstimate> {
    let invalid = |message: &str| {
        crate::err!(InvalidEstimate {
            resource: resource.to_string(),
            metric: metric.to_string(),
            message: message.to_string(),
        })
    };
    let bound = |v: &Value| -> Result<u64> {
        match v.as_scalar() {
            Some(Scalar::Integer(n)) => u64::try_from(*n).map_err(|_| invalid("bounds must be non-negative")),
            _ => Err(invalid("bounds must be integers")),
        }
    };

    match value {
        Value::Scalar(_) => bound(value).map(UsageEstimate::exactly),
        Value::Sequence(items) => match items.as_slice() {
            [min, max] => UsageEstimate::new(resource, metric, bound(min)?, bound(max)?),
            _ => Err(invalid("a range must be [min, max]")),
        },
        Value::Mapping(map) => {
            if let Some(unknown) = map.keys().find(|k| *k != "min" && *k != "max") {
                return Err(invalid(&format!("unknown key '{unknown}', expected min/max")));
            }
            let Some(max) = map.get("max") else {
                return Err(invalid("a range needs 'max'"));
            };
            let min = map.get("min").map(bound).transpose()?.unwrap_or(0);
            UsageEstimate::new(resource, metric, min, bound(max)?)
        }
    }
}

/// Render an estimate-file skeleton listing every (resource, metric) pair
/// the rules would constrain, keyed by ARN, with zero ranges.
#[must_use]
pub fn estimate_skeleton(model: &AwsModel, registry: &RuleRegistry) -> String {
    let compiler = ConstraintCompiler::new(registry);
    let mut out = String::from("# Usage estimates: <resource id or ARN> -> <metric> -> n | [min, max]\n");

    for deployment in model.deployments() {
        let wanted = compiler.wanted_estimates(deployment);
        let _ = writeln!(out, "\n# Deployment {}", deployment.id());
        if wanted.is_empty() {
            let _ = writeln!(out, "# (no constrained resources)");
            continue;
        }

        let mut by_resource: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (resource, metric) in &wanted {
            by_resource.entry(resource).or_default().push(metric);
        }
        for (resource_id, metrics) in by_resource {
            let Some(resource) = deployment.resource(resource_id) else {
                continue;
            };
            let arn = deployment.arn(resource);
            let _ = writeln!(out, "# {} ({})", resource.id, resource.resource_type);
            let _ = writeln!(out, "{}:", serde_json::to_string(&arn).unwrap_or(arn));
            for metric in metrics {
                let current = deployment
                    .estimates()
                    .get(resource_id, metric)
                    .map_or_else(|| "[0, 0]".to_string(), |e| e.to_string());
                let _ = writeln!(out, "  {metric}: {current}");
            }
        }
    }
    out
}
