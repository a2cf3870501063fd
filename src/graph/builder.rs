//! Resource graph builder.
//!
//! This module provides the `ResourceGraphBuilder`, which turns a
//! [`Template`] into resource nodes and reference edges inside a
//! deployment's [`ResourceGraph`].

use crate::error::{CloudcapError, Result};
use crate::graph::types::{Reference, ReferenceKind, Resource, ResourceDefinition, ResourceGraph, Template};
use crate::scanner;
use crate::types::{DeploymentId, Scalar, Value};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

const REF: &str = "Ref";
const GET_ATT: &str = "Fn::GetAtt";
const SUB: &str = "Fn::Sub";

/// Builder for resource graphs.
///
/// # Algorithm
///
/// 1. **Collision check**: every template id must be new to the deployment.
/// 2. **Node creation**: one [`Resource`] per template entry.
/// 3. **Marker detection**: reference markers (`Ref`, `Fn::GetAtt`,
///    `Fn::Sub` placeholders, `DependsOn`) are located with
///    [`scanner::collect`] and converted to [`Reference`]s.
/// 4. **Validation**: every reference target must exist in the deployment.
/// 5. **Cycle check**: the resulting graph must be acyclic.
///
/// The build works on a staging copy and only replaces the deployment's
/// graph when every phase succeeds, so a failed build leaves it untouched.
///
/// # Example
///
/// ```rust
/// use cloudcap::graph::{ResourceGraph, ResourceGraphBuilder, Template};
/// use cloudcap::types::{Account, DeploymentId, Region, Value};
/// use serde_json::json;
///
/// let template = Template::new()
///     .with_resource("Queue", "AWS::SQS::Queue", Value::default())
///     .with_resource("Fn", "AWS::Lambda::Function", Value::from(json!({
///         "Environment": {"Variables": {"QUEUE": {"Ref": "Queue"}}}
///     })));
///
/// let id = DeploymentId::new(Region::new("us-east-1"), Account::new("123"));
/// let mut graph = ResourceGraph::new();
/// ResourceGraphBuilder::new().build(&template, &mut graph, &id).unwrap();
/// assert_eq!(graph.dependents("Queue")[0].id, "Fn");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceGraphBuilder {
    /// Treat bare string mentions of another resource id as references
    implicit_references: bool,
}

impl ResourceGraphBuilder {
    /// Create a new graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also add `Implicit` edges for bare string leaves equal to another
    /// resource's id.
    #[must_use]
    pub fn with_implicit_references(mut self, enabled: bool) -> Self {
        self.implicit_references = enabled;
        self
    }

    /// Add the template's resources and references to `graph`.
    ///
    /// Returns the number of resources added.
    ///
    /// # Errors
    ///
    /// - `DuplicateResource` if a template id already exists in `graph`
    /// - `TemplateParse` if a reference marker is malformed
    /// - `Reference` if a reference names a missing resource
    /// - `Cycle` if the references form a cycle
    pub fn build(&self, template: &Template, graph: &mut ResourceGraph, deployment: &DeploymentId) -> Result<usize> {
        tracing::debug!(
            deployment = %deployment,
            resources = template.len(),
            existing = graph.node_count(),
            "Starting graph construction"
        );

        // Phase 1: collisions
        if let Some(id) = template.resources.keys().find(|id| graph.contains(id)) {
            return Err(crate::err!(DuplicateResource {
                deployment: deployment.to_string(),
                id: id.clone(),
            }));
        }

        // Phase 2: nodes
        let mut staging = graph.clone();
        for (id, definition) in &template.resources {
            staging.insert_resource(Resource {
                id: id.clone(),
                resource_type: definition.resource_type.clone(),
                properties: definition.properties.clone(),
            });
        }
        tracing::debug!(nodes = staging.node_count(), "Resource nodes added");

        // Phase 3: markers
        let mut references = Vec::new();
        for (id, definition) in &template.resources {
            let found = self.extract_references(id, definition, template, &staging)?;
            tracing::trace!(resource = %id, references = found.len(), "Extracted references");
            references.extend(found);
        }

        // Phase 4: validation
        if let Some(dangling) = references.iter().find(|r| !staging.contains(&r.to)) {
            tracing::debug!(resource = %dangling.from, missing = %dangling.to, "Dangling reference");
            return Err(crate::err!(Reference {
                resource: dangling.from.clone(),
                missing: dangling.to.clone(),
            }));
        }
        let added = references.iter().filter(|r| staging.insert_reference(r)).count();
        tracing::debug!(edges = added, "Reference edges added");

        // Phase 5: cycles
        if let Some(cycle) = staging.find_cycle() {
            tracing::debug!(cycle = ?cycle, "Reference cycle detected");
            return Err(crate::err!(Cycle { resources: cycle }));
        }

        *graph = staging;
        tracing::info!(
            deployment = %deployment,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph built successfully"
        );
        Ok(template.len())
    }

    /// Find every reference made by one resource, in marker order.
    fn extract_references(
        &self,
        id: &str,
        definition: &ResourceDefinition,
        template: &Template,
        staging: &ResourceGraph,
    ) -> Result<Vec<Reference>> {
        let mut targets: Vec<(String, ReferenceKind)> = Vec::new();
        collect_marker_targets(&definition.properties, &template.parameters, id, &mut targets)?;

        for target in &definition.depends_on {
            targets.push((target.clone(), ReferenceKind::DependsOn));
        }

        if self.implicit_references {
            let explicit: BTreeSet<&str> = targets.iter().map(|(t, _)| t.as_str()).collect();
            let implicit: Vec<String> = staging
                .resources()
                .into_iter()
                .map(|r| r.id.as_str())
                .filter(|other| *other != id && !explicit.contains(other))
                .filter(|other| scanner::exists(&definition.properties, &Scalar::from(*other)))
                .map(str::to_string)
                .collect();
            targets.extend(implicit.into_iter().map(|t| (t, ReferenceKind::Implicit)));
        }

        Ok(targets
            .into_iter()
            .map(|(to, kind)| Reference { from: id.to_string(), to, kind })
            .collect())
    }
}

fn is_marker(value: &Value) -> bool {
    matches!(value.single_key(), Some((REF | GET_ATT | SUB, _)))
}

/// Pseudo parameters (`AWS::Region`, ...) and declared parameters are not
/// resources.
fn is_resource_name(name: &str, parameters: &BTreeSet<String>) -> bool {
    !name.starts_with("AWS::") && !parameters.contains(name)
}

fn collect_marker_targets(
    properties: &Value,
    parameters: &BTreeSet<String>,
    resource: &str,
    targets: &mut Vec<(String, ReferenceKind)>,
) -> Result<()> {
    for marker in scanner::collect(properties, is_marker) {
        let Some((key, body)) = marker.single_key() else {
            continue;
        };
        match key {
            REF => {
                let name = body.as_str().ok_or_else(|| malformed(resource, "Ref must name a string"))?;
                if is_resource_name(name, parameters) {
                    targets.push((name.to_string(), ReferenceKind::Ref));
                }
            }
            GET_ATT => {
                let (name, attribute) = parse_get_att(body).ok_or_else(|| {
                    malformed(resource, "Fn::GetAtt must be [LogicalId, Attribute] or \"LogicalId.Attribute\"")
                })?;
                if is_resource_name(&name, parameters) {
                    targets.push((name, ReferenceKind::GetAtt { attribute }));
                }
            }
            SUB => collect_sub_targets(body, parameters, resource, targets)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_get_att(body: &Value) -> Option<(String, String)> {
    if let Some(s) = body.as_str() {
        let (name, attribute) = s.split_once('.')?;
        return Some((name.to_string(), attribute.to_string()));
    }
    match body.as_sequence()? {
        [name, attribute] => Some((name.as_str()?.to_string(), attribute.as_str()?.to_string())),
        _ => None,
    }
}

// `${!Literal}` is an escaped literal, not a placeholder
static SUB_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^!}][^}]*)\}").expect("Invalid regex"));

fn collect_sub_targets(
    body: &Value,
    parameters: &BTreeSet<String>,
    resource: &str,
    targets: &mut Vec<(String, ReferenceKind)>,
) -> Result<()> {
    let (text, variables) = match body {
        Value::Sequence(items) => match items.as_slice() {
            [text, variables] => (text.as_str(), variables.as_mapping()),
            [text] => (text.as_str(), None),
            _ => (None, None),
        },
        other => (other.as_str(), None),
    };
    let text = text.ok_or_else(|| malformed(resource, "Fn::Sub must be a string or [string, variables]"))?;

    for cap in SUB_PLACEHOLDER.captures_iter(text) {
        let placeholder = cap[1].trim();
        if variables.is_some_and(|vars| vars.contains_key(placeholder)) {
            continue;
        }
        let name = placeholder.split_once('.').map_or(placeholder, |(n, _)| n);
        if is_resource_name(name, parameters) {
            targets.push((name.to_string(), ReferenceKind::Sub));
        }
    }

    if let Some(vars) = variables {
        for value in vars.values() {
            collect_marker_targets(value, parameters, resource, targets)?;
        }
    }
    Ok(())
}

fn malformed(resource: &str, message: &str) -> CloudcapError {
    CloudcapError::template_parse("", format!("resource '{resource}': {message}"), file!(), line!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, Region};
    use serde_json::json;

    fn deployment() -> DeploymentId {
        DeploymentId::new(Region::new("us-east-1"), Account::new("123456789012"))
    }

    fn build(template: &Template) -> Result<ResourceGraph> {
        let mut graph = ResourceGraph::new();
        ResourceGraphBuilder::new().build(template, &mut graph, &deployment())?;
        Ok(graph)
    }

    #[test]
    fn test_build_empty_graph() {
        let graph = build(&Template::new()).unwrap();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_ref_and_get_att_forms() {
        let template = Template::new()
            .with_resource("Queue", "AWS::SQS::Queue", Value::default())
            .with_resource("Fn", "AWS::Lambda::Function", Value::default())
            .with_resource(
                "Mapping",
                "AWS::Lambda::EventSourceMapping",
                Value::from(json!({
                    "EventSourceArn": {"Fn::GetAtt": ["Queue", "Arn"]},
                    "FunctionName": {"Fn::GetAtt": "Fn.Arn"},
                    "Tags": [{"Value": {"Ref": "Queue"}}]
                })),
            );
        let graph = build(&template).unwrap();
        let refs = graph.references();
        assert_eq!(refs.len(), 3);
        assert!(refs.contains(&Reference {
            from: "Mapping".into(),
            to: "Queue".into(),
            kind: ReferenceKind::GetAtt { attribute: "Arn".into() },
        }));
        assert!(refs.contains(&Reference {
            from: "Mapping".into(),
            to: "Fn".into(),
            kind: ReferenceKind::GetAtt { attribute: "Arn".into() },
        }));
        assert_eq!(graph.dependents("Queue").len(), 1);
    }

    #[test]
    fn test_pseudo_parameters_and_parameters_are_not_references() {
        let template = Template::new()
            .with_parameter("Stage")
            .with_resource(
                "Queue",
                "AWS::SQS::Queue",
                Value::from(json!({
                    "QueueName": {"Fn::Sub": "${AWS::StackName}-${Stage}-q"},
                    "Region": {"Ref": "AWS::Region"},
                    "Env": {"Ref": "Stage"}
                })),
            );
        let graph = build(&template).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_sub_placeholders() {
        let template = Template::new()
            .with_resource("Table", "AWS::DynamoDB::Table", Value::default())
            .with_resource("Topic", "AWS::SNS::Topic", Value::default())
            .with_resource(
                "Fn",
                "AWS::Lambda::Function",
                Value::from(json!({
                    "Description": {"Fn::Sub": [
                        "reads ${Table.Arn} as ${Alias} not ${!Literal}",
                        {"Alias": {"Ref": "Topic"}}
                    ]}
                })),
            );
        let graph = build(&template).unwrap();
        let targets: Vec<_> = graph.dependencies("Fn").iter().map(|r| r.id.clone()).collect();
        assert_eq!(targets, vec!["Table".to_string(), "Topic".to_string()]);
    }

    #[test]
    fn test_depends_on_creates_edges() {
        let mut template = Template::new()
            .with_resource("A", "Test", Value::default())
            .with_resource("B", "Test", Value::default());
        template.resources.get_mut("B").unwrap().depends_on = vec!["A".into()];
        let graph = build(&template).unwrap();
        assert_eq!(graph.references()[0].kind, ReferenceKind::DependsOn);
    }

    #[test]
    fn test_dangling_reference_names_both_sides() {
        let template = Template::new().with_resource(
            "Fn",
            "AWS::Lambda::Function",
            Value::from(json!({"Queue": {"Ref": "Missing"}})),
        );
        let err = build(&template).unwrap_err();
        match err {
            CloudcapError::Reference { resource, missing, .. } => {
                assert_eq!(resource, "Fn");
                assert_eq!(missing, "Missing");
            }
            other => panic!("expected Reference error, got {other}"),
        }
    }

    #[test]
    fn test_cycle_is_rejected_and_graph_untouched() {
        let template = Template::new()
            .with_resource("A", "Test", Value::from(json!({"P": {"Ref": "B"}})))
            .with_resource("B", "Test", Value::from(json!({"P": {"Ref": "A"}})));
        let mut graph = ResourceGraph::new();
        let err = ResourceGraphBuilder::new()
            .build(&template, &mut graph, &deployment())
            .unwrap_err();
        match err {
            CloudcapError::Cycle { resources, .. } => {
                assert!(resources.contains(&"A".to_string()));
                assert!(resources.contains(&"B".to_string()));
            }
            other => panic!("expected Cycle error, got {other}"),
        }
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_duplicate_ids_across_builds() {
        let first = Template::new().with_resource("Q", "AWS::SQS::Queue", Value::default());
        let second = Template::new()
            .with_resource("Q", "AWS::SQS::Queue", Value::default())
            .with_resource("R", "AWS::SQS::Queue", Value::default());
        let mut graph = ResourceGraph::new();
        let builder = ResourceGraphBuilder::new();
        builder.build(&first, &mut graph, &deployment()).unwrap();
        let err = builder.build(&second, &mut graph, &deployment()).unwrap_err();
        assert!(matches!(err, CloudcapError::DuplicateResource { ref id, .. } if id == "Q"));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_second_build_may_reference_first() {
        let first = Template::new().with_resource("Q", "AWS::SQS::Queue", Value::default());
        let second = Template::new().with_resource(
            "Fn",
            "AWS::Lambda::Function",
            Value::from(json!({"Q": {"Fn::GetAtt": ["Q", "Arn"]}})),
        );
        let mut graph = ResourceGraph::new();
        let builder = ResourceGraphBuilder::new();
        builder.build(&first, &mut graph, &deployment()).unwrap();
        builder.build(&second, &mut graph, &deployment()).unwrap();
        assert_eq!(graph.dependents("Q")[0].id, "Fn");
    }

    #[test]
    fn test_malformed_get_att() {
        let template = Template::new()
            .with_resource("A", "Test", Value::from(json!({"P": {"Fn::GetAtt": ["OnlyOne"]}})));
        let err = build(&template).unwrap_err();
        assert!(matches!(err, CloudcapError::TemplateParse { .. }));
    }

    #[test]
    fn test_implicit_references_are_opt_in() {
        let template = Template::new()
            .with_resource("Queue", "AWS::SQS::Queue", Value::default())
            .with_resource("Fn", "AWS::Lambda::Function", Value::from(json!({"Env": ["Queue"]})));

        let graph = build(&template).unwrap();
        assert_eq!(graph.edge_count(), 0);

        let mut graph = ResourceGraph::new();
        ResourceGraphBuilder::new()
            .with_implicit_references(true)
            .build(&template, &mut graph, &deployment())
            .unwrap();
        assert_eq!(graph.references()[0].kind, ReferenceKind::Implicit);
    }
}
