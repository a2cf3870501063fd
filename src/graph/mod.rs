//! Resource Graph Module
//!
//! This module turns a template's resource definitions into a typed,
//! reference-resolved directed graph.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────┐  GetAtt.Arn  ┌──────────────┐
//! │   Mapping    │─────────────▶│    Queue     │
//! │ (EventSource │              │ (SQS::Queue) │
//! │   Mapping)   │──┐           └──────────────┘
//! └──────────────┘  │ GetAtt.Arn ┌──────────────┐
//!                   └───────────▶│   Function   │
//!                                └──────────────┘
//! ```
//!
//! Edges point from the referencing resource to the referenced one. The
//! compiler walks them backwards (`dependents`) to aggregate usage that
//! flows into a shared resource.
//!
//! # Reference markers
//!
//! | Marker                                   | Edge kind   |
//! |------------------------------------------|-------------|
//! | `{"Ref": "Id"}`                          | `Ref`       |
//! | `{"Fn::GetAtt": ["Id", "Attr"]}`         | `GetAtt`    |
//! | `{"Fn::GetAtt": "Id.Attr"}`              | `GetAtt`    |
//! | `{"Fn::Sub": "...${Id.Attr}..."}`        | `Sub`       |
//! | resource-level `DependsOn`               | `DependsOn` |
//! | bare id string (opt-in)                  | `Implicit`  |
//!
//! # Invariants
//!
//! After a successful build every reference resolves inside the deployment
//! and the graph is acyclic.

mod builder;
mod export;
mod types;

pub use builder::ResourceGraphBuilder;
pub use export::export_graph;
pub use types::{Reference, ReferenceKind, Resource, ResourceDefinition, ResourceGraph, Template};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, DeploymentId, GraphFormat, Region, Value};
    use serde_json::json;

    fn sample() -> (DeploymentId, ResourceGraph) {
        let template = Template::new()
            .with_resource("Queue", "AWS::SQS::Queue", Value::default())
            .with_resource(
                "Fn",
                "AWS::Lambda::Function",
                Value::from(json!({"Env": {"Fn::GetAtt": ["Queue", "Arn"]}})),
            );
        let id = DeploymentId::new(Region::new("us-east-1"), Account::new("123"));
        let mut graph = ResourceGraph::new();
        ResourceGraphBuilder::new().build(&template, &mut graph, &id).unwrap();
        (id, graph)
    }

    #[test]
    fn test_graph_export_dot() {
        let (id, graph) = sample();
        let dot = export_graph(&[(&id, &graph)], GraphFormat::Dot).unwrap();
        assert!(dot.contains("digraph"));
        assert!(dot.contains("\"us-east-1/123/Fn\" -> \"us-east-1/123/Queue\""));
        assert!(dot.contains("GetAtt.Arn"));
    }

    #[test]
    fn test_graph_export_json() {
        let (id, graph) = sample();
        let json = export_graph(&[(&id, &graph)], GraphFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["deployments"][0]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["deployments"][0]["edges"][0]["to"], "Queue");
    }
}
