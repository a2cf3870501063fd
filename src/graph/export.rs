//! Graph export functionality.
//!
//! Exports a deployment's resource graph for visualization and tooling.

use crate::error::Result;
use crate::graph::types::ResourceGraph;
use crate::types::{DeploymentId, GraphFormat};
use serde::Serialize;

/// Export the resource graphs of several deployments.
///
/// # Supported Formats
///
/// - **DOT**: Graphviz DOT format, one cluster per deployment
/// - **JSON**: Structured JSON for programmatic access
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_graph(graphs: &[(&DeploymentId, &ResourceGraph)], format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Dot => Ok(export_dot(graphs)),
        GraphFormat::Json => export_json(graphs),
    }
}

/// Export to Graphviz DOT format.
fn export_dot(graphs: &[(&DeploymentId, &ResourceGraph)]) -> String {
    let mut dot = String::new();
    dot.push_str("digraph CloudCap {\n");
    dot.push_str("    rankdir=LR;\n");
    dot.push_str("    node [shape=box, style=rounded];\n");

    for (i, (deployment, graph)) in graphs.iter().enumerate() {
        dot.push_str(&format!("\n    subgraph cluster_{i} {{\n"));
        dot.push_str(&format!("        label=\"{}\";\n", escape_dot_string(&deployment.to_string())));
        dot.push_str("        style=dashed;\n");

        for resource in graph.resources() {
            let node_id = escape_dot_string(&format!("{deployment}/{}", resource.id));
            let label = escape_dot_string(&format!("{}\\n{}", resource.id, resource.resource_type));
            dot.push_str(&format!("        \"{node_id}\" [label=\"{label}\"];\n"));
        }
        dot.push_str("    }\n");

        for reference in graph.references() {
            let from = escape_dot_string(&format!("{deployment}/{}", reference.from));
            let to = escape_dot_string(&format!("{deployment}/{}", reference.to));
            dot.push_str(&format!(
                "    \"{from}\" -> \"{to}\" [label=\"{}\"];\n",
                escape_dot_string(&reference.kind.to_string())
            ));
        }
    }

    dot.push_str("}\n");
    dot
}

/// Export to JSON format.
fn export_json(graphs: &[(&DeploymentId, &ResourceGraph)]) -> Result<String> {
    #[derive(Serialize)]
    struct JsonGraph {
        deployments: Vec<JsonDeployment>,
    }

    #[derive(Serialize)]
    struct JsonDeployment {
        region: String,
        account: String,
        nodes: Vec<JsonNode>,
        edges: Vec<JsonEdge>,
    }

    #[derive(Serialize)]
    struct JsonNode {
        id: String,
        #[serde(rename = "type")]
        resource_type: String,
    }

    #[derive(Serialize)]
    struct JsonEdge {
        from: String,
        to: String,
        kind: String,
    }

    let report = JsonGraph {
        deployments: graphs
            .iter()
            .map(|(deployment, graph)| JsonDeployment {
                region: deployment.region.to_string(),
                account: deployment.account.to_string(),
                nodes: graph
                    .resources()
                    .into_iter()
                    .map(|r| JsonNode {
                        id: r.id.clone(),
                        resource_type: r.resource_type.clone(),
                    })
                    .collect(),
                edges: graph
                    .references()
                    .into_iter()
                    .map(|r| JsonEdge {
                        from: r.from,
                        to: r.to,
                        kind: r.kind.to_string(),
                    })
                    .collect(),
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

/// Escape a string for use inside a quoted DOT string.
fn escape_dot_string(s: &str) -> String {
    s.replace('"', "\\\"")
}
