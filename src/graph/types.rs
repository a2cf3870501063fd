//! Graph type definitions.
//!
//! This module defines the core types of the resource graph:
//! - `Template`: the builder's input, resource id → definition
//! - `Resource`: a typed node with its raw properties
//! - `Reference` / `ReferenceKind`: directed edges between resources
//! - `ResourceGraph`: the petgraph-backed graph of one deployment

use crate::types::{ResourceId, Value};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

/// One resource entry of a template, before graph construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Resource type (e.g. `AWS::SQS::Queue`)
    pub resource_type: String,
    /// Raw nested properties, possibly containing reference markers
    #[serde(default)]
    pub properties: Value,
    /// Explicit resource-level dependencies
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
}

/// The input contract of the graph builder: a mapping of resource id to
/// definition, plus the names of declared template parameters.
///
/// `Ref`s to declared parameters are values, not resource references.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    /// Declared parameter names
    #[serde(default)]
    pub parameters: BTreeSet<String>,
    /// Resource definitions by logical id
    pub resources: BTreeMap<ResourceId, ResourceDefinition>,
}

impl Template {
    /// Create an empty template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource (builder style).
    #[must_use]
    pub fn with_resource(mut self, id: &str, resource_type: &str, properties: Value) -> Self {
        self.resources.insert(
            id.to_string(),
            ResourceDefinition {
                resource_type: resource_type.to_string(),
                properties,
                depends_on: Vec::new(),
            },
        );
        self
    }

    /// Declare a parameter name (builder style).
    #[must_use]
    pub fn with_parameter(mut self, name: &str) -> Self {
        self.parameters.insert(name.to_string());
        self
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the template declares no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// A typed resource node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// Logical id, unique within the deployment
    pub id: ResourceId,
    /// Resource type
    pub resource_type: String,
    /// Raw nested properties
    pub properties: Value,
}

impl Resource {
    /// Look up a property by key path.
    #[must_use]
    pub fn property<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        self.properties.get_path(path)
    }
}

/// How one resource refers to another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `{"Ref": "Id"}`
    Ref,
    /// `{"Fn::GetAtt": ["Id", "Attr"]}`
    GetAtt {
        /// The attribute read from the target
        attribute: String,
    },
    /// A `${Id}` or `${Id.Attr}` placeholder inside `Fn::Sub`
    Sub,
    /// Resource-level `DependsOn`
    DependsOn,
    /// A bare string equal to another resource's id
    Implicit,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref => write!(f, "Ref"),
            Self::GetAtt { attribute } => write!(f, "GetAtt.{attribute}"),
            Self::Sub => write!(f, "Sub"),
            Self::DependsOn => write!(f, "DependsOn"),
            Self::Implicit => write!(f, "implicit"),
        }
    }
}

/// A directed edge `from → to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// The referencing resource
    pub from: ResourceId,
    /// The referenced resource
    pub to: ResourceId,
    /// The marker that produced the edge
    pub kind: ReferenceKind,
}

/// The resource graph of one deployment.
///
/// Wraps a petgraph directed graph; edges point from referencer to
/// referenced. Nodes are inserted in id order by the builder, which keeps
/// every query below deterministic.
///
/// ```text
/// ResourceGraph
/// ├── inner: DiGraph<Resource, ReferenceKind>
/// └── node_index: HashMap<ResourceId, NodeIndex>
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    inner: DiGraph<Resource, ReferenceKind>,
    node_index: HashMap<ResourceId, NodeIndex>,
}

impl ResourceGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a resource with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Insert a resource node. The caller guarantees the id is new.
    pub(crate) fn insert_resource(&mut self, resource: Resource) {
        let id = resource.id.clone();
        let idx = self.inner.add_node(resource);
        self.node_index.insert(id, idx);
    }

    /// Insert an edge between two existing resources.
    ///
    /// Returns `false` if either endpoint is missing or the identical edge
    /// already exists.
    pub(crate) fn insert_reference(&mut self, reference: &Reference) -> bool {
        let (Some(&from), Some(&to)) = (
            self.node_index.get(&reference.from),
            self.node_index.get(&reference.to),
        ) else {
            return false;
        };
        let duplicate = self
            .inner
            .edges_connecting(from, to)
            .any(|e| *e.weight() == reference.kind);
        if duplicate {
            return false;
        }
        self.inner.add_edge(from, to, reference.kind.clone());
        true
    }

    /// Get a resource by id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.node_index.get(id).map(|&idx| &self.inner[idx])
    }

    /// All resources, ordered by id.
    #[must_use]
    pub fn resources(&self) -> Vec<&Resource> {
        let mut all: Vec<&Resource> = self.inner.node_weights().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// All references, ordered by (from, to, kind).
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let mut refs: Vec<Reference> = self
            .inner
            .edge_references()
            .map(|e| Reference {
                from: self.inner[e.source()].id.clone(),
                to: self.inner[e.target()].id.clone(),
                kind: e.weight().clone(),
            })
            .collect();
        refs.sort();
        refs
    }

    /// Resources that reference `id`, each listed once, ordered by id.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&Resource> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Resources referenced by `id`, each listed once, ordered by id.
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<&Resource> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&Resource> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        let unique: BTreeMap<&str, &Resource> = self
            .inner
            .neighbors_directed(idx, direction)
            .map(|n| (self.inner[n].id.as_str(), &self.inner[n]))
            .collect();
        unique.into_values().collect()
    }

    /// Number of resources.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of references.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Find a reference cycle.
    ///
    /// Returns the resources along one cycle, starting and ending at the
    /// smallest id involved (`[A, B, A]`; a self-reference yields `[A, A]`).
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<ResourceId>> {
        let cyclic: Vec<Vec<NodeIndex>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.inner.contains_edge(scc[0], scc[0]))
            .collect();

        let scc = cyclic
            .into_iter()
            .min_by(|a, b| self.min_id(a).cmp(self.min_id(b)))?;
        let members: BTreeSet<NodeIndex> = scc.iter().copied().collect();
        let start = *scc
            .iter()
            .min_by(|a, b| self.inner[**a].id.cmp(&self.inner[**b].id))?;

        if self.inner.contains_edge(start, start) {
            let id = self.inner[start].id.clone();
            return Some(vec![id.clone(), id]);
        }

        // Shortest path back to `start` inside the component.
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let mut successors: Vec<NodeIndex> = self
                .inner
                .neighbors_directed(node, Direction::Outgoing)
                .filter(|n| members.contains(n))
                .collect();
            successors.sort_by(|a, b| self.inner[*a].id.cmp(&self.inner[*b].id));
            for next in successors {
                if next == start {
                    let mut chain = Vec::new();
                    let mut cursor = node;
                    while cursor != start {
                        chain.push(self.inner[cursor].id.clone());
                        match parent.get(&cursor) {
                            Some(&p) => cursor = p,
                            None => break,
                        }
                    }
                    chain.reverse();
                    let start_id = self.inner[start].id.clone();
                    let mut path = vec![start_id.clone()];
                    path.extend(chain);
                    path.push(start_id);
                    return Some(path);
                }
                if !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn min_id(&self, nodes: &[NodeIndex]) -> &str {
        nodes
            .iter()
            .map(|n| self.inner[*n].id.as_str())
            .min()
            .unwrap_or_default()
    }

    /// Resource ids ordered so that every resource comes after the resources
    /// it references. `None` if the graph is cyclic.
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<ResourceId>> {
        let order = toposort(&self.inner, None).ok()?;
        Some(
            order
                .into_iter()
                .rev()
                .map(|idx| self.inner[idx].id.clone())
                .collect(),
        )
    }
}
