//! Deployment model.
//!
//! An [`AwsModel`] owns a set of [`Deployment`]s, each a resource graph
//! scoped to one (region, account) pair together with the usage estimates
//! declared for its resources.
//!
//! The model is built up front by the caller (ingesting templates, declaring
//! estimates) and then handed to the analyzer by shared reference, so it
//! cannot change while an analysis is running.
//!
//! # Example
//!
//! ```rust
//! use cloudcap::graph::Template;
//! use cloudcap::model::AwsModel;
//! use cloudcap::types::{Account, Region, UsageEstimate, Value};
//!
//! let mut model = AwsModel::new();
//! let deployment = model
//!     .add_deployment(Region::new("us-east-1"), Account::new("123"))
//!     .unwrap();
//! deployment
//!     .ingest(&Template::new().with_resource("Q1", "Queue", Value::default()))
//!     .unwrap();
//! deployment.set_estimate("Q1", "throughput", UsageEstimate::up_to(500));
//! assert_eq!(model.len(), 1);
//! ```

mod arn;

pub use arn::arn_for;

use crate::error::Result;
use crate::graph::{Resource, ResourceGraph, ResourceGraphBuilder, Template};
use crate::types::{Account, DeploymentId, Region, UsageEstimate, UsageEstimates};

/// A resource graph scoped to one region and account.
#[derive(Debug, Clone)]
pub struct Deployment {
    id: DeploymentId,
    graph: ResourceGraph,
    estimates: UsageEstimates,
    builder: ResourceGraphBuilder,
}

impl Deployment {
    /// Create an empty deployment.
    #[must_use]
    pub fn new(region: Region, account: Account) -> Self {
        let id = DeploymentId::new(region, account);
        tracing::debug!(deployment = %id, "New deployment");
        Self {
            id,
            graph: ResourceGraph::new(),
            estimates: UsageEstimates::new(),
            builder: ResourceGraphBuilder::new(),
        }
    }

    /// Use the given graph builder for subsequent ingests.
    #[must_use]
    pub fn with_builder(mut self, builder: ResourceGraphBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Replace the graph builder used for subsequent ingests.
    pub fn set_builder(&mut self, builder: ResourceGraphBuilder) {
        self.builder = builder;
    }

    /// The deployment's identity.
    #[must_use]
    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    /// The deployment's region.
    #[must_use]
    pub fn region(&self) -> &Region {
        &self.id.region
    }

    /// The deployment's account.
    #[must_use]
    pub fn account(&self) -> &Account {
        &self.id.account
    }

    /// Add a template's resources to this deployment.
    ///
    /// The ingest is all-or-nothing: on error the deployment is unchanged.
    ///
    /// # Errors
    ///
    /// `DuplicateResource`, `Reference`, `Cycle` or `TemplateParse`, see
    /// [`ResourceGraphBuilder::build`].
    pub fn ingest(&mut self, template: &Template) -> Result<usize> {
        self.builder.build(template, &mut self.graph, &self.id)
    }

    /// The resource graph.
    #[must_use]
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// All resources, ordered by id.
    #[must_use]
    pub fn resources(&self) -> Vec<&Resource> {
        self.graph.resources()
    }

    /// Look up a resource by logical id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.graph.resource(id)
    }

    /// Resources referencing `id`.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&Resource> {
        self.graph.dependents(id)
    }

    /// Resources `id` references.
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<&Resource> {
        self.graph.dependencies(id)
    }

    /// Resource ids ordered so that referenced resources come first.
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<String>> {
        self.graph.topological_order()
    }

    /// ARN of a resource in this deployment.
    #[must_use]
    pub fn arn(&self, resource: &Resource) -> String {
        arn_for(&self.id, resource)
    }

    /// Find a resource by its ARN.
    #[must_use]
    pub fn resource_by_arn(&self, arn: &str) -> Option<&Resource> {
        self.graph
            .resources()
            .into_iter()
            .find(|r| arn_for(&self.id, r) == arn)
    }

    /// Declare (or replace) a usage estimate.
    pub fn set_estimate(&mut self, resource: &str, metric: &str, estimate: UsageEstimate) {
        if !self.graph.contains(resource) {
            tracing::warn!(
                deployment = %self.id,
                resource = %resource,
                "Estimate declared for a resource not (yet) in the deployment"
            );
        }
        self.estimates.insert(resource, metric, estimate);
    }

    /// Declare a batch of usage estimates.
    pub fn add_estimates(&mut self, estimates: UsageEstimates) {
        tracing::debug!(deployment = %self.id, count = estimates.len(), "Adding usage estimates");
        self.estimates.extend(estimates);
    }

    /// Declared usage estimates.
    #[must_use]
    pub fn estimates(&self) -> &UsageEstimates {
        &self.estimates
    }
}

/// A collection of deployments, unique by (region, account).
#[derive(Debug, Clone, Default)]
pub struct AwsModel {
    deployments: Vec<Deployment>,
}

impl AwsModel {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new, empty deployment and return it for ingestion.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateDeployment` if the pair is already present.
    pub fn add_deployment(&mut self, region: Region, account: Account) -> Result<&mut Deployment> {
        self.insert_deployment(Deployment::new(region, account))
    }

    /// Add a prepared deployment.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateDeployment` if its pair is already present.
    pub fn insert_deployment(&mut self, deployment: Deployment) -> Result<&mut Deployment> {
        if self.deployment(deployment.id()).is_some() {
            return Err(crate::err!(DuplicateDeployment {
                deployment: deployment.id().to_string(),
            }));
        }
        self.deployments.push(deployment);
        let last = self.deployments.len() - 1;
        Ok(&mut self.deployments[last])
    }

    /// Look up a deployment.
    #[must_use]
    pub fn deployment(&self, id: &DeploymentId) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.id() == id)
    }

    /// Look up a deployment mutably.
    pub fn deployment_mut(&mut self, id: &DeploymentId) -> Option<&mut Deployment> {
        self.deployments.iter_mut().find(|d| d.id() == id)
    }

    /// All deployments, in insertion order.
    #[must_use]
    pub fn deployments(&self) -> &[Deployment] {
        &self.deployments
    }

    /// Find a resource by ARN across all deployments.
    #[must_use]
    pub fn resource_by_arn(&self, arn: &str) -> Option<(&Deployment, &Resource)> {
        self.deployments
            .iter()
            .find_map(|d| d.resource_by_arn(arn).map(|r| (d, r)))
    }

    /// Number of deployments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    /// Whether the model has no deployments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}
