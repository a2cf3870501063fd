//! # CloudCap
//!
//! A capacity verifier for AWS CloudFormation templates.
//!
//! CloudCap builds a typed resource graph from a template, compiles per-service
//! limits into integer constraints over declared usage estimates, and asks a
//! bounded solver whether any usage within the estimates can exceed a limit.
//!
//! ## Features
//!
//! - **Template parsing**: YAML and JSON, including YAML short-form intrinsics
//! - **Resource graph**: `Ref`, `Fn::GetAtt`, `Fn::Sub` and `DependsOn` edges
//!   with reference and cycle validation
//! - **Constraint compilation**: per-type rules with `NONE`, `SUM` and `MAX`
//!   aggregation over dependents, extendable from configuration
//! - **Verdicts**: PASS, REJECT with a concrete counterexample, or UNKNOWN
//!   when the solver runs out of time or steps
//! - **Multiple output formats**: plain text and JSON reports, DOT and JSON
//!   graph exports
//!
//! ## Example
//!
//! ```rust,no_run
//! use cloudcap::{Checker, Config, ReportFormat};
//! use cloudcap::reporter::Reporter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let checker = Checker::new(config.clone());
//!
//!     let report = checker.check(&["stack.yaml"], Some("usage.yaml".as_ref())).await?;
//!     println!("{}", Reporter::new(&config).generate(&report, ReportFormat::Text)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod analyzer;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod parser;
pub mod reporter;
pub mod scanner;
pub mod solver;
pub mod types;

// Re-export commonly used types at crate root
pub use analyzer::{AnalysisReport, Analyzer};
pub use compiler::{ConstraintCompiler, RuleRegistry};
pub use config::Config;
pub use error::{CloudcapError, Result};
pub use graph::Template;
pub use model::{AwsModel, Deployment};
pub use types::{Counterexample, ReportFormat, UnknownReason, UsageEstimate, Verdict};

use graph::ResourceGraphBuilder;
use parser::{EstimateFile, TemplateParser};
use std::path::Path;

/// Main orchestrator that turns files on disk into a verdict.
///
/// The `Checker` is the primary entry point for using CloudCap as a library.
/// It handles:
/// - Loading and merging template files
/// - Building the model for the configured deployment
/// - Attaching usage estimates
/// - Running the analyzer
///
/// # Example
///
/// ```rust,no_run
/// use cloudcap::{Checker, Config};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let checker = Checker::new(Config::default());
///     let model = checker.build_model(&["network.yaml", "workers.yaml"], None).await?;
///
///     println!("Found {} resources", model.deployments()[0].resources().len());
///     Ok(())
/// }
/// ```
pub struct Checker {
    config: Config,
    dump_smt: bool,
}

impl Checker {
    /// Create a new checker with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config, dump_smt: false }
    }

    /// Include SMT-LIB2 renderings in the reports.
    #[must_use]
    pub fn with_smtlib(mut self, enabled: bool) -> Self {
        self.dump_smt = enabled;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load template files and merge them into one template.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if two files
    /// define the same logical id.
    pub async fn load_templates<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Template> {
        let parser = TemplateParser::new();
        let mut merged = Template::new();

        for path in paths {
            let path = path.as_ref();
            tracing::info!(path = %path.display(), "Loading template");
            let template = parser.parse_file(path).await?;

            if let Some(id) = template.resources.keys().find(|id| merged.resources.contains_key(*id)) {
                let deployment = types::DeploymentId::new(self.config.deployment.region(), self.config.deployment.account());
                return Err(crate::err!(DuplicateResource {
                    deployment: deployment.to_string(),
                    id: id.clone(),
                }));
            }
            merged.parameters.extend(template.parameters);
            merged.resources.extend(template.resources);
        }

        tracing::debug!(files = paths.len(), resources = merged.len(), "Templates merged");
        Ok(merged)
    }

    /// Build a single-deployment model from template files and an optional
    /// estimate file.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the resource graph is invalid.
    pub async fn build_model<P: AsRef<Path>>(&self, templates: &[P], estimates: Option<&Path>) -> Result<AwsModel> {
        let template = self.load_templates(templates).await?;

        let mut model = AwsModel::new();
        let builder = ResourceGraphBuilder::new().with_implicit_references(self.config.graph.implicit_references);
        let deployment = model.add_deployment(self.config.deployment.region(), self.config.deployment.account())?;
        deployment.set_builder(builder);
        deployment.ingest(&template)?;

        if let Some(path) = estimates {
            tracing::info!(path = %path.display(), "Loading estimates");
            EstimateFile::load(path).await?.apply_to(&mut model);
        }

        Ok(model)
    }

    /// Load, build and analyze in one call.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be built or compiled. Solver
    /// limits are not errors; they yield an UNKNOWN verdict.
    pub async fn check<P: AsRef<Path>>(&self, templates: &[P], estimates: Option<&Path>) -> Result<AnalysisReport> {
        let model = self.build_model(templates, estimates).await?;
        self.analyze(&model)
    }

    /// Analyze an already built model.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule registry is invalid or compilation fails.
    pub fn analyze(&self, model: &AwsModel) -> Result<AnalysisReport> {
        let analyzer = Analyzer::new(&self.config)?.with_smtlib(self.dump_smt);
        analyzer.analyze_report(model)
    }
}
