//! Capacity analysis.
//!
//! The analyzer runs the constraint compiler and the solver once per
//! deployment and combines the per-deployment verdicts:
//!
//! | Deployments                 | Combined verdict |
//! |-----------------------------|------------------|
//! | any REJECT                  | REJECT           |
//! | all PASS (or none at all)   | PASS             |
//! | otherwise                   | UNKNOWN          |
//!
//! A REJECT carries the counterexample of the lowest-index rejecting
//! deployment. Deployments are solved in parallel; once deployment `i`
//! rejects, solves of deployments after `i` are cancelled, which never
//! changes the combined verdict.
//!
//! # Example
//!
//! ```rust
//! use cloudcap::analyzer::Analyzer;
//! use cloudcap::model::AwsModel;
//! use cloudcap::Config;
//!
//! let analyzer = Analyzer::new(&Config::default()).unwrap();
//! let verdict = analyzer.analyze(&AwsModel::new()).unwrap();
//! assert!(verdict.is_pass());
//! ```

use crate::compiler::{ConstraintCompiler, MissingEstimatePolicy, RuleRegistry, SkippedRule};
use crate::config::Config;
use crate::error::Result;
use crate::model::{AwsModel, Deployment};
use crate::solver::{SolverConfig, SolverSession};
use crate::types::{DeploymentId, Verdict};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// A compiled constraint as shown in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintSummary {
    /// Constraint id
    pub id: String,
    /// Rendered inequality
    pub expression: String,
}

/// Result of analyzing one deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    /// Which deployment
    pub deployment: DeploymentId,
    /// Local verdict
    pub verdict: Verdict,
    /// Compiled constraints
    pub constraints: Vec<ConstraintSummary>,
    /// Number of usage variables
    pub variables: usize,
    /// Rules that produced no constraint
    pub skipped: Vec<SkippedRule>,
    /// Solver search steps
    pub steps: u64,
    /// Wall-clock time for compile and solve
    pub elapsed_ms: u64,
    /// SMT-LIB2 rendering of the query, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtlib: Option<String>,
}

/// Combined result of one `analyze` call.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Combined verdict
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Per-deployment outcomes, in model order
    pub deployments: Vec<DeploymentOutcome>,
    /// When the analysis finished
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Orchestrates compile and solve per deployment.
#[derive(Debug, Clone)]
pub struct Analyzer {
    registry: RuleRegistry,
    solver: SolverConfig,
    parallel: bool,
    missing_estimate: MissingEstimatePolicy,
    dump_smt: bool,
}

impl Analyzer {
    /// Create an analyzer from configuration (builtin rules plus custom ones).
    ///
    /// # Errors
    ///
    /// Returns `RuleDefinition` if a custom rule is malformed.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_registry(config.rule_registry()?, config))
    }

    /// Create an analyzer with an explicit rule registry.
    #[must_use]
    pub fn with_registry(registry: RuleRegistry, config: &Config) -> Self {
        Self {
            registry,
            solver: config.solver.clone(),
            parallel: config.analysis.parallel,
            missing_estimate: config.analysis.missing_estimate,
            dump_smt: false,
        }
    }

    /// Keep an SMT-LIB2 rendering of each deployment's query.
    #[must_use]
    pub fn with_smtlib(mut self, enabled: bool) -> Self {
        self.dump_smt = enabled;
        self
    }

    /// The rules in use.
    #[must_use]
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Analyze the model and return the combined verdict.
    ///
    /// # Errors
    ///
    /// Compile errors (malformed rule bound, missing estimate under the
    /// `error` policy). Solver limits are not errors; they give UNKNOWN.
    pub fn analyze(&self, model: &AwsModel) -> Result<Verdict> {
        self.analyze_report(model).map(|report| report.verdict)
    }

    /// Analyze the model and return per-deployment details.
    ///
    /// # Errors
    ///
    /// See [`Analyzer::analyze`]. When several deployments fail to compile,
    /// the error of the first one in model order is returned.
    pub fn analyze_report(&self, model: &AwsModel) -> Result<AnalysisReport> {
        tracing::info!(deployments = model.len(), parallel = self.parallel, "Starting analysis");
        let started = Instant::now();

        // Lowest index of a rejecting deployment so far.
        let reject_floor = AtomicUsize::new(usize::MAX);
        let run = |(index, deployment): (usize, &Deployment)| {
            let cancel = || reject_floor.load(Ordering::Relaxed) < index;
            let outcome = self.analyze_deployment(deployment, &cancel);
            if matches!(&outcome, Ok(o) if o.verdict.is_reject()) {
                reject_floor.fetch_min(index, Ordering::Relaxed);
            }
            outcome
        };

        let results: Vec<Result<DeploymentOutcome>> = if self.parallel {
            model.deployments().par_iter().enumerate().map(run).collect()
        } else {
            model.deployments().iter().enumerate().map(run).collect()
        };
        let deployments = results.into_iter().collect::<Result<Vec<_>>>()?;

        let verdict = combine(&deployments);
        tracing::info!(
            verdict = verdict.tag(),
            elapsed_ms = elapsed_ms(started),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            verdict,
            deployments,
            generated_at: chrono::Utc::now(),
        })
    }

    fn analyze_deployment(&self, deployment: &Deployment, cancel: &dyn Fn() -> bool) -> Result<DeploymentOutcome> {
        let started = Instant::now();
        tracing::debug!(deployment = %deployment.id(), resources = deployment.resources().len(), "Analyzing deployment");

        let compiled = ConstraintCompiler::new(&self.registry)
            .with_missing_estimate(self.missing_estimate)
            .compile(deployment)?;

        let mut session = SolverSession::open(self.solver.clone()).with_cancel(cancel);
        session.load(&compiled);
        let smtlib = self.dump_smt.then(|| session.to_smtlib());
        let verdict = Verdict::from(session.check());
        let steps = session.steps();
        drop(session);

        tracing::debug!(
            deployment = %deployment.id(),
            verdict = verdict.tag(),
            constraints = compiled.constraints.len(),
            steps,
            "Deployment analyzed"
        );

        Ok(DeploymentOutcome {
            deployment: deployment.id().clone(),
            verdict,
            constraints: compiled
                .constraints
                .iter()
                .map(|c| ConstraintSummary {
                    id: c.id.clone(),
                    expression: c.render(&compiled.variables),
                })
                .collect(),
            variables: compiled.variables.len(),
            skipped: compiled.skipped,
            steps,
            elapsed_ms: elapsed_ms(started),
            smtlib,
        })
    }
}

/// Combine per-deployment verdicts, in model order.
#[must_use]
pub fn combine(outcomes: &[DeploymentOutcome]) -> Verdict {
    if let Some(rejected) = outcomes.iter().find(|o| o.verdict.is_reject()) {
        if let Verdict::Reject(cex) = &rejected.verdict {
            let mut cex = cex.clone();
            cex.deployment = Some(rejected.deployment.clone());
            return Verdict::Reject(cex);
        }
    }
    outcomes
        .iter()
        .find(|o| o.verdict.is_unknown())
        .map_or(Verdict::Pass, |o| o.verdict.clone())
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
