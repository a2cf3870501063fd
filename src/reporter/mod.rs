//! Report generation module.
//!
//! This module renders an [`AnalysisReport`] in multiple formats:
//! - Text: Human-readable CLI output with tables
//! - JSON: Machine-readable structured output
//!
//! # Example
//!
//! ```rust,no_run
//! use cloudcap::analyzer::Analyzer;
//! use cloudcap::model::AwsModel;
//! use cloudcap::reporter::Reporter;
//! use cloudcap::types::ReportFormat;
//! use cloudcap::Config;
//!
//! let config = Config::default();
//! let report = Analyzer::new(&config)?.analyze_report(&AwsModel::new())?;
//! let text = Reporter::new(&config).generate(&report, ReportFormat::Text)?;
//! # Ok::<(), cloudcap::CloudcapError>(())
//! ```

mod json;
mod text;

use crate::analyzer::AnalysisReport;
use crate::config::Config;
use crate::error::Result;
use crate::types::ReportFormat;

pub use json::JsonReporter;
pub use text::TextReporter;

/// Report generator that supports multiple output formats.
pub struct Reporter {
    config: Config,
}

impl Reporter {
    /// Create a new reporter with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Generate a report in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if report generation fails.
    pub fn generate(&self, report: &AnalysisReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => JsonReporter::new(&self.config).generate(report),
            ReportFormat::Text => TextReporter::new(&self.config).generate(report),
        }
    }
}

/// Trait for report generators.
pub trait ReportGenerator {
    /// Generate a report from analysis results.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    fn generate(&self, report: &AnalysisReport) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::analyzer::{AnalysisReport, ConstraintSummary, DeploymentOutcome};
    use crate::compiler::{SkipReason, SkippedRule};
    use crate::types::{Account, Assignment, Counterexample, DeploymentId, Region, Verdict};

    pub(crate) fn deployment_id() -> DeploymentId {
        DeploymentId::new(Region::new("us-east-1"), Account::new("123456789012"))
    }

    pub(crate) fn rejecting_report() -> AnalysisReport {
        let counterexample = Counterexample {
            deployment: Some(deployment_id()),
            assignments: vec![Assignment {
                resource: "Queue".to_string(),
                metric: "nrequests".to_string(),
                value: 1500,
            }],
            violated: vec!["Queue/throughput".to_string()],
        };
        AnalysisReport {
            verdict: Verdict::Reject(counterexample.clone()),
            deployments: vec![DeploymentOutcome {
                deployment: deployment_id(),
                verdict: Verdict::Reject(counterexample),
                constraints: vec![ConstraintSummary {
                    id: "Queue/throughput".to_string(),
                    expression: "Queue.nrequests <= 1000".to_string(),
                }],
                variables: 1,
                skipped: vec![SkippedRule {
                    resource: "Queue".to_string(),
                    rule: "fifo-inflight".to_string(),
                    reason: SkipReason::ConditionFalse,
                }],
                steps: 1,
                elapsed_ms: 0,
                smtlib: None,
            }],
            generated_at: chrono::Utc::now(),
        }
    }

    pub(crate) fn passing_report() -> AnalysisReport {
        let mut report = rejecting_report();
        report.verdict = Verdict::Pass;
        report.deployments[0].verdict = Verdict::Pass;
        report
    }
}
