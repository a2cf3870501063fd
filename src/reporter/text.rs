//! Plain text report generator.

use crate::analyzer::{AnalysisReport, DeploymentOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::types::{Counterexample, Verdict};
use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};

/// Text report generator for CLI output.
pub struct TextReporter {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to list every constraint and skipped rule
    verbose: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            use_colors: config.output.colored,
            verbose: config.output.verbose,
        }
    }
}

impl ReportGenerator for TextReporter {
    fn generate(&self, report: &AnalysisReport) -> Result<String> {
        let mut output = String::new();

        output.push_str(&self.format_header(report));
        output.push('\n');

        output.push_str(&self.format_deployments(report));
        output.push('\n');

        if let Verdict::Reject(counterexample) = &report.verdict {
            output.push_str(&self.format_counterexample(counterexample));
            output.push('\n');
        }

        if self.verbose {
            for outcome in &report.deployments {
                output.push_str(&self.format_constraints(outcome));
                output.push('\n');
            }
        }

        output.push_str(&self.format_footer(report));

        Ok(output)
    }
}

impl TextReporter {
    fn section(&self, title: &str) -> String {
        let title = if self.use_colors {
            title.bright_cyan().bold().to_string()
        } else {
            title.to_string()
        };
        format!("\n{title}\n{}\n", "-".repeat(80))
    }

    fn format_header(&self, report: &AnalysisReport) -> String {
        let title = "CloudCap Capacity Check";
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        let timestamp = report
            .generated_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S");

        if self.use_colors {
            format!(
                "\n{} {} {}\n{}\n",
                title.bright_white().bold(),
                version.dimmed(),
                format!("({timestamp})").dimmed(),
                "=".repeat(80).bright_blue(),
            )
        } else {
            format!("\n{title} {version} ({timestamp})\n{}\n", "=".repeat(80))
        }
    }

    fn verdict_cell(&self, verdict: &Verdict) -> Cell {
        let cell = Cell::new(verdict.tag());
        if !self.use_colors {
            return cell;
        }
        match verdict {
            Verdict::Pass => cell.fg(Color::Green),
            Verdict::Reject(_) => cell.fg(Color::Red),
            Verdict::Unknown { .. } => cell.fg(Color::Yellow),
        }
    }

    fn format_deployments(&self, report: &AnalysisReport) -> String {
        let mut output = self.section("Deployments");

        if report.deployments.is_empty() {
            output.push_str("  No deployments in model\n");
            return output;
        }

        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Deployment", "Verdict", "Constraints", "Variables", "Skipped", "Steps", "Time"]);

        for outcome in &report.deployments {
            table.add_row(vec![
                Cell::new(outcome.deployment.to_string()),
                self.verdict_cell(&outcome.verdict),
                Cell::new(outcome.constraints.len()),
                Cell::new(outcome.variables),
                Cell::new(outcome.skipped.len()),
                Cell::new(outcome.steps),
                Cell::new(format!("{}ms", outcome.elapsed_ms)),
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn format_counterexample(&self, counterexample: &Counterexample) -> String {
        let mut output = self.section("Counterexample");

        if let Some(deployment) = &counterexample.deployment {
            output.push_str(&format!("  Deployment: {deployment}\n"));
        }
        output.push_str("  Violated:\n");
        for id in &counterexample.violated {
            let line = format!("    - {id}");
            if self.use_colors {
                output.push_str(&line.red().to_string());
            } else {
                output.push_str(&line);
            }
            output.push('\n');
        }

        if !counterexample.assignments.is_empty() {
            let mut table = Table::new();
            table
                .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Resource", "Metric", "Value"]);
            for assignment in &counterexample.assignments {
                table.add_row(vec![
                    Cell::new(&assignment.resource),
                    Cell::new(&assignment.metric),
                    Cell::new(assignment.value),
                ]);
            }
            output.push_str(&table.to_string());
            output.push('\n');
        }
        output
    }

    fn format_constraints(&self, outcome: &DeploymentOutcome) -> String {
        let mut output = self.section(&format!("Constraints ({})", outcome.deployment));

        if outcome.constraints.is_empty() {
            output.push_str("  (none)\n");
        }
        for constraint in &outcome.constraints {
            output.push_str(&format!("  {:<40} {}\n", constraint.id, constraint.expression));
        }

        if !outcome.skipped.is_empty() {
            output.push_str("\n  Skipped rules:\n");
            for skipped in &outcome.skipped {
                let line = format!("    {}/{}: {}", skipped.resource, skipped.rule, skipped.reason);
                if self.use_colors {
                    output.push_str(&line.dimmed().to_string());
                } else {
                    output.push_str(&line);
                }
                output.push('\n');
            }
        }

        if let Some(smtlib) = &outcome.smtlib {
            output.push_str("\n  SMT-LIB2 query:\n");
            for line in smtlib.lines() {
                output.push_str(&format!("    {line}\n"));
            }
        }
        output
    }

    fn format_footer(&self, report: &AnalysisReport) -> String {
        let status = match &report.verdict {
            Verdict::Pass => {
                let text = "PASS - No usage within estimates exceeds a limit";
                if self.use_colors { text.green().bold().to_string() } else { text.to_string() }
            }
            Verdict::Reject(counterexample) => {
                let text = format!("REJECT - {} constraint(s) can be violated", counterexample.violated.len());
                if self.use_colors { text.red().bold().to_string() } else { text }
            }
            Verdict::Unknown { reason } => {
                let text = format!("UNKNOWN - {reason}");
                if self.use_colors { text.yellow().bold().to_string() } else { text }
            }
        };

        format!("\n{status}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::fixtures;
    use crate::types::UnknownReason;

    fn reporter(verbose: bool) -> TextReporter {
        let mut config = Config::default();
        config.output.colored = false;
        config.output.verbose = verbose;
        TextReporter::new(&config)
    }

    #[test]
    fn test_reject_report() {
        let text = reporter(false).generate(&fixtures::rejecting_report()).unwrap();

        assert!(text.contains("CloudCap Capacity Check"));
        assert!(text.contains("us-east-1/123456789012"));
        assert!(text.contains("Counterexample"));
        assert!(text.contains("- Queue/throughput"));
        assert!(text.contains("1500"));
        assert!(text.contains("REJECT - 1 constraint(s) can be violated"));
        assert!(!text.contains("Skipped rules"));
    }

    #[test]
    fn test_verbose_lists_constraints() {
        let text = reporter(true).generate(&fixtures::passing_report()).unwrap();

        assert!(text.contains("Queue.nrequests <= 1000"));
        assert!(text.contains("Queue/fifo-inflight: condition not met"));
        assert!(!text.contains("Counterexample"));
        assert!(text.contains("PASS - "));
    }

    #[test]
    fn test_unknown_footer() {
        let mut report = fixtures::passing_report();
        report.verdict = Verdict::Unknown { reason: UnknownReason::Timeout };
        let text = reporter(false).generate(&report).unwrap();
        assert!(text.contains("UNKNOWN - solver timed out"));
    }

    #[test]
    fn test_empty_model() {
        let mut report = fixtures::passing_report();
        report.deployments.clear();
        let text = reporter(false).generate(&report).unwrap();
        assert!(text.contains("No deployments in model"));
    }
}
