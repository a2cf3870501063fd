//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `check`: Verify templates against capacity limits for the given estimates
//! - `estimates`: Write an estimate-file skeleton for templates
//! - `graph`: Export the resource graph
//! - `rules`: List the active capacity rules
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Check a stack against usage estimates
//! cloudcap check stack.yaml --estimates usage.yaml
//!
//! # Check the same stack in another region, JSON report
//! cloudcap check stack.yaml -e usage.yaml --region eu-west-1 --format json
//!
//! # Generate an estimate skeleton to fill in
//! cloudcap estimates stack.yaml --output usage.yaml
//!
//! # Export the resource graph
//! cloudcap graph stack.yaml --format dot --output stack.dot
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning                                        |
//! |------|------------------------------------------------|
//! | 0    | PASS                                           |
//! | 1    | REJECT                                         |
//! | 2    | UNKNOWN                                        |
//! | 3    | Model build failed (reference, cycle, duplicate) |
//! | 4+   | Other errors (parse, estimates, config, I/O)   |

use crate::types::{GraphFormat, ReportFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CloudCap - capacity verifier for CloudFormation templates.
#[derive(Parser, Debug)]
#[command(
    name = "cloudcap",
    author,
    version,
    about = "Capacity verifier for CloudFormation templates",
    long_about = "CloudCap builds a resource graph from CloudFormation templates, compiles \
                  service limits into integer constraints over declared usage estimates, and \
                  proves that no usage within the estimates exceeds a limit. When a limit can \
                  be exceeded it reports a concrete counterexample."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "CLOUDCAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify templates against capacity limits
    #[command(visible_alias = "c")]
    Check(CheckArgs),

    /// Write an estimate-file skeleton for templates
    Estimates(EstimatesArgs),

    /// Export the resource graph
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// List the active capacity rules
    Rules,

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the check command.
#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Template files (YAML or JSON); all are merged into one deployment
    #[arg(value_name = "TEMPLATE", required = true)]
    pub templates: Vec<PathBuf>,

    /// Usage estimate file
    #[arg(short, long, value_name = "FILE")]
    pub estimates: Option<PathBuf>,

    /// Deployment region (overrides config)
    #[arg(long)]
    pub region: Option<String>,

    /// Deployment account id (overrides config)
    #[arg(long)]
    pub account: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: ReportFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Solver wall-clock limit per deployment, in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Solver step limit per deployment
    #[arg(long, value_name = "N")]
    pub max_steps: Option<u64>,

    /// Include the SMT-LIB2 rendering of each query in the report
    #[arg(long)]
    pub dump_smt: bool,

    /// Solve deployments one after another
    #[arg(long)]
    pub sequential: bool,

    /// Fail when a rule has no usage estimate instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Treat bare strings equal to a resource id as references
    #[arg(long)]
    pub implicit_references: bool,

    /// List every constraint and skipped rule in the text report
    #[arg(long)]
    pub verbose_report: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for the estimates command.
#[derive(Args, Debug)]
pub struct EstimatesArgs {
    /// Template files (YAML or JSON)
    #[arg(value_name = "TEMPLATE", required = true)]
    pub templates: Vec<PathBuf>,

    /// Existing estimate file whose values are kept in the skeleton
    #[arg(short, long, value_name = "FILE")]
    pub estimates: Option<PathBuf>,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the graph command.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Template files (YAML or JSON)
    #[arg(value_name = "TEMPLATE", required = true)]
    pub templates: Vec<PathBuf>,

    /// Output format for the graph
    #[arg(short, long, default_value = "dot", value_enum)]
    pub format: GraphFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Treat bare strings equal to a resource id as references
    #[arg(long)]
    pub implicit_references: bool,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "cloudcap.yaml")]
    pub config: PathBuf,
}
