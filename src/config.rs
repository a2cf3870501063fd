//! Configuration module for CloudCap.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`cloudcap.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # cloudcap.yaml
//!
//! # Solver limits
//! solver:
//!   timeout_ms: 10000
//!   max_steps: 1000000
//!
//! # Analysis options
//! analysis:
//!   parallel: true
//!   missing_estimate: skip   # or: error
//!
//! # Graph building
//! graph:
//!   implicit_references: false
//!
//! # Output options
//! output:
//!   colored: true
//!   verbose: false
//!   pretty: true
//!
//! # Target deployment
//! deployment:
//!   region: ${AWS_REGION}   # Environment variable expansion
//!   account: "123456789012"
//!
//! # Custom capacity rules, keyed by resource type
//! rules:
//!   AWS::ApiGateway::RestApi:
//!     - id: throttle
//!       metric: nrequests
//!       bound: { literal: 5000 }
//!       aggregation: sum
//! ```

use crate::compiler::{MissingEstimatePolicy, Rule, RuleRegistry};
use crate::error::{CloudcapError, Result};
use crate::solver::SolverConfig;
use crate::types::{Account, Region};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// Analysis options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Solve deployments in parallel.
    pub parallel: bool,

    /// What to do when a rule needs an estimate that was not declared.
    pub missing_estimate: MissingEstimatePolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            missing_estimate: MissingEstimatePolicy::Skip,
        }
    }
}

/// Graph building options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GraphOptions {
    /// Treat bare string mentions of another resource id as references.
    pub implicit_references: bool,
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Use colored output.
    pub colored: bool,

    /// Verbose output mode (list every constraint).
    pub verbose: bool,

    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            colored: true,
            verbose: false,
            pretty: true,
        }
    }
}

/// Default deployment for templates given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// AWS region.
    pub region: String,

    /// AWS account id.
    pub account: String,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account: "123456789012".to_string(),
        }
    }
}

impl DeploymentOptions {
    /// The configured region.
    #[must_use]
    pub fn region(&self) -> Region {
        Region::new(&self.region)
    }

    /// The configured account.
    #[must_use]
    pub fn account(&self) -> Account {
        Account::new(&self.account)
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Solver limits
    pub solver: SolverConfig,

    /// Analysis options
    pub analysis: AnalysisOptions,

    /// Graph building options
    pub graph: GraphOptions,

    /// Output options
    pub output: OutputOptions,

    /// Default deployment
    pub deployment: DeploymentOptions,

    /// Custom rules by resource type; override builtins with the same id
    pub rules: BTreeMap<String, Vec<Rule>>,
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value is out of range.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        // An empty or comment-only document is the default configuration.
        let config: Config = match serde_yaml::from_str::<Option<Config>>(&expanded) {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                return Err(CloudcapError::config_parse(e.to_string(), Some(Box::new(e)), file!(), line!()));
            }
        };
        config.validate()?;

        tracing::debug!(
            timeout_ms = config.solver.timeout_ms,
            max_steps = config.solver.max_steps,
            custom_rules = config.rules.values().map(Vec::len).sum::<usize>(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound`, `Io` or a parse error.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(crate::err!(FileNotFound { path: path.to_path_buf() }));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CloudcapError::io(path, e, file!(), line!()))?;
        Self::from_yaml(&content)
    }

    /// Check values that parse but make no sense.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValue` or `RuleDefinition`.
    pub fn validate(&self) -> Result<()> {
        if self.solver.max_steps == 0 {
            return Err(crate::err!(ConfigValue {
                key: "solver.max_steps".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if self.deployment.region.trim().is_empty() {
            return Err(crate::err!(ConfigValue {
                key: "deployment.region".to_string(),
                message: "must not be empty".to_string(),
            }));
        }
        if self.deployment.account.trim().is_empty() {
            return Err(crate::err!(ConfigValue {
                key: "deployment.account".to_string(),
                message: "must not be empty".to_string(),
            }));
        }
        for rule in self.rules.values().flatten() {
            rule.validate()?;
        }
        Ok(())
    }

    /// The builtin rules overlaid with the configured ones.
    ///
    /// # Errors
    ///
    /// Returns `RuleDefinition` if a custom rule is malformed.
    pub fn rule_registry(&self) -> Result<RuleRegistry> {
        let mut registry = RuleRegistry::builtin();
        registry.extend(&self.rules)?;
        Ok(registry)
    }

    /// Merge `check` command arguments into the configuration.
    pub fn merge_check_args(&mut self, args: &crate::cli::CheckArgs) {
        if let Some(region) = &args.region {
            self.deployment.region.clone_from(region);
        }
        if let Some(account) = &args.account {
            self.deployment.account.clone_from(account);
        }
        if let Some(timeout_ms) = args.timeout_ms {
            self.solver.timeout_ms = timeout_ms;
        }
        if let Some(max_steps) = args.max_steps {
            self.solver.max_steps = max_steps;
        }
        if args.sequential {
            self.analysis.parallel = false;
        }
        if args.strict {
            self.analysis.missing_estimate = MissingEstimatePolicy::Error;
        }
        if args.implicit_references {
            self.graph.implicit_references = true;
        }
        if args.verbose_report {
            self.output.verbose = true;
        }
        if args.no_color {
            self.output.colored = false;
        }
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# CloudCap Configuration File

# Solver limits (per deployment)
solver:
  # Wall-clock limit in milliseconds; exceeding it yields UNKNOWN
  timeout_ms: 10000

  # Search step limit; exceeding it yields UNKNOWN
  max_steps: 1000000

# Analysis options
analysis:
  # Solve deployments in parallel
  parallel: true

  # What to do when a rule needs an undeclared estimate: skip | error
  missing_estimate: skip

# Graph building
graph:
  # Treat any string equal to another resource id as a reference
  implicit_references: false

# Output options
output:
  # Use colored output in terminal
  colored: true

  # List every compiled constraint
  verbose: false

  # Pretty-print JSON output
  pretty: true

# Deployment used for templates given on the command line
deployment:
  region: us-east-1
  account: "123456789012"
  # region: ${AWS_REGION}

# Custom capacity rules, keyed by resource type.
# A rule with the same id as a builtin rule replaces it.
rules: {}
  # AWS::ApiGateway::RestApi:
  #   - id: throttle
  #     metric: nrequests
  #     comparison: le
  #     bound: { literal: 5000 }
  #     aggregation: sum
  #
  # AWS::Kinesis::Stream:
  #   - id: records
  #     metric: records
  #     bound:
  #       product:
  #         - literal: 1000
  #         - property: { path: ShardCount, default: 1 }
  #     aggregation: sum
  #     when:
  #       property_absent: { path: StreamModeDetails }
"#
        .to_string()
    }
}

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex"));

static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex"));

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unset variables are left as is.
fn expand_env_vars(content: &str) -> String {
    let lookup = |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    };
    let braced = BRACED_VAR.replace_all(content, lookup);
    BARE_VAR.replace_all(&braced, lookup).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.analysis.parallel);
        assert_eq!(config.analysis.missing_estimate, MissingEstimatePolicy::Skip);
        assert_eq!(config.solver.timeout_ms, 10_000);
        assert!(!config.graph.implicit_references);
        assert_eq!(config.deployment.region, "us-east-1");
    }

    #[test]
    fn test_config_from_yaml_nested() {
        let yaml = r#"
solver:
  timeout_ms: 250
analysis:
  parallel: false
  missing_estimate: error
graph:
  implicit_references: true
output:
  colored: false
deployment:
  region: eu-west-1
  account: "42"
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.solver.timeout_ms, 250);
        assert_eq!(config.solver.max_steps, 1_000_000);
        assert!(!config.analysis.parallel);
        assert_eq!(config.analysis.missing_estimate, MissingEstimatePolicy::Error);
        assert!(config.graph.implicit_references);
        assert!(!config.output.colored);
        assert!(config.output.pretty);
        assert_eq!(config.deployment.region(), Region::new("eu-west-1"));
    }

    #[test]
    fn test_custom_rules_override_builtins() {
        let yaml = r"
rules:
  AWS::ApiGateway::RestApi:
    - id: throttle
      metric: nrequests
      bound: { literal: 5000 }
      aggregation: sum
  Custom::Widget:
    - id: spin
      metric: rpm
      comparison: lt
      bound: { literal: 60 }
";
        let config = Config::from_yaml(yaml).unwrap();
        let registry = config.rule_registry().unwrap();
        let api = registry.rules_for("AWS::ApiGateway::RestApi").unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].summary(), "SUM(nrequests) <= 5000");
        assert_eq!(registry.rules_for("Custom::Widget").unwrap()[0].summary(), "rpm < 60");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_yaml("solver:\n  max_steps: 0\n").is_err());
        assert!(Config::from_yaml("solver:\n  timeout_ms: soon\n").is_err());
        let err = Config::from_yaml("rules:\n  X:\n    - id: r\n      metric: ''\n      bound: { literal: 1 }\n").unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_yaml("# nothing here\n").unwrap();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_env_var_expansion() {
        // PATH is set in any test environment; the name below is not.
        let expanded = expand_env_vars("a: ${PATH}\nb: $CLOUDCAP_SURELY_UNSET_VAR\n");
        assert!(!expanded.contains("${PATH}"));
        assert!(expanded.contains("$CLOUDCAP_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_example_yaml_is_valid() {
        let config = Config::from_yaml(&Config::example_yaml()).unwrap();
        assert!(config.rules.is_empty());
        assert!(config.analysis.parallel);
    }
}
