//! Error types for CloudCap.
//!
//! This module defines the error hierarchy using `thiserror`. All errors
//! carry enough context to be reported on their own and can be propagated
//! with the `?` operator.
//!
//! # Error Categories
//!
//! - **Template errors**: unreadable or malformed CloudFormation documents
//! - **Model build errors**: dangling references, reference cycles,
//!   duplicate resource ids. These abort analysis of the affected deployment
//!   and are a different failure class from an `UNKNOWN` verdict.
//! - **Compile errors**: invalid rule definitions, invalid or missing usage
//!   estimates
//! - **Config errors**: invalid configuration files
//!
//! A solver that runs out of budget is *not* an error; it yields
//! [`Verdict::Unknown`](crate::types::Verdict::Unknown).
//!
//! # Example
//!
//! ```rust
//! use cloudcap::error::{CloudcapError, Result};
//!
//! fn read_template(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(|e| CloudcapError::io(path, e, file!(), line!()))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Usage:
/// ```ignore
/// return Err(err!(Reference {
///     resource: "Worker".to_string(),
///     missing: "Queue".to_string(),
/// }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident: $value:expr),* $(,)? }) => {
        $crate::error::CloudcapError::$variant {
            $($field: $value,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for CloudCap operations.
pub type Result<T> = std::result::Result<T, CloudcapError>;

/// The main error type for CloudCap.
#[derive(Error, Debug)]
pub enum CloudcapError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// File not found.
    #[error("File not found: {path} ({src_path}:{src_line})")]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Template Errors
    // =========================================================================
    /// The template document could not be parsed into resources.
    #[error("Failed to parse template '{file}' ({src_path}:{src_line}): {message}")]
    TemplateParse {
        /// The template being parsed (empty for in-memory documents)
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Model Build Errors
    // =========================================================================
    /// A reference names a resource that does not exist in the deployment.
    #[error("Resource '{resource}' references unknown resource '{missing}' ({src_path}:{src_line})")]
    Reference {
        /// The referencing resource
        resource: String,
        /// The id that could not be resolved
        missing: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The reference graph contains a cycle.
    #[error("Reference cycle detected ({src_path}:{src_line}): {}", .resources.join(" -> "))]
    Cycle {
        /// Every resource on the detected cycle
        resources: Vec<String>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A resource id is already present in the deployment.
    #[error("Resource '{id}' already exists in deployment {deployment} ({src_path}:{src_line})")]
    DuplicateResource {
        /// The deployment being ingested into
        deployment: String,
        /// The colliding resource id
        id: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A deployment with the same region and account already exists.
    #[error("Deployment {deployment} already exists ({src_path}:{src_line})")]
    DuplicateDeployment {
        /// The colliding deployment id
        deployment: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Estimate and Rule Errors
    // =========================================================================
    /// A usage estimate is malformed (e.g. min > max).
    #[error("Invalid usage estimate for '{resource}.{metric}' ({src_path}:{src_line}): {message}")]
    InvalidEstimate {
        /// The resource the estimate belongs to
        resource: String,
        /// The metric name
        metric: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A rule needs an estimate that was not declared.
    #[error("Rule '{rule}' needs an estimate for '{resource}.{metric}' ({src_path}:{src_line})")]
    MissingEstimate {
        /// The resource the rule applies to
        resource: String,
        /// The metric without an estimate
        metric: String,
        /// The rule id
        rule: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A capacity rule is malformed.
    #[error("Invalid rule '{rule}' ({src_path}:{src_line}): {message}")]
    RuleDefinition {
        /// The rule id
        rule: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Report Errors
    // =========================================================================
    /// Report generation error.
    #[error("Failed to generate report ({src_path}:{src_line}): {message}")]
    ReportGeneration {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },
}

impl CloudcapError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error, src_path: &'static str, src_line: u32) -> Self {
        Self::Io { path: path.into(), source, src_path, src_line }
    }

    /// Creates a `TemplateParse` error.
    #[must_use]
    pub fn template_parse(file: impl Into<PathBuf>, message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::TemplateParse { file: file.into(), message, src_path, src_line }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn config_parse(message: String, source: Option<Box<dyn std::error::Error + Send + Sync>>, src_path: &'static str, src_line: u32) -> Self {
        Self::ConfigParse { message, source, src_path, src_line }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::Internal { message, src_path, src_line }
    }

    /// Whether the error means the resource graph could not be built.
    ///
    /// These are reported separately from an `UNKNOWN` verdict: the model
    /// never reached the solver.
    #[must_use]
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::Reference { .. } | Self::Cycle { .. } | Self::DuplicateResource { .. }
        )
    }

    /// Returns the appropriate exit code for the error.
    ///
    /// Codes 0-2 are reserved for verdicts (PASS, REJECT, UNKNOWN).
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Reference { .. } | Self::Cycle { .. } | Self::DuplicateResource { .. } => 3,
            Self::TemplateParse { .. } => 4,
            Self::InvalidEstimate { .. } | Self::MissingEstimate { .. } => 5,
            Self::RuleDefinition { .. } | Self::ConfigParse { .. } | Self::ConfigValue { .. } => 6,
            Self::FileNotFound { .. } => 14,
            Self::Io { .. } => 13,
            _ => 10,
        }
    }
}

/// Extension trait for `Result` to add context to errors.
pub trait ResultExt<T> {
    /// Converts a general error into a `TemplateParse` error for `file`.
    fn to_template_error(self, file: impl Into<PathBuf>) -> Result<T>;

    /// Converts a general error into a `ConfigParse` error with context.
    fn to_config_parse_error(self, message: String) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_template_error(self, file: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            let source: Box<dyn std::error::Error + Send + Sync> = e.into();
            CloudcapError::template_parse(file, source.to_string(), file!(), line!())
        })
    }

    fn to_config_parse_error(self, message: String) -> Result<T> {
        self.map_err(|e| CloudcapError::config_parse(message, Some(e.into()), file!(), line!()))
    }
}

impl From<std::io::Error> for CloudcapError {
    fn from(source: std::io::Error) -> Self {
        // Prefer CloudcapError::io(path, ...) when the path is known
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_json::Error> for CloudcapError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {source}"),
            src_path: file!(),
            src_line: line!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_errors_are_classified() {
        let cycle = err!(Cycle { resources: vec!["A".into(), "B".into(), "A".into()] });
        assert!(cycle.is_build_error());
        assert_eq!(cycle.exit_code(), 3);
        assert!(cycle.to_string().contains("A -> B -> A"));

        let dangling = err!(Reference { resource: "Fn".into(), missing: "Queue".into() });
        assert!(dangling.is_build_error());

        let estimate = err!(InvalidEstimate {
            resource: "Q".into(),
            metric: "nrequests".into(),
            message: "min > max".into(),
        });
        assert!(!estimate.is_build_error());
        assert_eq!(estimate.exit_code(), 5);
    }

    #[test]
    fn test_template_error_conversion() {
        let parsed: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad yaml"));
        let err = parsed.to_template_error("stack.yaml").unwrap_err();
        assert!(matches!(err, CloudcapError::TemplateParse { .. }));
        assert!(err.to_string().contains("bad yaml"));
    }
}
