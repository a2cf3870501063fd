//! Input parsing for CloudFormation templates and usage-estimate files.
//!
//! # Supported Inputs
//!
//! - YAML and JSON templates, including YAML short-form intrinsics (`!Ref`,
//!   `!GetAtt`, `!Sub`, ...)
//! - Estimate files mapping resources (logical id or ARN) to metric ranges
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudcap::parser::TemplateParser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let template = TemplateParser::new().parse_file("stack.yaml".as_ref()).await?;
//!     println!("Found {} resources", template.len());
//!     Ok(())
//! }
//! ```

mod estimates;
mod template;

pub use estimates::{estimate_skeleton, EstimateFile};
pub use template::TemplateParser;

use crate::graph::Template;

/// File extensions accepted as templates.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "template"];

/// Trait for parsing template content.
///
/// Lets callers swap in a different front end (e.g. a pre-processed
/// document) without touching the model builder.
pub trait Parser: Send + Sync {
    /// Parse a single document's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid template.
    fn parse_content(&self, content: &str, file_path: &std::path::Path) -> crate::Result<Template>;
}

impl Parser for TemplateParser {
    fn parse_content(&self, content: &str, file_path: &std::path::Path) -> crate::Result<Template> {
        TemplateParser::parse_content(self, content, file_path)
    }
}

/// Whether a path looks like a template by its extension.
#[must_use]
pub fn is_template_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(ext)))
}
