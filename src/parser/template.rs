//! CloudFormation template loader.
//!
//! Reads YAML or JSON templates into a [`Template`]. YAML short-form
//! intrinsic functions are expanded to their long form so the graph builder
//! only ever sees one shape:
//!
//! | Short form          | Long form                  |
//! |---------------------|----------------------------|
//! | `!Ref Queue`        | `{"Ref": "Queue"}`         |
//! | `!GetAtt Queue.Arn` | `{"Fn::GetAtt": "Queue.Arn"}` |
//! | `!Sub "${Queue}"`   | `{"Fn::Sub": "${Queue}"}`  |
//! | `!Condition IsProd` | `{"Condition": "IsProd"}`  |

use crate::error::{CloudcapError, Result};
use crate::graph::{ResourceDefinition, Template};
use crate::types::{Scalar, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Parser for CloudFormation documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateParser;

impl TemplateParser {
    /// Create a new template parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Read and parse a template file.
    ///
    /// # Errors
    ///
    /// `FileNotFound`, `Io`, or `TemplateParse`.
    pub async fn parse_file(&self, path: &Path) -> Result<Template> {
        if !path.exists() {
            return Err(crate::err!(FileNotFound { path: path.to_path_buf() }));
        }
        tracing::debug!(file = %path.display(), "Parsing template");
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CloudcapError::io(path, e, file!(), line!()))?;
        self.parse_content(&content, path)
    }

    /// Parse template text. `file` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns `TemplateParse` if the document is not valid YAML/JSON or has
    /// no usable `Resources` section.
    pub fn parse_content(&self, content: &str, file: &Path) -> Result<Template> {
        let fail = |message: String| CloudcapError::template_parse(file, message, file!(), line!());

        let raw: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| fail(e.to_string()))?;
        let document = convert(&raw).map_err(&fail)?;
        let Some(root) = document.as_mapping() else {
            return Err(fail("template must be a mapping".to_string()));
        };

        let parameters = match root.get("Parameters") {
            None => Default::default(),
            Some(Value::Mapping(params)) => params.keys().cloned().collect(),
            Some(_) => return Err(fail("'Parameters' must be a mapping".to_string())),
        };

        let Some(resources) = root.get("Resources").and_then(Value::as_mapping) else {
            return Err(fail("template has no 'Resources' mapping".to_string()));
        };

        let mut template = Template { parameters, resources: BTreeMap::new() };
        for (id, entry) in resources {
            let definition = resource_definition(id, entry).map_err(&fail)?;
            template.resources.insert(id.clone(), definition);
        }

        tracing::debug!(
            file = %file.display(),
            resources = template.len(),
            parameters = template.parameters.len(),
            "Template parsed"
        );
        Ok(template)
    }
}

fn resource_definition(id: &str, entry: &Value) -> std::result::Result<ResourceDefinition, String> {
    let Some(entry) = entry.as_mapping() else {
        return Err(format!("resource '{id}' must be a mapping"));
    };
    let Some(resource_type) = entry.get("Type").and_then(Value::as_str) else {
        return Err(format!("resource '{id}' has no string 'Type'"));
    };
    let properties = match entry.get("Properties") {
        None | Some(Value::Scalar(Scalar::Null)) => Value::default(),
        Some(props @ Value::Mapping(_)) => props.clone(),
        Some(_) => return Err(format!("'Properties' of resource '{id}' must be a mapping")),
    };
    let depends_on = match entry.get("DependsOn") {
        None => Vec::new(),
        Some(Value::Scalar(Scalar::String(single))) => vec![single.clone()],
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("'DependsOn' of resource '{id}' must list resource ids"))
            })
            .collect::<std::result::Result<_, _>>()?,
        Some(_) => return Err(format!("'DependsOn' of resource '{id}' must be a string or list")),
    };
    Ok(ResourceDefinition {
        resource_type: resource_type.to_string(),
        properties,
        depends_on,
    })
}

/// Long-form key for a short-form intrinsic tag.
fn intrinsic_key(tag: &str) -> String {
    match tag {
        "Ref" | "Condition" => tag.to_string(),
        other => format!("Fn::{other}"),
    }
}

/// Convert a YAML value into a template value, expanding intrinsic tags.
fn convert(value: &serde_yaml::Value) -> std::result::Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Scalar(Scalar::Null),
        Yaml::Bool(b) => Value::Scalar(Scalar::Bool(*b)),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Value::Scalar(Scalar::Integer(i)),
            None => Value::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Yaml::String(s) => Value::Scalar(Scalar::String(s.clone())),
        Yaml::Sequence(items) => Value::Sequence(items.iter().map(convert).collect::<std::result::Result<_, _>>()?),
        Yaml::Mapping(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(mapping_key(k)?, convert(v)?);
            }
            Value::Mapping(out)
        }
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let key = intrinsic_key(tag.trim_start_matches('!'));
            let mut out = BTreeMap::new();
            out.insert(key, convert(&tagged.value)?);
            Value::Mapping(out)
        }
    })
}

fn mapping_key(key: &serde_yaml::Value) -> std::result::Result<String, String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(n) => Ok(n.to_string()),
        other => Err(format!("unsupported mapping key: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudcapError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(content: &str) -> Result<Template> {
        TemplateParser::new().parse_content(content, Path::new("test.yaml"))
    }

    #[test]
    fn test_short_form_tags_expand() {
        let template = parse(
            r#"
Parameters:
  Env:
    Type: String
Resources:
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      QueueName: !Sub "${Env}-orders"
  Mapping:
    Type: AWS::Lambda::EventSourceMapping
    Properties:
      EventSourceArn: !GetAtt Queue.Arn
      FunctionName: !Ref Worker
      Enabled: !If [IsProd, true, false]
  Worker:
    Type: AWS::Lambda::Function
    DependsOn: Queue
"#,
        )
        .unwrap();

        assert!(template.parameters.contains("Env"));
        let mapping = &template.resources["Mapping"].properties;
        assert_eq!(mapping.get_path(&["EventSourceArn"]), Some(&Value::from(json!({"Fn::GetAtt": "Queue.Arn"}))));
        assert_eq!(mapping.get_path(&["FunctionName"]), Some(&Value::from(json!({"Ref": "Worker"}))));
        assert_eq!(
            mapping.get_path(&["Enabled"]),
            Some(&Value::from(json!({"Fn::If": ["IsProd", true, false]})))
        );
        assert_eq!(template.resources["Worker"].depends_on, vec!["Queue".to_string()]);
        assert_eq!(template.resources["Worker"].properties, Value::default());
    }

    #[test]
    fn test_json_template() {
        let template = parse(
            r#"{"Resources": {"T": {"Type": "AWS::DynamoDB::Table",
                "Properties": {"ProvisionedThroughput": {"ReadCapacityUnits": 5}},
                "DependsOn": ["A", "B"]}}}"#,
        )
        .unwrap();
        let table = &template.resources["T"];
        assert_eq!(table.resource_type, "AWS::DynamoDB::Table");
        assert_eq!(table.depends_on.len(), 2);
    }

    #[test]
    fn test_malformed_templates() {
        for bad in [
            "Resources: [",
            "- just\n- a list\n",
            "AWSTemplateFormatVersion: '2010-09-09'\n",
            "Resources:\n  Q:\n    Properties: {}\n",
            "Resources:\n  Q:\n    Type: X\n    DependsOn: {A: B}\n",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(matches!(err, CloudcapError::TemplateParse { .. }), "{bad}: {err}");
        }
    }

    #[tokio::test]
    async fn test_parse_missing_file() {
        let err = TemplateParser::new()
            .parse_file(Path::new("/definitely/not/here.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudcapError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(&path, "Resources:\n  Q:\n    Type: AWS::SQS::Queue\n").unwrap();
        let template = TemplateParser::new().parse_file(&path).await.unwrap();
        assert_eq!(template.len(), 1);
    }
}
