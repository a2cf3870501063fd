//! ARN derivation for resources.
//!
//! Templates name resources by logical id; usage estimates and reports may
//! prefer the physical ARN. The ARN uses the resource's name property when
//! it is a literal string, and the logical id otherwise.

use crate::graph::Resource;
use crate::types::DeploymentId;

/// Name property per resource type, and how the ARN is laid out.
fn layout(resource_type: &str) -> Option<(&'static str, &'static str, &'static str)> {
    // (service, name property, resource prefix)
    let layout = match resource_type {
        "AWS::Lambda::Function" | "AWS::Serverless::Function" => ("lambda", "FunctionName", "function:"),
        "AWS::SQS::Queue" => ("sqs", "QueueName", ""),
        "AWS::SNS::Topic" => ("sns", "TopicName", ""),
        "AWS::DynamoDB::Table" => ("dynamodb", "TableName", "table/"),
        "AWS::Kinesis::Stream" => ("kinesis", "Name", "stream/"),
        "AWS::S3::Bucket" => ("s3", "BucketName", ""),
        "AWS::ApiGateway::RestApi" => ("apigateway", "Name", "/restapis/"),
        _ => return None,
    };
    Some(layout)
}

/// Derive the ARN of `resource` inside `deployment`.
///
/// ```rust
/// use cloudcap::graph::Resource;
/// use cloudcap::model::arn_for;
/// use cloudcap::types::{Account, DeploymentId, Region, Value};
/// use serde_json::json;
///
/// let id = DeploymentId::new(Region::new("us-east-1"), Account::new("1234567890"));
/// let function = Resource {
///     id: "Fn".into(),
///     resource_type: "AWS::Lambda::Function".into(),
///     properties: Value::from(json!({"FunctionName": "test_lambda"})),
/// };
/// assert_eq!(arn_for(&id, &function), "arn:aws:lambda:us-east-1:1234567890:function:test_lambda");
/// ```
#[must_use]
pub fn arn_for(deployment: &DeploymentId, resource: &Resource) -> String {
    let partition = deployment.region.partition();
    let region = &deployment.region;
    let account = &deployment.account;

    let Some((service, name_property, prefix)) = layout(&resource.resource_type) else {
        let service = resource
            .resource_type
            .split("::")
            .nth(1)
            .unwrap_or("unknown")
            .to_lowercase();
        return format!("arn:{partition}:{service}:{region}:{account}:{}", resource.id);
    };

    let name = resource
        .property(&[name_property])
        .and_then(|v| v.as_str())
        .unwrap_or(&resource.id);

    match service {
        "s3" => format!("arn:{partition}:s3:::{}", name.to_lowercase()),
        "apigateway" => format!("arn:{partition}:apigateway:{region}::{prefix}{name}"),
        _ => format!("arn:{partition}:{service}:{region}:{account}:{prefix}{name}"),
    }
}
