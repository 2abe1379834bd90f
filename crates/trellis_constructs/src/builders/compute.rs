//! Functions and their service roles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use trellis_core::tokens;
use trellis_core::{
    CheckId, ConstructError, ConstructResult, Environment, Fragment, Pseudo, ResourceDeclaration, ResourceHandle,
    ResourceKind, Scope, Suppression, PRIMARY_RESOURCE,
};

use super::iam::{grant_bucket_access, BucketPermission, POLICY_VERSION};
use super::network::{SubnetType, VpcHandle};
use super::security_group::build_security_group;
use super::{merge_settings, props_layer, Merged};
use crate::defaults::{default_fragment_for, DefaultContext, ProfileFamily};
use crate::policy;

const REQUIRED_KEYS: &[&str] = &["runtime", "handler", "code", "timeout", "memorySize", "tracing"];

/// Set on node runtimes so the SDK reuses connections.
pub const NODE_CONNECTION_REUSE: &str = "AWS_NODEJS_CONNECTION_REUSE_ENABLED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    #[serde(rename = "nodejs18.x", alias = "NODEJS_18_X")]
    Nodejs18,
    #[serde(rename = "nodejs20.x", alias = "NODEJS_20_X")]
    Nodejs20,
    #[serde(rename = "nodejs22.x", alias = "NODEJS_22_X")]
    Nodejs22,
    #[serde(rename = "python3.11", alias = "PYTHON_3_11")]
    Python311,
    #[serde(rename = "python3.12", alias = "PYTHON_3_12")]
    Python312,
    #[serde(rename = "python3.13", alias = "PYTHON_3_13")]
    Python313,
    #[serde(rename = "java17", alias = "JAVA_17")]
    Java17,
    #[serde(rename = "java21", alias = "JAVA_21")]
    Java21,
    #[serde(rename = "provided.al2023", alias = "PROVIDED_AL2023")]
    ProvidedAl2023,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Nodejs18 => "nodejs18.x",
            Runtime::Nodejs20 => "nodejs20.x",
            Runtime::Nodejs22 => "nodejs22.x",
            Runtime::Python311 => "python3.11",
            Runtime::Python312 => "python3.12",
            Runtime::Python313 => "python3.13",
            Runtime::Java17 => "java17",
            Runtime::Java21 => "java21",
            Runtime::ProvidedAl2023 => "provided.al2023",
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Runtime::Nodejs18 | Runtime::Nodejs20 | Runtime::Nodejs22)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TracingMode {
    Active,
    PassThrough,
}

impl TracingMode {
    fn mode(&self) -> &'static str {
        match self {
            TracingMode::Active => "Active",
            TracingMode::PassThrough => "PassThrough",
        }
    }
}

/// Where the function's code lives. Inline code and a bucket are exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct FunctionCode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_object_version: Option<String>,
}

impl FunctionCode {
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            zip_file: Some(source.into()),
            ..Default::default()
        }
    }

    fn render(&self) -> Value {
        let mut code = Fragment::new();
        if let Some(source) = &self.zip_file {
            code.insert("ZipFile", source.as_str());
        }
        if let Some(bucket) = &self.s3_bucket {
            code.insert("S3Bucket", bucket.as_str());
        }
        if let Some(key) = &self.s3_key {
            code.insert("S3Key", key.as_str());
        }
        if let Some(version) = &self.s3_object_version {
            code.insert("S3ObjectVersion", version.as_str());
        }
        code.into_value()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct FunctionProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<FunctionCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracing: Option<TracingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_concurrent_executions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionSettings {
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub runtime: Runtime,
    pub handler: String,
    pub code: FunctionCode,
    pub timeout: u32,
    pub memory_size: u32,
    #[serde(default)]
    pub environment: BTreeMap<String, Value>,
    pub tracing: TracingMode,
    #[serde(default)]
    pub reserved_concurrent_executions: Option<u32>,
}

/// Access to one bucket granted to the function's role.
#[derive(Debug, Clone, Copy)]
pub struct BucketGrant<'h> {
    pub bucket: &'h ResourceHandle,
    pub permissions: &'h [BucketPermission],
}

/// Resources a function is bound to.
#[derive(Debug, Clone, Default)]
pub struct FunctionBindings<'h> {
    /// Environment variables resolving to a resource's primary identifier.
    pub environment: Vec<(String, &'h ResourceHandle)>,
    pub bucket_grants: Vec<BucketGrant<'h>>,
    pub vpc: Option<&'h VpcHandle>,
}

#[derive(Debug, Clone)]
pub struct FunctionHandle {
    pub function: ResourceHandle,
    pub role: ResourceHandle,
    pub policies: Vec<ResourceHandle>,
    pub security_group: Option<ResourceHandle>,
    pub merged: Fragment,
    pub settings: FunctionSettings,
}

impl FunctionHandle {
    pub fn arn(&self) -> Value {
        self.function.arn()
    }
}

pub fn resolve_function(
    environment: &Environment,
    id: &str,
    props: Option<&FunctionProps>,
) -> ConstructResult<Merged<FunctionSettings>> {
    let ctx = DefaultContext::new(environment, id);
    let defaults = default_fragment_for(ProfileFamily::Compute, None, &ctx)?;
    let mut layers = Vec::new();
    if props.and_then(|p| p.runtime).map_or(false, |r| r.is_node()) {
        layers.push(node_runtime_layer());
    }
    layers.extend(props_layer(props)?);
    let merged = merge_settings::<FunctionSettings>(id, &defaults, &layers, REQUIRED_KEYS)?;
    policy::check_function(id, &merged.settings)?;
    Ok(merged)
}

/// Node runtimes reuse SDK connections unless the caller sets the flag.
fn node_runtime_layer() -> Fragment {
    let mut variables = serde_json::Map::new();
    variables.insert(NODE_CONNECTION_REUSE.to_string(), Value::from("1"));
    Fragment::new().with("environment", Value::Object(variables))
}

/// Build a function construct under `id` from settings `resolve_function`
/// produced: service role, grants, optional security group and the function
/// itself, in that order.
pub fn build_function(
    scope: &mut Scope<'_>,
    id: &str,
    merged: Merged<FunctionSettings>,
    bindings: FunctionBindings<'_>,
) -> ConstructResult<FunctionHandle> {
    let settings = &merged.settings;

    let mut variables = settings.environment.clone();
    for (name, target) in &bindings.environment {
        policy::check_environment_name(id, name)?;
        if variables.insert(name.clone(), target.reference()).is_some() {
            return Err(ConstructError::configuration(
                format!("{}.environment.{}", id, name),
                "variable is bound to a resource and cannot be set directly",
            ));
        }
    }

    let mut function_scope = scope.child(id)?;
    let logs_arn = log_group_arn(function_scope.environment());
    let role = function_scope.register(
        "ServiceRole",
        ResourceDeclaration::new(
            ResourceKind::Role,
            service_role_properties(logs_arn, bindings.vpc.is_some()),
        ),
    )?;

    let mut policies = Vec::new();
    for (index, grant) in bindings.bucket_grants.iter().enumerate() {
        let policy_id = match index {
            0 => "ServiceRoleDefaultPolicy".to_string(),
            n => format!("ServiceRoleDefaultPolicy{}", n + 1),
        };
        policies.push(grant_bucket_access(
            &mut function_scope,
            &policy_id,
            &role,
            grant.bucket,
            grant.permissions,
        )?);
    }

    let security_group = match bindings.vpc {
        Some(vpc) => Some(build_security_group(&mut function_scope, "SecurityGroup", vpc, None, &[])?),
        None => None,
    };

    let mut properties = Fragment::new()
        .with("Code", settings.code.render())
        .with("Role", role.arn());
    if let Some(description) = &settings.description {
        properties.insert("Description", description.as_str());
    }
    if !variables.is_empty() {
        properties.insert("Environment", json!({ "Variables": variables }));
    }
    if let Some(name) = &settings.function_name {
        properties.insert("FunctionName", name.as_str());
    }
    properties.insert("Handler", settings.handler.as_str());
    properties.insert("MemorySize", settings.memory_size);
    if let Some(reserved) = settings.reserved_concurrent_executions {
        properties.insert("ReservedConcurrentExecutions", reserved);
    }
    properties.insert("Runtime", settings.runtime.as_str());
    properties.insert("Timeout", settings.timeout);
    properties.insert("TracingConfig", json!({ "Mode": settings.tracing.mode() }));
    let mut subnets: &[ResourceHandle] = &[];
    if let (Some(vpc), Some(sg)) = (bindings.vpc, &security_group) {
        subnets = function_subnets(id, vpc)?;
        properties.insert("VpcConfig", vpc_config(subnets, sg));
    }

    let mut suppressions = vec![Suppression::new(
        CheckId::W58,
        "The service role carries its own scoped CloudWatch Logs policy",
    )?];
    if bindings.vpc.is_none() {
        suppressions.push(Suppression::new(
            CheckId::W89,
            "Functions run outside a VPC unless a network is provided",
        )?);
    }
    if settings.reserved_concurrent_executions.is_none() {
        suppressions.push(Suppression::new(
            CheckId::W92,
            "Reserved concurrency depends on the workload and is left to the caller",
        )?);
    }

    let mut declaration = ResourceDeclaration::new(ResourceKind::Function, properties)
        .depends_on(&role)
        .with_suppressions(suppressions);
    for target in policies.iter().chain(security_group.iter()).chain(subnets) {
        declaration = declaration.depends_on(target);
    }
    for (name, target) in &bindings.environment {
        declaration = declaration.with_reference(format!("environment.{}", name), target);
    }
    let function = function_scope.register(PRIMARY_RESOURCE, declaration)?;
    info!(
        "Built function '{}' ({}, {} grant(s), in vpc: {})",
        function.path,
        settings.runtime.as_str(),
        policies.len(),
        bindings.vpc.is_some()
    );

    Ok(FunctionHandle {
        function,
        role,
        policies,
        security_group,
        merged: merged.fragment,
        settings: merged.settings,
    })
}

fn log_group_arn(environment: &Environment) -> Value {
    tokens::join(
        "",
        vec![
            Value::from("arn:"),
            Pseudo::Partition.token(),
            Value::from(":logs:"),
            environment.region_value(),
            Value::from(":"),
            environment.account_value(),
            Value::from(":log-group:/aws/lambda/*"),
        ],
    )
}

fn service_role_properties(logs_arn: Value, in_vpc: bool) -> Fragment {
    let mut statements = vec![json!({
        "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
        "Effect": "Allow",
        "Resource": logs_arn
    })];
    if in_vpc {
        statements.push(json!({
            "Action": [
                "ec2:AssignPrivateIpAddresses",
                "ec2:CreateNetworkInterface",
                "ec2:DeleteNetworkInterface",
                "ec2:DescribeNetworkInterfaces",
                "ec2:UnassignPrivateIpAddresses"
            ],
            "Effect": "Allow",
            "Resource": "*"
        }));
    }
    Fragment::new()
        .with(
            "AssumeRolePolicyDocument",
            json!({
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": {"Service": "lambda.amazonaws.com"}
                }],
                "Version": POLICY_VERSION
            }),
        )
        .with(
            "Policies",
            json!([{
                "PolicyDocument": {"Statement": statements, "Version": POLICY_VERSION},
                "PolicyName": "LambdaFunctionServiceRolePolicy"
            }]),
        )
}

/// Private subnets when the network has them, isolated ones otherwise.
fn function_subnets<'v>(id: &str, vpc: &'v VpcHandle) -> ConstructResult<&'v [ResourceHandle]> {
    [SubnetType::Private, SubnetType::Isolated]
        .into_iter()
        .map(|t| vpc.subnets(t))
        .find(|s| !s.is_empty())
        .ok_or_else(|| ConstructError::validation(id, "vpcConfig", "the network has no private or isolated subnets"))
}

fn vpc_config(subnets: &[ResourceHandle], security_group: &ResourceHandle) -> Value {
    let subnet_ids: Vec<Value> = subnets.iter().map(ResourceHandle::reference).collect();
    json!({
        "SecurityGroupIds": [security_group.attribute("GroupId")],
        "SubnetIds": subnet_ids
    })
}
