//! Security groups.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use trellis_core::{ConstructError, ConstructResult, Fragment, ResourceDeclaration, ResourceHandle, ResourceKind, Scope};

use super::network::VpcHandle;
use super::{merge_settings, props_layer};
use crate::defaults::{default_fragment_for, DefaultContext, ProfileFamily};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SecurityGroupProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_all_outbound: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityGroupSettings {
    #[serde(default)]
    pub description: Option<String>,
    pub allow_all_outbound: bool,
}

/// Inbound TCP access from another security group.
#[derive(Debug, Clone)]
pub struct IngressRule {
    pub source: ResourceHandle,
    pub port: u16,
    pub description: String,
}

/// Build a security group in `vpc`.
pub fn build_security_group(
    scope: &mut Scope<'_>,
    id: &str,
    vpc: &VpcHandle,
    props: Option<&SecurityGroupProps>,
    ingress: &[IngressRule],
) -> ConstructResult<ResourceHandle> {
    let ctx = DefaultContext::new(scope.environment(), id);
    let defaults = default_fragment_for(ProfileFamily::SecurityGroup, None, &ctx)?;
    let layers: Vec<Fragment> = props_layer(props)?.into_iter().collect();
    let settings = merge_settings::<SecurityGroupSettings>(id, &defaults, &layers, &["allowAllOutbound"])?.settings;

    let description = match &settings.description {
        Some(description) => description.clone(),
        None => format!("{}/{}", scope.path(), id),
    };
    let mut properties = Fragment::new()
        .with("GroupDescription", description)
        .with("SecurityGroupEgress", egress(settings.allow_all_outbound));

    let mut declaration_deps = Vec::new();
    if !ingress.is_empty() {
        let mut rules = Vec::with_capacity(ingress.len());
        for rule in ingress {
            if rule.source.kind != ResourceKind::SecurityGroup {
                return Err(ConstructError::configuration(
                    format!("{}.ingress", id),
                    format!("'{}' is not a security group", rule.source.path),
                ));
            }
            rules.push(json!({
                "Description": rule.description,
                "FromPort": rule.port,
                "IpProtocol": "tcp",
                "SourceSecurityGroupId": rule.source.attribute("GroupId"),
                "ToPort": rule.port
            }));
            declaration_deps.push(&rule.source);
        }
        properties.insert("SecurityGroupIngress", rules);
    }
    properties.insert("VpcId", vpc.vpc_id());

    let declaration = declaration_deps
        .into_iter()
        .fold(ResourceDeclaration::new(ResourceKind::SecurityGroup, properties), |decl, source| {
            decl.depends_on(source)
        })
        .depends_on(&vpc.vpc);
    let handle = scope.register(id, declaration)?;
    debug!(
        "Built security group '{}' ({} ingress rules, outbound allowed: {})",
        handle.path,
        ingress.len(),
        settings.allow_all_outbound
    );
    Ok(handle)
}

fn egress(allow_all_outbound: bool) -> Value {
    if allow_all_outbound {
        json!([{
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1"
        }])
    } else {
        json!([{
            "CidrIp": "255.255.255.255/32",
            "Description": "Disallow all traffic",
            "FromPort": 252,
            "IpProtocol": "icmp",
            "ToPort": 86
        }])
    }
}
