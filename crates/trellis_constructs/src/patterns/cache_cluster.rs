//! A cache cluster in an isolated network.

use serde::Deserialize;

use trellis_core::{ConstructResult, ResourceHandle, Scope};

use super::AssemblyProgress;
use crate::builders::{
    build_cache_cluster, build_security_group, build_vpc, create_cache_subnet_group, resolve_cache, resolve_vpc,
    CacheBindings, CacheClusterHandle, CacheProps, IngressRule, Merged, SecurityGroupProps, SubnetGroupHandle,
    VpcHandle, VpcProps, VpcSettings,
};
use crate::defaults::{lookup, ProfileFamily};
use crate::policy::check_exclusive;

const VPC_ID: &str = "Vpc";
const NETWORK_VARIANT: &str = "isolated";
const SECURITY_GROUP_ID: &str = "CacheSecurityGroup";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheClusterProps {
    pub vpc_props: Option<VpcProps>,
    /// Cache profile variant; the family default when unset.
    pub cache_variant: Option<String>,
    pub cache_props: Option<CacheProps>,
    pub security_group_props: Option<SecurityGroupProps>,
    #[serde(skip)]
    pub existing_vpc: Option<VpcHandle>,
    /// Security groups allowed to reach the cache port.
    #[serde(skip)]
    pub client_security_groups: Vec<ResourceHandle>,
}

enum Network {
    Existing(VpcHandle),
    New(Merged<VpcSettings>),
}

/// Handles a cache-cluster assembly exposes.
#[derive(Debug, Clone)]
pub struct CacheCluster {
    pub vpc: VpcHandle,
    pub subnet_group: SubnetGroupHandle,
    pub security_group: ResourceHandle,
    pub cluster: CacheClusterHandle,
}

impl CacheCluster {
    pub fn new(scope: &mut Scope<'_>, id: &str, props: CacheClusterProps) -> ConstructResult<Self> {
        let mut progress = AssemblyProgress::start("cache-cluster", id);
        let variant = props.cache_variant.as_deref();
        let exposed = scope.assemble(id, |scope| {
            check_exclusive(
                id,
                &[("existingVpc", props.existing_vpc.is_some()), ("vpcProps", props.vpc_props.is_some())],
            )?;

            lookup(ProfileFamily::Cache, variant)?;
            if props.existing_vpc.is_none() {
                lookup(ProfileFamily::Network, Some(NETWORK_VARIANT))?;
            }
            progress.advance();

            let cache_settings = resolve_cache(scope.environment(), id, variant, props.cache_props.as_ref())?;
            let port = cache_settings.settings.port;
            let network = match &props.existing_vpc {
                Some(existing) => Network::Existing(existing.clone()),
                None => Network::New(resolve_vpc(
                    scope.environment(),
                    VPC_ID,
                    Some(NETWORK_VARIANT),
                    props.vpc_props.as_ref(),
                    None,
                )?),
            };
            progress.advance();

            let vpc = match network {
                Network::Existing(existing) => existing,
                Network::New(merged) => build_vpc(scope, VPC_ID, merged)?,
            };
            let subnet_group = create_cache_subnet_group(scope, &vpc, id)?;

            let ingress: Vec<IngressRule> = props
                .client_security_groups
                .iter()
                .map(|client| IngressRule {
                    source: client.clone(),
                    port,
                    description: format!("Cache clients in {}", client.path),
                })
                .collect();
            let security_group = build_security_group(
                scope,
                SECURITY_GROUP_ID,
                &vpc,
                props.security_group_props.as_ref(),
                &ingress,
            )?;

            let bindings = CacheBindings {
                subnet_group: &subnet_group,
                security_groups: std::slice::from_ref(&security_group),
            };
            let cluster = build_cache_cluster(scope, id, cache_settings, bindings)?;
            progress.advance();

            Ok(CacheCluster {
                vpc,
                subnet_group,
                security_group,
                cluster,
            })
        })?;
        progress.finish();
        Ok(exposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{ConstructError, OutputTree, ResourceFamily, StackConfig};

    fn isolated_vpc(scope: &mut Scope<'_>) -> ConstructResult<VpcHandle> {
        let merged = resolve_vpc(scope.environment(), "Vpc", Some("isolated"), None, None)?;
        build_vpc(scope, "Vpc", merged)
    }

    #[test]
    fn test_new_isolated_network() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let pattern = CacheCluster::new(&mut tree.root(), "sessions", CacheClusterProps::default()).unwrap();

        assert!(pattern.vpc.public_subnets.is_empty());
        assert!(pattern.vpc.nat_gateways.is_empty());
        assert_eq!(pattern.subnet_group.name, "sessions-subnet-group");
        let cluster = tree.get(&pattern.cluster.cluster.logical_id).unwrap();
        assert_eq!(cluster.property("ClusterName"), Some(&json!("sessions-cdk-cluster")));
        assert_eq!(
            cluster.property("VpcSecurityGroupIds"),
            Some(&json!([{"Fn::GetAtt": ["sessionsCacheSecurityGroup", "GroupId"]}]))
        );
        assert_eq!(tree.declarations_of(ResourceFamily::Cache).count(), 2);
    }

    #[test]
    fn test_client_ingress_on_cache_port() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let vpc = tree.root().assemble("net", isolated_vpc).unwrap();
        let client = tree
            .root()
            .assemble("app", |scope| build_security_group(scope, "Client", &vpc, None, &[]))
            .unwrap();

        let props = CacheClusterProps {
            cache_variant: Some("redis".to_string()),
            existing_vpc: Some(vpc),
            client_security_groups: vec![client],
            ..Default::default()
        };
        let pattern = CacheCluster::new(&mut tree.root(), "cache", props).unwrap();

        let group = tree.get(&pattern.security_group.logical_id).unwrap();
        let ingress = group.property("SecurityGroupIngress").unwrap();
        assert_eq!(ingress[0]["FromPort"], json!(6379));
        assert_eq!(ingress[0]["SourceSecurityGroupId"], json!({"Fn::GetAtt": ["appClient", "GroupId"]}));
    }

    #[test]
    fn test_existing_vpc_excludes_vpc_props() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let vpc = tree.root().assemble("net", isolated_vpc).unwrap();
        let props = CacheClusterProps {
            existing_vpc: Some(vpc),
            vpc_props: Some(VpcProps::default()),
            ..Default::default()
        };
        let err = CacheCluster::new(&mut tree.root(), "cache", props).unwrap_err();
        assert!(matches!(err, ConstructError::Configuration { .. }));
    }
}
