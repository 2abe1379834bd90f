//! Cache clusters and their subnet groups.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use trellis_core::{ConstructError, ConstructResult, Environment, Fragment, ResourceDeclaration, ResourceHandle, ResourceKind, Scope};

use super::network::VpcHandle;
use super::{merge_settings, props_layer, Merged};
use crate::defaults::{default_fragment_for, DefaultContext, ProfileFamily};
use crate::policy;

const REQUIRED_KEYS: &[&str] = &["clusterName", "cacheNodeType", "engine", "numCacheNodes", "port", "azMode"];

const SUBNET_GROUP_DESCRIPTION: &str = "trellis generated cache subnet group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEngine {
    Memcached,
    Redis,
}

impl CacheEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEngine::Memcached => "memcached",
            CacheEngine::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AzMode {
    SingleAz,
    CrossAz,
}

impl AzMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AzMode::SingleAz => "single-az",
            AzMode::CrossAz => "cross-az",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<CacheEngine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cache_nodes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub az_mode: Option<AzMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_maintenance_window: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheSettings {
    pub cluster_name: String,
    pub cache_node_type: String,
    pub engine: CacheEngine,
    pub num_cache_nodes: u32,
    pub port: u16,
    pub az_mode: AzMode,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub preferred_maintenance_window: Option<String>,
}

/// A cache subnet group and the name clusters refer to it by.
#[derive(Debug, Clone)]
pub struct SubnetGroupHandle {
    pub group: ResourceHandle,
    pub name: String,
}

/// Resources a cache cluster is bound to.
#[derive(Debug, Clone, Copy)]
pub struct CacheBindings<'h> {
    pub subnet_group: &'h SubnetGroupHandle,
    pub security_groups: &'h [ResourceHandle],
}

#[derive(Debug, Clone)]
pub struct CacheClusterHandle {
    pub cluster: ResourceHandle,
    pub merged: Fragment,
    pub settings: CacheSettings,
}

impl CacheClusterHandle {
    pub fn endpoint(&self) -> Value {
        self.cluster.attribute("ConfigurationEndpoint.Address")
    }
}

/// Subnet group over the isolated subnets of `vpc`.
pub fn create_cache_subnet_group(scope: &mut Scope<'_>, vpc: &VpcHandle, id: &str) -> ConstructResult<SubnetGroupHandle> {
    if vpc.isolated_subnets.is_empty() {
        return Err(ConstructError::validation(
            id,
            "subnetIds",
            format!("network '{}' has no isolated subnets", vpc.vpc.path),
        ));
    }
    let name = format!("{}-subnet-group", id);
    let subnet_ids: Vec<Value> = vpc.isolated_subnets.iter().map(ResourceHandle::reference).collect();
    let declaration = vpc.isolated_subnets.iter().fold(
        ResourceDeclaration::new(
            ResourceKind::CacheSubnetGroup,
            Fragment::new()
                .with("CacheSubnetGroupName", name.as_str())
                .with("Description", SUBNET_GROUP_DESCRIPTION)
                .with("SubnetIds", subnet_ids),
        ),
        |decl, subnet| decl.depends_on(subnet),
    );
    let group = scope.register(&format!("ec-subnetgroup-{}", id), declaration)?;
    Ok(SubnetGroupHandle { group, name })
}

pub fn resolve_cache(
    environment: &Environment,
    id: &str,
    variant: Option<&str>,
    props: Option<&CacheProps>,
) -> ConstructResult<Merged<CacheSettings>> {
    let ctx = DefaultContext::new(environment, id);
    let defaults = default_fragment_for(ProfileFamily::Cache, variant, &ctx)?;
    let layers: Vec<Fragment> = props_layer(props)?.into_iter().collect();
    let merged = merge_settings::<CacheSettings>(id, &defaults, &layers, REQUIRED_KEYS)?;
    policy::check_cache(id, &merged.settings)?;
    Ok(merged)
}

/// Build a cache cluster registered as `<id>-cluster` from settings
/// `resolve_cache` produced.
pub fn build_cache_cluster(
    scope: &mut Scope<'_>,
    id: &str,
    merged: Merged<CacheSettings>,
    bindings: CacheBindings<'_>,
) -> ConstructResult<CacheClusterHandle> {
    let settings = &merged.settings;

    let security_group_ids: Vec<Value> = bindings.security_groups.iter().map(|sg| sg.attribute("GroupId")).collect();
    let mut properties = Fragment::new()
        .with("AZMode", settings.az_mode.as_str())
        .with("CacheNodeType", settings.cache_node_type.as_str())
        .with("CacheSubnetGroupName", bindings.subnet_group.name.as_str())
        .with("ClusterName", settings.cluster_name.as_str())
        .with("Engine", settings.engine.as_str())
        .with("NumCacheNodes", settings.num_cache_nodes)
        .with("Port", settings.port);
    if let Some(version) = &settings.engine_version {
        properties.insert("EngineVersion", version.as_str());
    }
    if let Some(window) = &settings.preferred_maintenance_window {
        properties.insert("PreferredMaintenanceWindow", window.as_str());
    }
    if !security_group_ids.is_empty() {
        properties.insert("VpcSecurityGroupIds", security_group_ids);
    }

    let declaration = bindings
        .security_groups
        .iter()
        .fold(ResourceDeclaration::new(ResourceKind::CacheCluster, properties), |decl, sg| decl.depends_on(sg))
        .depends_on(&bindings.subnet_group.group);
    let cluster = scope.register(&format!("{}-cluster", id), declaration)?;
    info!(
        "Built {} cache cluster '{}' with {} node(s)",
        settings.engine.as_str(),
        cluster.path,
        settings.num_cache_nodes
    );

    Ok(CacheClusterHandle {
        cluster,
        merged: merged.fragment,
        settings: merged.settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::network::{build_vpc, resolve_vpc};
    use serde_json::json;
    use trellis_core::{OutputTree, StackConfig};

    #[test]
    fn test_subnet_group_requires_isolated_subnets() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let err = tree
            .root()
            .assemble("app", |scope| {
                let merged = resolve_vpc(scope.environment(), "Vpc", None, None, None)?;
                let vpc = build_vpc(scope, "Vpc", merged)?;
                create_cache_subnet_group(scope, &vpc, "cache")
            })
            .unwrap_err();
        assert!(matches!(err, ConstructError::Validation { ref path, .. } if path == "subnetIds"));
    }

    #[test]
    fn test_cluster_depends_on_subnet_group() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let handle = tree
            .root()
            .assemble("app", |scope| {
                let merged = resolve_vpc(scope.environment(), "Vpc", Some("isolated"), None, None)?;
                let vpc = build_vpc(scope, "Vpc", merged)?;
                let group = create_cache_subnet_group(scope, &vpc, "cache")?;
                let bindings = CacheBindings {
                    subnet_group: &group,
                    security_groups: &[],
                };
                let merged = resolve_cache(scope.environment(), "cache", None, None)?;
                build_cache_cluster(scope, "cache", merged, bindings)
            })
            .unwrap();

        assert_eq!(handle.cluster.logical_id, "appcachecluster");
        let cluster = tree.get("appcachecluster").unwrap();
        assert!(cluster.dependencies().contains("appecsubnetgroupcache"));
        assert_eq!(cluster.property("ClusterName"), Some(&json!("cache-cdk-cluster")));
        assert_eq!(cluster.property("CacheSubnetGroupName"), Some(&json!("cache-subnet-group")));
        assert_eq!(cluster.property("AZMode"), Some(&json!("cross-az")));
        assert_eq!(cluster.property("NumCacheNodes"), Some(&json!(2)));
    }

    #[test]
    fn test_redis_cannot_span_zones() {
        let props = CacheProps {
            az_mode: Some(AzMode::CrossAz),
            ..Default::default()
        };
        let err = resolve_cache(&Environment::agnostic(), "cache", Some("redis"), Some(&props)).unwrap_err();
        assert!(matches!(err, ConstructError::Validation { ref path, .. } if path == "azMode"));
    }

    #[test]
    fn test_cross_az_needs_two_nodes() {
        let props = CacheProps {
            num_cache_nodes: Some(1),
            ..Default::default()
        };
        let err = resolve_cache(&Environment::agnostic(), "cache", None, Some(&props)).unwrap_err();
        assert!(err.to_string().contains("at least two nodes"));
    }
}
