//! Throwaway resources for integration stacks.
//!
//! Every helper registers into the scope it is given, so call them from
//! inside an assembly.

use trellis_core::{CheckId, ConstructResult, Scope, Suppression};

use crate::builders::{
    build_bucket, build_cache_cluster, build_security_group, build_vpc, create_cache_subnet_group, resolve_bucket,
    resolve_cache, resolve_vpc, BucketHandle, BucketProps, CacheBindings, CacheClusterHandle, CacheProps,
    SecurityGroupProps, VpcHandle, VpcProps,
};
use crate::defaults::default_cache_port;

pub const SCRAP_BUCKET_ID: &str = "scrapBucket";
pub const TEST_VPC_ID: &str = "Vpc";

/// Address block of test networks, kept apart from the default `10.0.0.0/16`.
pub const TEST_VPC_CIDR: &str = "172.168.0.0/16";

/// A short-lived bucket that is destroyed with its stack.
pub fn create_scrap_bucket(scope: &mut Scope<'_>, props: Option<&BucketProps>) -> ConstructResult<BucketHandle> {
    let merged = resolve_bucket(scope.environment(), SCRAP_BUCKET_ID, Some("scrap"), props)?;
    let bucket = build_bucket(scope, SCRAP_BUCKET_ID, merged, None)?;
    let suppressions = vec![
        Suppression::new(CheckId::W51, "Scrap buckets only exist for the lifetime of a test")?,
        Suppression::new(CheckId::W35, "Scrap buckets do not need access logs")?,
        Suppression::new(CheckId::W41, "Scrap buckets hold no sensitive data")?,
    ];
    scope.suppress(&bucket.bucket, suppressions);
    Ok(bucket)
}

/// A network for integration tests: public and private subnets when
/// `public_facing`, isolated subnets otherwise.
pub fn test_vpc(scope: &mut Scope<'_>, public_facing: bool, props: Option<&VpcProps>) -> ConstructResult<VpcHandle> {
    let variant = if public_facing { "public-private" } else { "isolated" };
    let enforced = VpcProps {
        cidr: Some(TEST_VPC_CIDR.to_string()),
        enable_dns_hostnames: Some(true),
        enable_dns_support: Some(true),
        ..Default::default()
    };
    let merged = resolve_vpc(scope.environment(), TEST_VPC_ID, Some(variant), props, Some(&enforced))?;
    build_vpc(scope, TEST_VPC_ID, merged)
}

/// A memcached cluster over the isolated subnets of `vpc`, reachable by
/// nothing. `port` falls back to the default cache port.
pub fn create_test_cache(
    scope: &mut Scope<'_>,
    id: &str,
    vpc: &VpcHandle,
    port: Option<u16>,
) -> ConstructResult<CacheClusterHandle> {
    let subnet_group = create_cache_subnet_group(scope, vpc, id)?;

    let group_props = SecurityGroupProps {
        allow_all_outbound: Some(true),
        ..Default::default()
    };
    let security_group = build_security_group(scope, &format!("{}-cachesg", id), vpc, Some(&group_props), &[])?;
    let suppressions = vec![
        Suppression::new(CheckId::W40, "Test Resource")?,
        Suppression::new(CheckId::W5, "Test Resource")?,
        Suppression::new(CheckId::W36, "Test Resource")?,
    ];
    scope.suppress(&security_group, suppressions);

    let cache_props = CacheProps {
        port: Some(port.unwrap_or_else(default_cache_port)),
        ..Default::default()
    };
    let merged = resolve_cache(scope.environment(), id, None, Some(&cache_props))?;
    let bindings = CacheBindings {
        subnet_group: &subnet_group,
        security_groups: std::slice::from_ref(&security_group),
    };
    build_cache_cluster(scope, id, merged, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{OutputTree, RemovalPolicy, StackConfig};

    #[test]
    fn test_scrap_bucket() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let bucket = tree
            .root()
            .assemble("integ", |scope| create_scrap_bucket(scope, None))
            .unwrap();

        assert!(bucket.logging_bucket.is_none());
        assert!(bucket.policy.is_none());
        let decl = tree.get(&bucket.bucket.logical_id).unwrap();
        assert_eq!(decl.removal_policy(), Some(RemovalPolicy::Destroy));
        let checks: Vec<CheckId> = decl.suppressions().iter().map(|s| s.check()).collect();
        assert_eq!(checks, vec![CheckId::W51, CheckId::W35, CheckId::W41]);
    }

    #[test]
    fn test_private_test_vpc() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let vpc = tree
            .root()
            .assemble("integ", |scope| test_vpc(scope, false, None))
            .unwrap();

        assert_eq!(vpc.settings.cidr, TEST_VPC_CIDR);
        assert_eq!(vpc.isolated_subnets.len(), 2);
        let decl = tree.get(&vpc.vpc.logical_id).unwrap();
        assert_eq!(decl.property("EnableDnsHostnames"), Some(&json!(true)));
    }

    #[test]
    fn test_test_cache_is_closed_and_bound() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let cache = tree
            .root()
            .assemble("integ", |scope| {
                let vpc = test_vpc(scope, false, None)?;
                create_test_cache(scope, "sessions", &vpc, None)
            })
            .unwrap();

        assert_eq!(cache.cluster.logical_id, "integsessionscluster");
        assert_eq!(cache.settings.port, default_cache_port());
        let cluster = tree.get(&cache.cluster.logical_id).unwrap();
        assert!(cluster.dependencies().contains("integecsubnetgroupsessions"));
        assert_eq!(cluster.property("CacheSubnetGroupName"), Some(&json!("sessions-subnet-group")));
        assert_eq!(
            cluster.property("VpcSecurityGroupIds"),
            Some(&json!([{"Fn::GetAtt": ["integsessionscachesg", "GroupId"]}]))
        );

        let group = tree.get("integsessionscachesg").unwrap();
        assert!(group.property("SecurityGroupIngress").is_none());
        assert_eq!(
            group.property("SecurityGroupEgress").and_then(|egress| egress[0].get("CidrIp")),
            Some(&json!("0.0.0.0/0"))
        );
        let checks: Vec<CheckId> = group.suppressions().iter().map(|s| s.check()).collect();
        assert_eq!(checks, vec![CheckId::W40, CheckId::W5, CheckId::W36]);
    }

    #[test]
    fn test_test_cache_port_override() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let cache = tree
            .root()
            .assemble("integ", |scope| {
                let vpc = test_vpc(scope, false, None)?;
                create_test_cache(scope, "sessions", &vpc, Some(11222))
            })
            .unwrap();
        let cluster = tree.get(&cache.cluster.logical_id).unwrap();
        assert_eq!(cluster.property("Port"), Some(&json!(11222)));
    }
}
