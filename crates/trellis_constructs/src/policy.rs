//! Family policy checks.
//!
//! Run on merged settings before anything is registered, so a rejected
//! configuration never reaches the output tree.

use std::collections::BTreeSet;

use regex::Regex;

use trellis_core::{ConstructError, ConstructResult};

use crate::builders::cache::{AzMode, CacheEngine, CacheSettings};
use crate::builders::catalog::{Column, TableSettings};
use crate::builders::compute::FunctionSettings;
use crate::builders::network::{plan_subnets, Ipv4Cidr, SubnetType, VpcSettings, MAX_SUBNET_MASK};
use crate::builders::storage::{BucketEncryption, BucketSettings};

const BUCKET_NAME_PATTERN: &str = r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$";
const IP_ADDRESS_PATTERN: &str = r"^\d+\.\d+\.\d+\.\d+$";
const CLUSTER_NAME_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9-]{0,49}$";
const ENV_VAR_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9_]*$";

pub const MIN_TIMEOUT: u32 = 1;
pub const MAX_TIMEOUT: u32 = 900;
pub const MIN_MEMORY: u32 = 128;
pub const MAX_MEMORY: u32 = 10240;
pub const MAX_AZS: u8 = 6;

fn pattern(expr: &str) -> ConstructResult<Regex> {
    Regex::new(expr).map_err(|e| ConstructError::configuration(expr, format!("Invalid regex: {}", e)))
}

/// Reject more than one of a set of mutually exclusive options.
pub fn check_exclusive(resource: &str, options: &[(&str, bool)]) -> ConstructResult<()> {
    let set: Vec<&str> = options.iter().filter(|(_, is_set)| *is_set).map(|(name, _)| *name).collect();
    if set.len() > 1 {
        return Err(ConstructError::configuration(
            format!("{}.{}", resource, set[0]),
            format!("'{}' are mutually exclusive", set.join("' and '")),
        ));
    }
    Ok(())
}

pub fn check_bucket(resource: &str, settings: &BucketSettings) -> ConstructResult<()> {
    if settings.encryption == BucketEncryption::Unencrypted && !settings.allow_unencrypted {
        return Err(ConstructError::validation(
            resource,
            "encryption",
            "buckets must be encrypted unless allowUnencrypted is set",
        ));
    }
    if settings.encryption_key_arn.is_some() && settings.encryption != BucketEncryption::Kms {
        return Err(ConstructError::configuration(
            format!("{}.encryptionKeyArn", resource),
            "an encryption key requires kms encryption",
        ));
    }
    if let Some(name) = &settings.bucket_name {
        let valid = pattern(BUCKET_NAME_PATTERN)?.is_match(name)
            && !name.contains("..")
            && !pattern(IP_ADDRESS_PATTERN)?.is_match(name);
        if !valid {
            return Err(ConstructError::validation(
                resource,
                "bucketName",
                format!("'{}' is not a valid bucket name", name),
            ));
        }
    }
    if !settings.versioned && settings.lifecycle_rules.iter().any(|r| r.uses_noncurrent_versions()) {
        return Err(ConstructError::validation(
            resource,
            "lifecycleRules",
            "noncurrent version rules require versioning",
        ));
    }
    Ok(())
}

pub fn check_vpc(resource: &str, settings: &VpcSettings) -> ConstructResult<()> {
    let cidr = Ipv4Cidr::parse(&settings.cidr).ok_or_else(|| {
        ConstructError::validation(resource, "cidr", format!("'{}' is not an IPv4 CIDR block", settings.cidr))
    })?;
    if !(16..=MAX_SUBNET_MASK).contains(&cidr.prefix()) {
        return Err(ConstructError::validation(
            resource,
            "cidr",
            format!("network masks must lie between /16 and /{}", MAX_SUBNET_MASK),
        ));
    }
    if settings.max_azs == 0 || settings.max_azs > MAX_AZS {
        return Err(ConstructError::validation(
            resource,
            "maxAzs",
            format!("between 1 and {} availability zones are supported", MAX_AZS),
        ));
    }
    if settings.subnet_configuration.is_empty() {
        return Err(ConstructError::validation(
            resource,
            "subnetConfiguration",
            "at least one subnet configuration is required",
        ));
    }

    let mut names = BTreeSet::new();
    for config in &settings.subnet_configuration {
        if config.name.is_empty() || !config.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConstructError::validation(
                resource,
                "subnetConfiguration.name",
                format!("'{}' must be a non-empty alphanumeric name", config.name),
            ));
        }
        if !names.insert(config.name.as_str()) {
            return Err(ConstructError::validation(
                resource,
                "subnetConfiguration.name",
                format!("subnet name '{}' is used twice", config.name),
            ));
        }
    }

    let has_public = settings.has_subnets(SubnetType::Public);
    if settings.has_subnets(SubnetType::Private) {
        if settings.nat_gateways == 0 {
            return Err(ConstructError::validation(
                resource,
                "natGateways",
                "private subnets need at least one NAT gateway",
            ));
        }
        if !has_public {
            return Err(ConstructError::validation(
                resource,
                "subnetConfiguration",
                "private subnets route through NAT gateways in public subnets",
            ));
        }
    }
    if settings.nat_gateways > 0 && !has_public {
        return Err(ConstructError::validation(
            resource,
            "natGateways",
            "NAT gateways need a public subnet",
        ));
    }
    if settings.nat_gateways > settings.max_azs {
        return Err(ConstructError::validation(
            resource,
            "natGateways",
            "at most one NAT gateway per availability zone",
        ));
    }

    plan_subnets(resource, settings)?;
    Ok(())
}

pub fn check_cache(resource: &str, settings: &CacheSettings) -> ConstructResult<()> {
    let name = &settings.cluster_name;
    if !pattern(CLUSTER_NAME_PATTERN)?.is_match(name) || name.contains("--") || name.ends_with('-') {
        return Err(ConstructError::validation(
            resource,
            "clusterName",
            format!("'{}' is not a valid cluster name", name),
        ));
    }
    if settings.num_cache_nodes == 0 {
        return Err(ConstructError::validation(
            resource,
            "numCacheNodes",
            "a cluster needs at least one node",
        ));
    }
    if settings.az_mode == AzMode::CrossAz {
        if settings.engine != CacheEngine::Memcached {
            return Err(ConstructError::validation(
                resource,
                "azMode",
                "only memcached clusters span availability zones",
            ));
        }
        if settings.num_cache_nodes < 2 {
            return Err(ConstructError::validation(
                resource,
                "azMode",
                "a cross-az cluster needs at least two nodes",
            ));
        }
    }
    if settings.engine == CacheEngine::Redis && settings.num_cache_nodes != 1 {
        return Err(ConstructError::validation(
            resource,
            "numCacheNodes",
            "a redis cluster has exactly one node",
        ));
    }
    Ok(())
}

pub fn check_function(resource: &str, settings: &FunctionSettings) -> ConstructResult<()> {
    let code = &settings.code;
    check_exclusive(
        resource,
        &[("code.zipFile", code.zip_file.is_some()), ("code.s3Bucket", code.s3_bucket.is_some())],
    )?;
    if code.zip_file.is_none() && code.s3_bucket.is_none() {
        return Err(ConstructError::configuration(
            format!("{}.code", resource),
            "either zipFile or s3Bucket is required",
        ));
    }
    if code.s3_bucket.is_some() && code.s3_key.is_none() {
        return Err(ConstructError::configuration(
            format!("{}.code.s3Key", resource),
            "code in a bucket requires an object key",
        ));
    }
    if settings.handler.trim().is_empty() {
        return Err(ConstructError::validation(resource, "handler", "handler must not be empty"));
    }
    if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&settings.timeout) {
        return Err(ConstructError::validation(
            resource,
            "timeout",
            format!("timeout must lie between {} and {} seconds", MIN_TIMEOUT, MAX_TIMEOUT),
        ));
    }
    if !(MIN_MEMORY..=MAX_MEMORY).contains(&settings.memory_size) {
        return Err(ConstructError::validation(
            resource,
            "memorySize",
            format!("memory must lie between {} and {} MB", MIN_MEMORY, MAX_MEMORY),
        ));
    }
    for key in settings.environment.keys() {
        check_environment_name(resource, key)?;
    }
    Ok(())
}

pub fn check_environment_name(resource: &str, name: &str) -> ConstructResult<()> {
    if !pattern(ENV_VAR_PATTERN)?.is_match(name) {
        return Err(ConstructError::validation(
            resource,
            format!("environment.{}", name),
            "not a valid environment variable name",
        ));
    }
    Ok(())
}

pub fn check_table(resource: &str, settings: &TableSettings) -> ConstructResult<()> {
    let input = &settings.table_input;
    if let Some(descriptor) = &input.storage_descriptor {
        check_columns(resource, "tableInput.storageDescriptor.columns", &descriptor.columns)?;
    }
    check_columns(resource, "tableInput.partitionKeys", &input.partition_keys)
}

fn check_columns(resource: &str, path: &str, columns: &[Column]) -> ConstructResult<()> {
    let mut seen = BTreeSet::new();
    for column in columns {
        if column.name.trim().is_empty() {
            return Err(ConstructError::validation(resource, path, "column names must not be empty"));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(ConstructError::validation(
                resource,
                path,
                format!("column '{}' is declared twice", column.name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::RemovalPolicy;

    fn bucket() -> BucketSettings {
        BucketSettings {
            bucket_name: None,
            removal_policy: RemovalPolicy::Retain,
            versioned: true,
            encryption: BucketEncryption::S3Managed,
            encryption_key_arn: None,
            block_public_access: true,
            enforce_ssl: true,
            access_logging: true,
            server_access_logs_prefix: None,
            lifecycle_rules: Vec::new(),
            allow_unencrypted: false,
        }
    }

    #[test]
    fn test_check_exclusive() {
        assert!(check_exclusive("Fn", &[("a", true), ("b", false)]).is_ok());
        let err = check_exclusive("Fn", &[("a", true), ("b", true)]).unwrap_err();
        assert!(matches!(err, ConstructError::Configuration { ref path, .. } if path == "Fn.a"));
        assert!(err.to_string().contains("'a' and 'b'"));
    }

    #[test]
    fn test_unencrypted_bucket_with_opt_in() {
        let mut settings = bucket();
        settings.encryption = BucketEncryption::Unencrypted;
        assert!(check_bucket("B", &settings).is_err());
        settings.allow_unencrypted = true;
        assert!(check_bucket("B", &settings).is_ok());
    }

    #[test]
    fn test_key_requires_kms() {
        let mut settings = bucket();
        settings.encryption_key_arn = Some("arn:aws:kms:::key/1".to_string());
        assert!(check_bucket("B", &settings).unwrap_err().is_configuration());
    }

    #[test]
    fn test_bucket_names() {
        let mut settings = bucket();
        for good in ["my-bucket", "logs.example.com", "abc"] {
            settings.bucket_name = Some(good.to_string());
            assert!(check_bucket("B", &settings).is_ok(), "{}", good);
        }
        for bad in ["My-Bucket", "ab", "a..b", "192.168.1.1", "-bucket", "bucket-"] {
            settings.bucket_name = Some(bad.to_string());
            assert!(check_bucket("B", &settings).is_err(), "{}", bad);
        }
    }
}
