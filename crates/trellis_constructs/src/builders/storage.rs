//! Storage buckets.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use trellis_core::tokens;
use trellis_core::{
    CheckId, ConstructError, ConstructResult, Environment, Fragment, RemovalPolicy,
    ResourceDeclaration, ResourceHandle, ResourceKind, Scope, Suppression, PRIMARY_RESOURCE,
};

use super::{merge_settings, props_layer, Merged};
use crate::defaults::{default_fragment_for, DefaultContext, ProfileFamily};
use crate::policy;

/// Construct id of the access log destination inside a bucket construct.
pub const ACCESS_LOG_ID: &str = "AccessLog";

/// Storage profile used for access log destinations.
pub const ACCESS_LOG_VARIANT: &str = "access-log";

const REQUIRED_KEYS: &[&str] = &[
    "removalPolicy",
    "versioned",
    "encryption",
    "blockPublicAccess",
    "enforceSsl",
    "accessLogging",
];

/// Server-side encryption of stored objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketEncryption {
    #[serde(alias = "UNENCRYPTED")]
    Unencrypted,
    #[serde(alias = "S3_MANAGED")]
    S3Managed,
    #[serde(alias = "KMS")]
    Kms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionTransition {
    pub storage_class: String,
    pub transition_in_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LifecycleRule {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noncurrent_version_expiration_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub noncurrent_version_transitions: Vec<VersionTransition>,
}

fn enabled() -> bool {
    true
}

impl LifecycleRule {
    /// Whether the rule acts on noncurrent object versions.
    pub fn uses_noncurrent_versions(&self) -> bool {
        self.noncurrent_version_expiration_days.is_some() || !self.noncurrent_version_transitions.is_empty()
    }

    fn render(&self) -> Value {
        let mut rule = Fragment::new().with("Status", if self.enabled { "Enabled" } else { "Disabled" });
        if let Some(prefix) = &self.prefix {
            rule.insert("Prefix", prefix.as_str());
        }
        if let Some(days) = self.expiration_days {
            rule.insert("ExpirationInDays", days);
        }
        if let Some(days) = self.noncurrent_version_expiration_days {
            rule.insert("NoncurrentVersionExpirationInDays", days);
        }
        if !self.noncurrent_version_transitions.is_empty() {
            let transitions: Vec<Value> = self
                .noncurrent_version_transitions
                .iter()
                .map(|t| json!({"StorageClass": t.storage_class, "TransitionInDays": t.transition_in_days}))
                .collect();
            rule.insert("NoncurrentVersionTransitions", transitions);
        }
        rule.into_value()
    }
}

/// Caller overrides for a bucket. Unset fields keep the profile's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct BucketProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<RemovalPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<BucketEncryption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_public_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_ssl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_logging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_access_logs_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle_rules: Option<Vec<LifecycleRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unencrypted: Option<bool>,
}

/// Fully merged bucket configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BucketSettings {
    #[serde(default)]
    pub bucket_name: Option<String>,
    pub removal_policy: RemovalPolicy,
    pub versioned: bool,
    pub encryption: BucketEncryption,
    #[serde(default)]
    pub encryption_key_arn: Option<String>,
    pub block_public_access: bool,
    pub enforce_ssl: bool,
    pub access_logging: bool,
    #[serde(default)]
    pub server_access_logs_prefix: Option<String>,
    #[serde(default)]
    pub lifecycle_rules: Vec<LifecycleRule>,
    #[serde(default)]
    pub allow_unencrypted: bool,
}

/// Handles to a built bucket and its sub-resources.
#[derive(Debug, Clone)]
pub struct BucketHandle {
    pub bucket: ResourceHandle,
    pub policy: Option<ResourceHandle>,
    pub logging_bucket: Option<ResourceHandle>,
    /// The merged configuration fragment the bucket was built from.
    pub merged: Fragment,
    pub settings: BucketSettings,
}

impl BucketHandle {
    pub fn bucket_name(&self) -> Value {
        self.bucket.reference()
    }

    pub fn arn(&self) -> Value {
        self.bucket.arn()
    }
}

/// Merge `props` over a storage profile and check the result.
pub fn resolve_bucket(
    environment: &Environment,
    id: &str,
    variant: Option<&str>,
    props: Option<&BucketProps>,
) -> ConstructResult<Merged<BucketSettings>> {
    let ctx = DefaultContext::new(environment, id);
    let defaults = default_fragment_for(ProfileFamily::Storage, variant, &ctx)?;
    let layers: Vec<Fragment> = props_layer(props)?.into_iter().collect();
    let merged = merge_settings::<BucketSettings>(id, &defaults, &layers, REQUIRED_KEYS)?;
    policy::check_bucket(id, &merged.settings)?;
    Ok(merged)
}

/// Build a bucket construct under `id` from settings `resolve_bucket` produced.
///
/// With access logging on, the log destination is built first from the
/// `access-log` profile merged with `logging_props`, then bound to the bucket.
pub fn build_bucket(
    scope: &mut Scope<'_>,
    id: &str,
    merged: Merged<BucketSettings>,
    logging_props: Option<&BucketProps>,
) -> ConstructResult<BucketHandle> {
    let mut bucket_scope = scope.child(id)?;

    let logging_bucket = if merged.settings.access_logging {
        let log = resolve_bucket(bucket_scope.environment(), ACCESS_LOG_ID, Some(ACCESS_LOG_VARIANT), logging_props)?;
        if log.settings.access_logging {
            return Err(ConstructError::validation(
                format!("{}/{}", bucket_scope.path(), ACCESS_LOG_ID),
                "accessLogging",
                "an access log destination cannot log its own access",
            ));
        }
        let mut log_scope = bucket_scope.child(ACCESS_LOG_ID)?;
        let (handle, _) = declare(&mut log_scope, &log.settings, None, true)?;
        Some(handle)
    } else {
        None
    };

    let (bucket, policy) = declare(&mut bucket_scope, &merged.settings, logging_bucket.as_ref(), false)?;
    info!(
        "Built bucket '{}' (logging: {}, ssl policy: {})",
        bucket.path,
        logging_bucket.is_some(),
        policy.is_some()
    );

    Ok(BucketHandle {
        bucket,
        policy,
        logging_bucket,
        merged: merged.fragment,
        settings: merged.settings,
    })
}

fn declare(
    scope: &mut Scope<'_>,
    settings: &BucketSettings,
    logging: Option<&ResourceHandle>,
    is_log_destination: bool,
) -> ConstructResult<(ResourceHandle, Option<ResourceHandle>)> {
    let mut declaration = ResourceDeclaration::new(ResourceKind::Bucket, bucket_properties(settings, logging))
        .with_removal_policy(settings.removal_policy);
    if let Some(log) = logging {
        declaration = declaration.with_reference("accessLogs", log);
    }
    if is_log_destination {
        let mut suppressions = vec![Suppression::new(
            CheckId::W35,
            "This bucket is the access log destination for another bucket",
        )?];
        if !settings.enforce_ssl {
            suppressions.push(Suppression::new(
                CheckId::W51,
                "Only the log delivery service writes to this bucket",
            )?);
        }
        declaration = declaration.with_suppressions(suppressions);
    }
    let bucket = scope.register(PRIMARY_RESOURCE, declaration)?;

    let policy = if settings.enforce_ssl {
        let declaration = ResourceDeclaration::new(ResourceKind::BucketPolicy, ssl_policy(&bucket)).depends_on(&bucket);
        Some(scope.register("Policy", declaration)?)
    } else {
        None
    };
    Ok((bucket, policy))
}

fn bucket_properties(settings: &BucketSettings, logging: Option<&ResourceHandle>) -> Fragment {
    let mut props = Fragment::new();
    if let Some(name) = &settings.bucket_name {
        props.insert("BucketName", name.as_str());
    }
    let sse = match settings.encryption {
        BucketEncryption::Unencrypted => None,
        BucketEncryption::S3Managed => Some(json!({"SSEAlgorithm": "AES256"})),
        BucketEncryption::Kms => Some(match &settings.encryption_key_arn {
            Some(arn) => json!({"KMSMasterKeyID": arn, "SSEAlgorithm": "aws:kms"}),
            None => json!({"SSEAlgorithm": "aws:kms"}),
        }),
    };
    if let Some(sse) = sse {
        props.insert(
            "BucketEncryption",
            json!({"ServerSideEncryptionConfiguration": [{"ServerSideEncryptionByDefault": sse}]}),
        );
    }
    if !settings.lifecycle_rules.is_empty() {
        let rules: Vec<Value> = settings.lifecycle_rules.iter().map(LifecycleRule::render).collect();
        props.insert("LifecycleConfiguration", json!({ "Rules": rules }));
    }
    if let Some(log) = logging {
        let mut config = Fragment::new().with("DestinationBucketName", log.reference());
        if let Some(prefix) = &settings.server_access_logs_prefix {
            config.insert("LogFilePrefix", prefix.as_str());
        }
        props.insert("LoggingConfiguration", config);
    }
    if settings.block_public_access {
        props.insert(
            "PublicAccessBlockConfiguration",
            json!({
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true
            }),
        );
    }
    if settings.versioned {
        props.insert("VersioningConfiguration", json!({"Status": "Enabled"}));
    }
    props
}

fn ssl_policy(bucket: &ResourceHandle) -> Fragment {
    let objects = tokens::join("", vec![bucket.arn(), Value::from("/*")]);
    Fragment::new().with("Bucket", bucket.reference()).with(
        "PolicyDocument",
        json!({
            "Statement": [{
                "Action": "s3:*",
                "Condition": {"Bool": {"aws:SecureTransport": "false"}},
                "Effect": "Deny",
                "Principal": {"AWS": "*"},
                "Resource": [bucket.arn(), objects],
                "Sid": "HttpsOnly"
            }],
            "Version": "2012-10-17"
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{OutputTree, StackConfig};

    fn build(props: Option<&BucketProps>) -> (OutputTree, ConstructResult<BucketHandle>) {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let result = tree
            .root()
            .assemble("app", |scope| {
                let merged = resolve_bucket(scope.environment(), "S3Bucket", None, props)?;
                build_bucket(scope, "S3Bucket", merged, None)
            });
        (tree, result)
    }

    #[test]
    fn test_secure_bucket_with_access_log() {
        let (tree, result) = build(None);
        let handle = result.unwrap();

        assert_eq!(handle.bucket.logical_id, "appS3Bucket");
        assert_eq!(handle.logging_bucket.as_ref().map(|h| h.logical_id.as_str()), Some("appS3BucketAccessLog"));
        assert_eq!(handle.policy.as_ref().map(|h| h.logical_id.as_str()), Some("appS3BucketPolicy"));

        let bucket = tree.get("appS3Bucket").unwrap();
        assert_eq!(
            bucket.property("LoggingConfiguration.DestinationBucketName"),
            Some(&json!({"Ref": "appS3BucketAccessLog"}))
        );
        assert_eq!(bucket.removal_policy(), Some(RemovalPolicy::Retain));
        assert!(bucket.dependencies().contains("appS3BucketAccessLog"));

        let log = tree.get("appS3BucketAccessLog").unwrap();
        assert_eq!(log.suppressions().len(), 1);
        assert_eq!(log.suppressions()[0].check(), CheckId::W35);
        assert!(log.property("LoggingConfiguration").is_none());
    }

    #[test]
    fn test_access_log_bucket_built_first() {
        let (tree, result) = build(None);
        result.unwrap();
        let order: Vec<&str> = tree.declarations().iter().map(|d| d.logical_id()).collect();
        assert_eq!(
            order,
            vec!["appS3BucketAccessLog", "appS3BucketAccessLogPolicy", "appS3Bucket", "appS3BucketPolicy"]
        );
    }

    #[test]
    fn test_logging_disabled() {
        let props = BucketProps {
            access_logging: Some(false),
            removal_policy: Some(RemovalPolicy::Destroy),
            ..Default::default()
        };
        let (tree, result) = build(Some(&props));
        let handle = result.unwrap();
        assert!(handle.logging_bucket.is_none());
        assert_eq!(tree.len(), 2);
        assert_eq!(handle.settings.removal_policy, RemovalPolicy::Destroy);
    }

    #[test]
    fn test_unencrypted_requires_opt_in() {
        let props = BucketProps {
            encryption: Some(BucketEncryption::Unencrypted),
            ..Default::default()
        };
        let (tree, result) = build(Some(&props));
        let err = result.unwrap_err();
        assert!(matches!(err, ConstructError::Validation { ref path, .. } if path == "encryption"));
        assert!(tree.is_aborted());
    }

    #[test]
    fn test_kms_key_rendered() {
        let props = BucketProps {
            encryption: Some(BucketEncryption::Kms),
            encryption_key_arn: Some("arn:aws:kms:us-east-1:123456789012:key/abc".to_string()),
            access_logging: Some(false),
            ..Default::default()
        };
        let (tree, result) = build(Some(&props));
        result.unwrap();
        let bucket = tree.get("appS3Bucket").unwrap();
        let sse = bucket
            .property("BucketEncryption.ServerSideEncryptionConfiguration")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("ServerSideEncryptionByDefault"))
            .unwrap();
        assert_eq!(sse["SSEAlgorithm"], json!("aws:kms"));
    }

    #[test]
    fn test_ssl_policy_denies_insecure_transport() {
        let (tree, result) = build(None);
        result.unwrap();
        let policy = tree.get("appS3BucketPolicy").unwrap();
        assert_eq!(policy.property("Bucket"), Some(&json!({"Ref": "appS3Bucket"})));
        let statement = policy.property("PolicyDocument.Statement").and_then(|s| s.get(0)).unwrap();
        assert_eq!(statement["Effect"], json!("Deny"));
        assert_eq!(statement["Condition"]["Bool"]["aws:SecureTransport"], json!("false"));
    }

    #[test]
    fn test_props_deserialize_upper_case_values() {
        let props: BucketProps =
            serde_json::from_value(json!({"removalPolicy": "DESTROY", "encryption": "S3_MANAGED"})).unwrap();
        assert_eq!(props.removal_policy, Some(RemovalPolicy::Destroy));
        assert_eq!(props.encryption, Some(BucketEncryption::S3Managed));

        let err = serde_json::from_value::<BucketProps>(json!({"colour": "red"}));
        assert!(err.is_err());
    }
}
