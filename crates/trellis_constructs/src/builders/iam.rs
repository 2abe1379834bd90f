//! Identity policies granting access to other resources.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use trellis_core::tokens;
use trellis_core::{logical_id, ConstructError, ConstructResult, Fragment, ResourceDeclaration, ResourceHandle, ResourceKind, Scope};

pub const POLICY_VERSION: &str = "2012-10-17";

/// Object-level access a function can be granted on a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BucketPermission {
    Delete,
    Put,
    Read,
    ReadWrite,
    Write,
}

/// Granted when a pattern is given no explicit permissions.
pub const DEFAULT_BUCKET_PERMISSIONS: [BucketPermission; 3] =
    [BucketPermission::Delete, BucketPermission::Put, BucketPermission::Read];

const DELETE_ACTIONS: &[&str] = &["s3:DeleteObject*"];
const PUT_ACTIONS: &[&str] = &[
    "s3:Abort*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
];
const READ_ACTIONS: &[&str] = &["s3:GetBucket*", "s3:GetObject*", "s3:List*"];

impl BucketPermission {
    pub fn actions(&self) -> Vec<&'static str> {
        match self {
            BucketPermission::Delete => DELETE_ACTIONS.to_vec(),
            BucketPermission::Put => PUT_ACTIONS.to_vec(),
            BucketPermission::Read => READ_ACTIONS.to_vec(),
            BucketPermission::Write => [DELETE_ACTIONS, PUT_ACTIONS].concat(),
            BucketPermission::ReadWrite => [READ_ACTIONS, DELETE_ACTIONS, PUT_ACTIONS].concat(),
        }
    }
}

/// Attach a policy to `role` allowing `permissions` on the objects of `bucket`.
pub fn grant_bucket_access(
    scope: &mut Scope<'_>,
    id: &str,
    role: &ResourceHandle,
    bucket: &ResourceHandle,
    permissions: &[BucketPermission],
) -> ConstructResult<ResourceHandle> {
    if permissions.is_empty() {
        return Err(ConstructError::configuration(
            format!("{}.permissions", id),
            "at least one permission is required",
        ));
    }
    if bucket.kind != ResourceKind::Bucket {
        return Err(ConstructError::configuration(
            format!("{}.bucket", id),
            format!("'{}' is not a bucket", bucket.path),
        ));
    }

    let actions: BTreeSet<&str> = permissions.iter().flat_map(BucketPermission::actions).collect();
    let objects = tokens::join("", vec![bucket.arn(), Value::from("/*")]);
    let policy_name = logical_id(&[scope.path().as_str(), id]);
    let properties = Fragment::new()
        .with(
            "PolicyDocument",
            json!({
                "Statement": [{
                    "Action": actions,
                    "Effect": "Allow",
                    "Resource": [bucket.arn(), objects]
                }],
                "Version": POLICY_VERSION
            }),
        )
        .with("PolicyName", policy_name)
        .with("Roles", json!([role.reference()]));

    let handle = scope.register(id, ResourceDeclaration::new(ResourceKind::Policy, properties).depends_on(role))?;
    debug!("Granted {:?} on '{}' to '{}'", permissions, bucket.path, role.path);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_combines_delete_and_put() {
        let write = BucketPermission::Write.actions();
        assert!(write.contains(&"s3:DeleteObject*"));
        assert!(write.contains(&"s3:PutObject"));
        assert!(!write.contains(&"s3:GetObject*"));
    }

    #[test]
    fn test_permission_names() {
        assert!(serde_json::from_value::<BucketPermission>(json!("List")).is_err());
        let parsed: Vec<BucketPermission> = serde_json::from_value(json!(["Delete", "Put", "Read"])).unwrap();
        assert_eq!(parsed, DEFAULT_BUCKET_PERMISSIONS.to_vec());
    }
}
