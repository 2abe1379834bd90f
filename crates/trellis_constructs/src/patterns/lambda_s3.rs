//! A function with access to a bucket.

use serde::Deserialize;

use trellis_core::{ConstructError, ConstructResult, ResourceHandle, Scope};

use super::AssemblyProgress;
use crate::builders::{
    build_bucket, build_function, resolve_bucket, resolve_function, BucketGrant, BucketHandle, BucketPermission,
    BucketProps, BucketSettings, FunctionBindings, FunctionHandle, FunctionProps, Merged, VpcHandle,
    DEFAULT_BUCKET_PERMISSIONS,
};
use crate::defaults::{lookup, ProfileFamily};
use crate::policy::check_exclusive;

/// Environment variable holding the bucket name unless the caller picks another.
pub const DEFAULT_BUCKET_ENV_VAR: &str = "S3_BUCKET_NAME";

const FUNCTION_ID: &str = "LambdaFunction";
const BUCKET_ID: &str = "S3Bucket";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LambdaToS3Props {
    pub lambda_function_props: Option<FunctionProps>,
    #[serde(alias = "storageProps")]
    pub bucket_props: Option<BucketProps>,
    pub logging_bucket_props: Option<BucketProps>,
    /// Shorthand for `bucketProps.accessLogging`. Access logging stays off
    /// unless requested here, in `bucketProps` or by `loggingBucketProps`.
    pub log_s3_access_logs: Option<bool>,
    pub bucket_permissions: Option<Vec<BucketPermission>>,
    pub bucket_environment_variable_name: Option<String>,
    /// A bucket built by another assembly of the same tree.
    #[serde(skip)]
    pub existing_bucket: Option<BucketHandle>,
    #[serde(skip)]
    pub existing_vpc: Option<VpcHandle>,
}

impl LambdaToS3Props {
    fn validate(&self, id: &str) -> ConstructResult<()> {
        let existing = self.existing_bucket.is_some();
        check_exclusive(id, &[("existingBucket", existing), ("bucketProps", self.bucket_props.is_some())])?;
        check_exclusive(
            id,
            &[("existingBucket", existing), ("loggingBucketProps", self.logging_bucket_props.is_some())],
        )?;
        check_exclusive(id, &[("existingBucket", existing), ("logS3AccessLogs", self.log_s3_access_logs.is_some())])?;

        let requested = self.bucket_props.as_ref().and_then(|p| p.access_logging);
        if let (Some(flag), Some(requested)) = (self.log_s3_access_logs, requested) {
            if flag != requested {
                return Err(ConstructError::configuration(
                    format!("{}.logS3AccessLogs", id),
                    "conflicts with bucketProps.accessLogging",
                ));
            }
        }
        if self.log_s3_access_logs == Some(false) && self.logging_bucket_props.is_some() {
            return Err(ConstructError::configuration(
                format!("{}.loggingBucketProps", id),
                "a logging bucket cannot be configured when access logging is off",
            ));
        }
        Ok(())
    }

    fn function_props(&self, id: &str) -> ConstructResult<&FunctionProps> {
        self.lambda_function_props.as_ref().ok_or_else(|| {
            ConstructError::configuration(format!("{}.lambdaFunctionProps", id), "function props are required")
        })
    }

    /// Bucket props with the logging shorthand folded in.
    fn effective_bucket_props(&self) -> BucketProps {
        let mut props = self.bucket_props.clone().unwrap_or_default();
        props.access_logging = self
            .log_s3_access_logs
            .or(props.access_logging)
            .or(Some(self.logging_bucket_props.is_some()));
        props
    }
}

enum Storage {
    Existing(BucketHandle),
    New(Merged<BucketSettings>),
}

/// Handles a lambda-s3 assembly exposes.
#[derive(Debug, Clone)]
pub struct LambdaToS3 {
    pub function: FunctionHandle,
    pub bucket: BucketHandle,
    /// Access log destination, when this assembly built one.
    pub logging_bucket: Option<ResourceHandle>,
    pub vpc: Option<VpcHandle>,
}

impl LambdaToS3 {
    pub fn new(scope: &mut Scope<'_>, id: &str, props: LambdaToS3Props) -> ConstructResult<Self> {
        let mut progress = AssemblyProgress::start("lambda-s3", id);
        let exposed = scope.assemble(id, |scope| {
            props.validate(id)?;
            let function_props = props.function_props(id)?;

            lookup(ProfileFamily::Compute, None)?;
            if props.existing_bucket.is_none() {
                lookup(ProfileFamily::Storage, None)?;
            }
            progress.advance();

            let function_settings = resolve_function(scope.environment(), FUNCTION_ID, Some(function_props))?;
            let storage = match &props.existing_bucket {
                Some(existing) => Storage::Existing(existing.clone()),
                None => Storage::New(resolve_bucket(
                    scope.environment(),
                    BUCKET_ID,
                    None,
                    Some(&props.effective_bucket_props()),
                )?),
            };
            progress.advance();

            let (bucket, logging_bucket) = match storage {
                Storage::Existing(existing) => (existing, None),
                Storage::New(merged) => {
                    let built = build_bucket(scope, BUCKET_ID, merged, props.logging_bucket_props.as_ref())?;
                    let logging = built.logging_bucket.clone();
                    (built, logging)
                }
            };

            let permissions = props
                .bucket_permissions
                .clone()
                .unwrap_or_else(|| DEFAULT_BUCKET_PERMISSIONS.to_vec());
            let variable = props
                .bucket_environment_variable_name
                .clone()
                .unwrap_or_else(|| DEFAULT_BUCKET_ENV_VAR.to_string());
            let bindings = FunctionBindings {
                environment: vec![(variable, &bucket.bucket)],
                bucket_grants: vec![BucketGrant {
                    bucket: &bucket.bucket,
                    permissions: &permissions,
                }],
                vpc: props.existing_vpc.as_ref(),
            };
            let function = build_function(scope, FUNCTION_ID, function_settings, bindings)?;
            progress.advance();

            Ok(LambdaToS3 {
                function,
                bucket,
                logging_bucket,
                vpc: props.existing_vpc.clone(),
            })
        })?;
        progress.finish();
        Ok(exposed)
    }
}
