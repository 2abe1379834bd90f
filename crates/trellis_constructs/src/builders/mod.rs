//! Resource builders.
//!
//! Each family has two steps. `resolve_*` merges caller props over a default
//! profile, decodes the result and checks it against the family's policy.
//! `build_*` takes that [`Merged`] value as is and registers the resulting
//! declarations in the scope it was handed. Every binding to another resource
//! is recorded as an explicit dependency.

pub mod cache;
pub mod catalog;
pub mod compute;
pub mod iam;
pub mod network;
pub mod security_group;
pub mod storage;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use trellis_core::{merge_all, ConstructResult, Fragment};

pub use cache::{
    build_cache_cluster, create_cache_subnet_group, resolve_cache, CacheBindings, CacheClusterHandle, CacheProps,
    CacheSettings, SubnetGroupHandle,
};
pub use catalog::{
    build_glue_database, build_glue_table, resolve_glue_database, Column, DatabaseHandle, DatabaseSettings, TableHandle,
};
pub use compute::{
    build_function, resolve_function, BucketGrant, FunctionBindings, FunctionCode, FunctionHandle, FunctionProps,
    FunctionSettings, Runtime,
};
pub use iam::{grant_bucket_access, BucketPermission, DEFAULT_BUCKET_PERMISSIONS};
pub use network::{build_vpc, resolve_vpc, SubnetType, VpcHandle, VpcProps, VpcSettings};
pub use security_group::{build_security_group, IngressRule, SecurityGroupProps};
pub use storage::{build_bucket, resolve_bucket, BucketHandle, BucketProps, BucketSettings};

/// A merged fragment together with the settings decoded from it.
#[derive(Debug, Clone)]
pub struct Merged<T> {
    pub fragment: Fragment,
    pub settings: T,
}

/// Turn optional typed props into an override layer.
pub(crate) fn props_layer<P: Serialize>(props: Option<&P>) -> ConstructResult<Option<Fragment>> {
    props.map(Fragment::from_props).transpose()
}

/// Merge `layers` over `defaults` and decode the result.
///
/// `required` key paths must survive the merge with a non-null value.
pub(crate) fn merge_settings<T: DeserializeOwned>(
    resource: &str,
    defaults: &Fragment,
    layers: &[Fragment],
    required: &[&str],
) -> ConstructResult<Merged<T>> {
    let fragment = merge_all(defaults, layers);
    fragment.require_keys(resource, required)?;
    let settings = fragment.to_settings(resource)?;
    debug!("Merged {} override layer(s) for '{}'", layers.len(), resource);
    Ok(Merged { fragment, settings })
}
