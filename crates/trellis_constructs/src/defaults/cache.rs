use serde_json::json;

use trellis_core::{ConstructResult, Fragment};

use super::DefaultContext;

const MEMCACHED_PORT: u16 = 11211;
const REDIS_PORT: u16 = 6379;
const NODE_TYPE: &str = "cache.t3.medium";

/// Port a memcached cluster listens on unless configured otherwise.
pub fn default_cache_port() -> u16 {
    MEMCACHED_PORT
}

pub(super) fn memcached(ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "clusterName": format!("{}-cdk-cluster", ctx.name),
        "cacheNodeType": NODE_TYPE,
        "engine": "memcached",
        "numCacheNodes": 2,
        "port": MEMCACHED_PORT,
        "azMode": "cross-az"
    }))
}

pub(super) fn redis(ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "clusterName": format!("{}-cdk-cluster", ctx.name),
        "cacheNodeType": NODE_TYPE,
        "engine": "redis",
        "numCacheNodes": 1,
        "port": REDIS_PORT,
        "azMode": "single-az"
    }))
}
