use serde_json::json;

use trellis_core::{ConstructResult, Fragment};

use super::DefaultContext;

const DEFAULT_CIDR: &str = "10.0.0.0/16";
const DEFAULT_MAX_AZS: u8 = 2;
const SUBNET_MASK: u8 = 18;

pub(super) fn public_private(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "cidr": DEFAULT_CIDR,
        "maxAzs": DEFAULT_MAX_AZS,
        "natGateways": 1,
        "enableDnsHostnames": true,
        "enableDnsSupport": true,
        "subnetConfiguration": [
            {"name": "public", "subnetType": "public", "cidrMask": SUBNET_MASK},
            {"name": "private", "subnetType": "private", "cidrMask": SUBNET_MASK}
        ]
    }))
}

pub(super) fn isolated(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "cidr": DEFAULT_CIDR,
        "maxAzs": DEFAULT_MAX_AZS,
        "natGateways": 0,
        "enableDnsHostnames": true,
        "enableDnsSupport": true,
        "subnetConfiguration": [
            {"name": "isolated", "subnetType": "isolated", "cidrMask": SUBNET_MASK}
        ]
    }))
}

/// Layer applied over caller props: every network built here resolves DNS.
pub fn enforced_network_layer() -> Fragment {
    Fragment::new()
        .with("enableDnsHostnames", true)
        .with("enableDnsSupport", true)
}
