use serde_json::json;

use trellis_core::{ConstructResult, Fragment};

use super::DefaultContext;

pub(super) fn secure(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "removalPolicy": "retain",
        "versioned": true,
        "encryption": "s3-managed",
        "blockPublicAccess": true,
        "enforceSsl": true,
        "accessLogging": true,
        "lifecycleRules": [{
            "enabled": true,
            "noncurrentVersionTransitions": [{
                "storageClass": "GLACIER",
                "transitionInDays": 90
            }]
        }]
    }))
}

pub(super) fn access_log(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "removalPolicy": "retain",
        "versioned": true,
        "encryption": "s3-managed",
        "blockPublicAccess": true,
        "enforceSsl": true,
        "accessLogging": false
    }))
}

pub(super) fn scrap(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "removalPolicy": "destroy",
        "versioned": true,
        "encryption": "s3-managed",
        "blockPublicAccess": true,
        "enforceSsl": false,
        "accessLogging": false
    }))
}
