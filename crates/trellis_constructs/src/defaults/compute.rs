use serde_json::json;

use trellis_core::{ConstructResult, Fragment};

use super::DefaultContext;

pub(super) fn standard(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "timeout": 3,
        "memorySize": 128,
        "environment": {},
        "tracing": "pass-through"
    }))
}
