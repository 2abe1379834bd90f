use serde_json::json;

use trellis_core::{ConstructResult, Fragment};

use super::DefaultContext;

pub(super) fn default(_ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({ "allowAllOutbound": true }))
}
