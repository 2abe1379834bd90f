//! Property merger.
//!
//! User overrides win at every level. Mappings present on both sides merge
//! recursively; scalars and sequences are replaced wholesale, and an explicit
//! `null` override replaces the default rather than unsetting it.

use serde_json::{Map, Value};

use crate::fragment::Fragment;

/// Merge `overrides` over `defaults`, returning a new fragment.
///
/// Neither input is touched. With no overrides the result is a copy of the
/// defaults.
pub fn merge(defaults: &Fragment, overrides: Option<&Fragment>) -> Fragment {
    let mut merged = defaults.as_map().clone();
    if let Some(overrides) = overrides {
        merge_object(&mut merged, overrides.as_map());
    }
    Fragment::from(merged)
}

/// Apply several override layers in order; later layers win.
pub fn merge_all<'a>(
    defaults: &Fragment,
    layers: impl IntoIterator<Item = &'a Fragment>,
) -> Fragment {
    layers
        .into_iter()
        .fold(defaults.clone(), |acc, layer| merge(&acc, Some(layer)))
}

fn merge_object(target: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (key, value) in layer {
        match target.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_value(target: &mut Value, layer: &Value) {
    match (target, layer) {
        (Value::Object(existing), Value::Object(incoming)) => merge_object(existing, incoming),
        (slot, _) => *slot = layer.clone(),
    }
}
