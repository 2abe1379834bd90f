//! Naming helpers.

use std::path::Path;

/// Component name a construct uses for its own primary resource.
pub const PRIMARY_RESOURCE: &str = "Resource";

/// Derive a logical id from construct path components.
///
/// Only ASCII alphanumerics survive; components are concatenated as-is.
/// [`PRIMARY_RESOURCE`] components are dropped so a construct's main resource
/// is named after the construct.
pub fn logical_id<S: AsRef<str>>(components: &[S]) -> String {
    components
        .iter()
        .filter(|c| c.as_ref() != PRIMARY_RESOURCE)
        .flat_map(|c| c.as_ref().chars())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Stack name for an integration test file.
///
/// `integ.apigateway-dynamodb-CRUD.js` becomes `apigateway-dynamodb-CRUD`:
/// the extension is dropped, only the text after the last remaining `.` is
/// kept and underscores become dashes.
pub fn integ_stack_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let last = stem.rsplit('.').next().unwrap_or(&stem);
    last.replace('_', "-")
}
