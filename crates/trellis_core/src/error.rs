//! Error types for construct assembly.

use thiserror::Error;

/// Result type alias for construct operations.
pub type ConstructResult<T> = Result<T, ConstructError>;

/// Errors that can occur while merging, building, validating or synthesizing.
#[derive(Error, Debug)]
pub enum ConstructError {
    #[error("Configuration error at {path}: {message}")]
    Configuration { path: String, message: String },

    #[error("Naming collision: '{id}' already exists in scope '{scope}'")]
    NamingCollision { scope: String, id: String },

    #[error("Unknown variant '{variant}' for resource family '{family}'")]
    UnknownVariant { family: String, variant: String },

    #[error("Binding not found: '{resource}' references '{target}' which is not in the output tree")]
    BindingNotFound { resource: String, target: String },

    #[error("Validation failed for '{resource}' at {path}: {message}")]
    Validation {
        resource: String,
        path: String,
        message: String,
    },

    #[error("Output tree is unusable after the aborted assembly of '{assembly}'")]
    AssemblyAborted { assembly: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConstructError {
    pub fn configuration(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn validation(
        resource: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unknown_variant(family: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::UnknownVariant {
            family: family.into(),
            variant: variant.into(),
        }
    }

    /// Whether this error stems from malformed, missing or unsupported configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::UnknownVariant { .. })
    }
}
