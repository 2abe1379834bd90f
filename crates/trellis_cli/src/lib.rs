//! # trellis_cli
//!
//! App definition loading and exit code mapping for the `trellis` binary.

pub mod app;

pub use app::{AppDefinition, PatternSpec, PatternType, SuppressionSpec};

use trellis_core::ConstructError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const CONFIGURATION_ERROR: u8 = 4;
    pub const SYNTHESIS_ERROR: u8 = 5;
}

/// Categorize error to determine exit code
pub fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.chain().find_map(|cause| cause.downcast_ref::<ConstructError>()) {
        return match err {
            ConstructError::Validation { .. } | ConstructError::BindingNotFound { .. } => {
                ExitCodes::VALIDATION_FAILURE
            }
            ConstructError::Configuration { .. }
            | ConstructError::UnknownVariant { .. }
            | ConstructError::NamingCollision { .. }
            | ConstructError::Json(_)
            | ConstructError::Yaml(_) => ExitCodes::CONFIGURATION_ERROR,
            ConstructError::AssemblyAborted { .. } => ExitCodes::SYNTHESIS_ERROR,
            ConstructError::Io(_) => ExitCodes::INVALID_ARGS,
        };
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("argument") || msg.contains("unknown") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
