//! # trellis_core
//!
//! Property merging, output tree management and template synthesis for
//! trellis.
//!
//! This crate provides:
//! - **Fragments**: nested configuration units and the closed-schema bridge to typed props
//! - **Property Merger**: recursive, non-mutating override of defaults
//! - **Output Tree**: scoped registration of resource declarations with naming and binding checks
//! - **Validation**: structural checks over every declaration an assembly produces
//! - **Suppressions**: documented opt-outs of named policy checks
//! - **Synthesis**: deterministic, dependency-ordered template documents
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::{merge, Fragment};
//!
//! let defaults = Fragment::from_value(json!({"versioned": true, "removalPolicy": "retain"})).unwrap();
//! let overrides = Fragment::from_value(json!({"removalPolicy": "destroy"})).unwrap();
//!
//! let merged = merge(&defaults, Some(&overrides));
//! assert_eq!(merged.get("removalPolicy"), Some(&json!("destroy")));
//! assert_eq!(merged.get("versioned"), Some(&json!(true)));
//! ```

pub mod environment;
pub mod error;
pub mod fragment;
pub mod merge;
pub mod naming;
pub mod resource;
pub mod suppression;
pub mod template;
pub mod tokens;
pub mod tree;
pub mod validate;

pub use environment::{Environment, StackConfig};
pub use error::{ConstructError, ConstructResult};
pub use fragment::Fragment;
pub use merge::{merge, merge_all};
pub use naming::{integ_stack_name, logical_id, PRIMARY_RESOURCE};
pub use resource::{RemovalPolicy, ResourceDeclaration, ResourceFamily, ResourceHandle, ResourceKind};
pub use suppression::{CheckId, Suppression};
pub use template::{Template, TemplateFormat};
pub use tokens::Pseudo;
pub use tree::{OutputTree, Scope};
pub use validate::validate_declaration;
