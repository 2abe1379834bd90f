//! # trellis_constructs
//!
//! Default profiles, resource builders and pattern assemblers for trellis.
//!
//! Patterns are the entry point: each one opens a single assembly in the
//! output tree, resolves its families' default profiles, merges caller props
//! over them, checks the result and registers the declarations it needs.
//!
//! ## Features
//!
//! - Versioned default profiles per resource family
//! - Builders for storage, network, security group, cache, catalog, compute and IAM resources
//! - Family policy checks run before anything is registered
//! - `lambda-s3`, `cache-cluster` and `catalog-table` patterns
//!
//! ## Example
//!
//! ```rust
//! use trellis_constructs::builders::{FunctionCode, FunctionProps, Runtime};
//! use trellis_constructs::patterns::{LambdaToS3, LambdaToS3Props};
//! use trellis_core::{OutputTree, StackConfig};
//!
//! let mut tree = OutputTree::new(StackConfig::new("demo"));
//! let props = LambdaToS3Props {
//!     lambda_function_props: Some(FunctionProps {
//!         runtime: Some(Runtime::Nodejs20),
//!         handler: Some("index.handler".to_string()),
//!         code: Some(FunctionCode::inline("exports.handler = async () => {}")),
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//! let pattern = LambdaToS3::new(&mut tree.root(), "uploads", props).unwrap();
//!
//! let template = tree.synthesize().unwrap();
//! assert!(template.resource(&pattern.bucket.bucket.logical_id).is_some());
//! ```

pub mod builders;
pub mod defaults;
pub mod patterns;
pub mod policy;

pub use defaults::{default_fragment_for, default_table_fragment, lookup, profiles, DefaultContext, DefaultProfile, ProfileFamily};
pub use patterns::{
    AssemblyStage, CacheCluster, CacheClusterProps, CatalogTable, CatalogTableProps, LambdaToS3, LambdaToS3Props,
};
