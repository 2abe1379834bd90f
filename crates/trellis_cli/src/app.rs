//! App definition files.
//!
//! An app definition names a stack, the patterns to assemble into it and any
//! extra suppressions to attach afterwards:
//!
//! ```yaml
//! stack:
//!   name: uploads
//!   environment:
//!     region: eu-west-1
//! patterns:
//!   - type: lambda-s3
//!     id: uploads
//!     props:
//!       lambdaFunctionProps:
//!         runtime: nodejs20.x
//!         handler: index.handler
//!         code:
//!           zipFile: "exports.handler = async () => {}"
//! suppressions:
//!   - path: uploads/S3Bucket/Resource
//!     check: W51
//!     reason: Access is governed by the enforced SSL policy
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use trellis_constructs::{
    CacheCluster, CacheClusterProps, CatalogTable, CatalogTableProps, LambdaToS3, LambdaToS3Props,
};
use trellis_core::{CheckId, ConstructError, ConstructResult, OutputTree, Scope, StackConfig, Suppression};

/// Patterns an app definition can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternType {
    LambdaS3,
    CacheCluster,
    CatalogTable,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::LambdaS3 => "lambda-s3",
            PatternType::CacheCluster => "cache-cluster",
            PatternType::CatalogTable => "catalog-table",
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pattern to assemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatternSpec {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub props: Value,
}

impl PatternSpec {
    fn props<T: DeserializeOwned + Default>(&self) -> ConstructResult<T> {
        if self.props.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.props.clone())
            .map_err(|e| ConstructError::configuration(format!("patterns.{}.props", self.id), e.to_string()))
    }

    fn assemble(&self, scope: &mut Scope<'_>) -> ConstructResult<()> {
        debug!("Assembling {} pattern '{}'", self.pattern_type, self.id);
        match self.pattern_type {
            PatternType::LambdaS3 => {
                LambdaToS3::new(scope, &self.id, self.props::<LambdaToS3Props>()?)?;
            }
            PatternType::CacheCluster => {
                CacheCluster::new(scope, &self.id, self.props::<CacheClusterProps>()?)?;
            }
            PatternType::CatalogTable => {
                CatalogTable::new(scope, &self.id, self.props::<CatalogTableProps>()?)?;
            }
        }
        Ok(())
    }
}

/// A suppression attached to a resource by construct path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuppressionSpec {
    pub path: String,
    pub check: String,
    pub reason: String,
}

/// A stack and the patterns assembled into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppDefinition {
    pub stack: StackConfig,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressions: Vec<SuppressionSpec>,
}

impl AppDefinition {
    /// Load an app definition. `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: &Path) -> ConstructResult<Self> {
        let content = fs::read_to_string(path)?;
        let app = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(app)
    }

    pub fn to_file(&self, path: &Path) -> ConstructResult<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Assemble every pattern in order, then attach the extra suppressions.
    pub fn build(&self) -> ConstructResult<OutputTree> {
        let mut tree = OutputTree::new(self.stack.clone());
        for pattern in &self.patterns {
            pattern.assemble(&mut tree.root())?;
        }

        for spec in &self.suppressions {
            let check = CheckId::from_str(&spec.check).ok_or_else(|| {
                ConstructError::configuration(
                    format!("suppressions.{}", spec.path),
                    format!("unknown check '{}'", spec.check),
                )
            })?;
            let handle = tree
                .find_by_path(&spec.path)
                .map(|d| d.handle())
                .ok_or_else(|| {
                    ConstructError::configuration(
                        format!("suppressions.{}", spec.path),
                        "no resource is declared at this path",
                    )
                })?;
            tree.suppress(&handle, vec![Suppression::new(check, spec.reason.as_str())?]);
        }

        info!(
            "Built stack '{}': {} pattern(s), {} resource(s)",
            self.stack.name,
            self.patterns.len(),
            tree.len()
        );
        Ok(tree)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}
