//! Pattern assemblers.
//!
//! A pattern composes several builders into one validated unit. Each one runs
//! inside a single assembly of the output tree and moves through the same
//! stages:
//!
//! ```text
//! Start -> DefaultsResolved -> Merged -> ChildrenBuilt -> Validated -> Exposed
//! ```
//!
//! A failure at any stage aborts the assembly and leaves the tree unusable.

pub mod cache_cluster;
pub mod catalog_table;
pub mod helpers;
pub mod lambda_s3;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use cache_cluster::{CacheCluster, CacheClusterProps};
pub use catalog_table::{CatalogTable, CatalogTableProps};
pub use helpers::{create_scrap_bucket, create_test_cache, test_vpc};
pub use lambda_s3::{LambdaToS3, LambdaToS3Props};

/// Stage of a pattern assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStage {
    Start,
    DefaultsResolved,
    Merged,
    ChildrenBuilt,
    Validated,
    Exposed,
}

impl AssemblyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyStage::Start => "start",
            AssemblyStage::DefaultsResolved => "defaults_resolved",
            AssemblyStage::Merged => "merged",
            AssemblyStage::ChildrenBuilt => "children_built",
            AssemblyStage::Validated => "validated",
            AssemblyStage::Exposed => "exposed",
        }
    }

    /// The stage after this one; `Exposed` is terminal.
    pub fn next(&self) -> Option<Self> {
        match self {
            AssemblyStage::Start => Some(AssemblyStage::DefaultsResolved),
            AssemblyStage::DefaultsResolved => Some(AssemblyStage::Merged),
            AssemblyStage::Merged => Some(AssemblyStage::ChildrenBuilt),
            AssemblyStage::ChildrenBuilt => Some(AssemblyStage::Validated),
            AssemblyStage::Validated => Some(AssemblyStage::Exposed),
            AssemblyStage::Exposed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl Default for AssemblyStage {
    fn default() -> Self {
        Self::Start
    }
}

impl std::fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks one pattern through its assembly stages.
#[derive(Debug)]
pub struct AssemblyProgress {
    pattern: &'static str,
    id: String,
    stage: AssemblyStage,
}

impl AssemblyProgress {
    pub fn start(pattern: &'static str, id: &str) -> Self {
        debug!("{} '{}': {}", pattern, id, AssemblyStage::Start);
        Self {
            pattern,
            id: id.to_string(),
            stage: AssemblyStage::Start,
        }
    }

    pub fn stage(&self) -> AssemblyStage {
        self.stage
    }

    /// Move to the next stage. Advancing past `Exposed` is a no-op.
    pub fn advance(&mut self) -> AssemblyStage {
        if let Some(next) = self.stage.next() {
            debug!("{} '{}': {} -> {}", self.pattern, self.id, self.stage, next);
            self.stage = next;
            if next.is_terminal() {
                info!("{} '{}' assembled", self.pattern, self.id);
            }
        }
        self.stage
    }

    /// Run out the remaining stages once the tree has validated the assembly.
    pub(crate) fn finish(&mut self) {
        while !self.stage.is_terminal() {
            self.advance();
        }
    }
}
