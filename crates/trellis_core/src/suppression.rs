//! Documented suppressions of named policy checks.
//!
//! Suppressions are advisory metadata for downstream template linters. They
//! never change a declaration's properties or the outcome of validation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ConstructError, ConstructResult};

/// Policy checks that may be suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckId {
    W5,
    W35,
    W36,
    W40,
    W41,
    W51,
    W58,
    W60,
    W89,
    W92,
}

impl CheckId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckId::W5 => "W5",
            CheckId::W35 => "W35",
            CheckId::W36 => "W36",
            CheckId::W40 => "W40",
            CheckId::W41 => "W41",
            CheckId::W51 => "W51",
            CheckId::W58 => "W58",
            CheckId::W60 => "W60",
            CheckId::W89 => "W89",
            CheckId::W92 => "W92",
        }
    }

    /// What the check enforces.
    pub fn description(&self) -> &'static str {
        match self {
            CheckId::W5 => "Security groups found with cidr open to world on egress",
            CheckId::W35 => "S3 bucket should have access logging configured",
            CheckId::W36 => "Security group rules without a description",
            CheckId::W40 => "Security group egress with an IpProtocol of -1",
            CheckId::W41 => "S3 bucket should have encryption option set",
            CheckId::W51 => "S3 bucket should likely have a bucket policy",
            CheckId::W58 => "Lambda functions require permission to write CloudWatch Logs",
            CheckId::W60 => "VPC should have a flow log attached",
            CheckId::W89 => "Lambda functions should be deployed inside a VPC",
            CheckId::W92 => "Lambda functions should define ReservedConcurrentExecutions",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|c| c.as_str().eq_ignore_ascii_case(s))
    }

    pub fn all() -> Vec<Self> {
        vec![
            CheckId::W5,
            CheckId::W35,
            CheckId::W36,
            CheckId::W40,
            CheckId::W41,
            CheckId::W51,
            CheckId::W58,
            CheckId::W60,
            CheckId::W89,
            CheckId::W92,
        ]
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A check id paired with its mandatory justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suppression {
    check: CheckId,
    reason: String,
}

impl Suppression {
    /// Create a suppression. Blank reasons are rejected.
    pub fn new(check: CheckId, reason: impl Into<String>) -> ConstructResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ConstructError::configuration(
                format!("suppressions.{}", check),
                "a suppression requires a justification",
            ));
        }
        Ok(Self { check, reason })
    }

    pub fn check(&self) -> CheckId {
        self.check
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Append `entries` to `existing`, keeping the first entry per check id.
pub(crate) fn extend_unique(existing: &mut Vec<Suppression>, entries: impl IntoIterator<Item = Suppression>) {
    for entry in entries {
        if !existing.iter().any(|s| s.check == entry.check) {
            existing.push(entry);
        }
    }
}

/// Render suppressions as template linter metadata.
pub(crate) fn to_metadata(suppressions: &[Suppression]) -> Value {
    let rules: Vec<Value> = suppressions
        .iter()
        .map(|s| json!({ "id": s.check.as_str(), "reason": s.reason }))
        .collect();
    json!({ "rules_to_suppress": rules })
}
