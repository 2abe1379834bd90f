//! Deployment environment and stack configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConstructResult;
use crate::tokens::Pseudo;

/// Target account and region. Unknown values resolve at deployment time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Environment {
    /// An environment resolved entirely at deployment time.
    pub fn agnostic() -> Self {
        Self::default()
    }

    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
        }
    }

    pub fn account_value(&self) -> Value {
        match &self.account {
            Some(account) => Value::String(account.clone()),
            None => Pseudo::AccountId.token(),
        }
    }

    pub fn region_value(&self) -> Value {
        match &self.region {
            Some(region) => Value::String(region.clone()),
            None => Pseudo::Region.token(),
        }
    }
}

/// Stack-level configuration for one output tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StackConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

impl StackConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            environment: Environment::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Load stack configuration from a YAML file.
    pub fn from_file(path: &Path) -> ConstructResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: StackConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save stack configuration to a YAML file.
    pub fn to_file(&self, path: &Path) -> ConstructResult<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
