//! Template synthesis.
//!
//! Serializes an [`OutputTree`] into a deployment template. Resources are
//! emitted in dependency order: a resource appears after everything it
//! depends on explicitly or references from its properties. Ties keep
//! registration order, so the output is deterministic.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{ConstructError, ConstructResult};
use crate::resource::ResourceDeclaration;
use crate::suppression;
use crate::tokens;
use crate::tree::OutputTree;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Output encodings for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(TemplateFormat::Json),
            "yaml" | "yml" => Some(TemplateFormat::Yaml),
            _ => None,
        }
    }
}

/// A synthesized template document.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    document: Value,
}

impl Template {
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.document.get("Resources")?.get(logical_id)
    }

    /// Logical ids in emission order.
    pub fn resource_ids(&self) -> Vec<&str> {
        self.document
            .get("Resources")
            .and_then(Value::as_object)
            .map(|resources| resources.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Resources of one type, in emission order.
    pub fn resources_of_type(&self, type_name: &str) -> Vec<(&str, &Value)> {
        self.document
            .get("Resources")
            .and_then(Value::as_object)
            .map(|resources| {
                resources
                    .iter()
                    .filter(|(_, block)| block.get("Type").and_then(Value::as_str) == Some(type_name))
                    .map(|(id, block)| (id.as_str(), block))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> ConstructResult<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    pub fn to_yaml(&self) -> ConstructResult<String> {
        Ok(serde_yaml::to_string(&self.document)?)
    }

    pub fn render(&self, format: TemplateFormat) -> ConstructResult<String> {
        match format {
            TemplateFormat::Json => self.to_json_pretty(),
            TemplateFormat::Yaml => self.to_yaml(),
        }
    }

    pub fn write_to(&self, path: &Path, format: TemplateFormat) -> ConstructResult<()> {
        fs::write(path, self.render(format)?)?;
        info!("Wrote template to {:?}", path);
        Ok(())
    }
}

impl OutputTree {
    /// Serialize the tree into a template.
    pub fn synthesize(&self) -> ConstructResult<Template> {
        self.ensure_usable()?;
        let stack = &self.config().name;
        if self.is_empty() {
            return Err(ConstructError::configuration(stack.as_str(), "stack declares no resources"));
        }

        let mut resources = Map::new();
        for declaration in dependency_order(self)? {
            debug!("Emitting {}", declaration.logical_id());
            resources.insert(declaration.logical_id().to_string(), resource_block(declaration));
        }

        let mut document = Map::new();
        document.insert("AWSTemplateFormatVersion".to_string(), json!(TEMPLATE_FORMAT_VERSION));
        if let Some(description) = &self.config().description {
            document.insert("Description".to_string(), json!(description));
        }
        document.insert("Resources".to_string(), Value::Object(resources));

        info!("Synthesized stack '{}' with {} resources", stack, self.len());
        Ok(Template {
            document: Value::Object(document),
        })
    }
}

fn dependencies_of(declaration: &ResourceDeclaration) -> BTreeSet<String> {
    let mut deps: BTreeSet<String> = declaration
        .properties()
        .as_map()
        .values()
        .flat_map(tokens::referenced_ids)
        .collect();
    deps.extend(declaration.dependencies().iter().cloned());
    deps.remove(declaration.logical_id());
    deps
}

fn dependency_order(tree: &OutputTree) -> ConstructResult<Vec<&ResourceDeclaration>> {
    let pending: Vec<(&ResourceDeclaration, BTreeSet<String>)> = tree
        .declarations()
        .iter()
        .map(|d| (d, dependencies_of(d)))
        .collect();

    for (declaration, deps) in &pending {
        if let Some(missing) = deps.iter().find(|id| !tree.contains(id)) {
            return Err(ConstructError::BindingNotFound {
                resource: declaration.path().to_string(),
                target: missing.clone(),
            });
        }
    }

    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());
    let mut remaining = pending;
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .position(|(_, deps)| deps.iter().all(|id| emitted.contains(id.as_str())));
        match next {
            Some(index) => {
                let (declaration, _) = remaining.remove(index);
                emitted.insert(declaration.logical_id());
                ordered.push(declaration);
            }
            None => {
                let cycle: Vec<&str> = remaining.iter().map(|(d, _)| d.logical_id()).collect();
                return Err(ConstructError::configuration(
                    cycle.join(", "),
                    "resources form a dependency cycle",
                ));
            }
        }
    }
    Ok(ordered)
}

fn resource_block(declaration: &ResourceDeclaration) -> Value {
    let mut block = Map::new();
    block.insert("Type".to_string(), json!(declaration.kind().type_name()));
    if !declaration.properties().is_empty() {
        block.insert("Properties".to_string(), declaration.properties().clone().into_value());
    }
    if !declaration.dependencies().is_empty() {
        let depends_on: Vec<&String> = declaration.dependencies().iter().collect();
        block.insert("DependsOn".to_string(), json!(depends_on));
    }
    if let Some(policy) = declaration.removal_policy() {
        block.insert("UpdateReplacePolicy".to_string(), json!(policy.deletion_policy()));
        block.insert("DeletionPolicy".to_string(), json!(policy.deletion_policy()));
    }

    let mut metadata = Map::new();
    metadata.insert("trellis:path".to_string(), json!(declaration.path()));
    if !declaration.suppressions().is_empty() {
        metadata.insert(
            "cfn_nag".to_string(),
            suppression::to_metadata(declaration.suppressions()),
        );
    }
    block.insert("Metadata".to_string(), Value::Object(metadata));
    Value::Object(block)
}
