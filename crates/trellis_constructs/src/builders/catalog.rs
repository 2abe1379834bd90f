//! Data catalog databases and tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use trellis_core::{
    ConstructResult, Environment, Fragment, ResourceDeclaration, ResourceHandle, ResourceKind, Scope,
};

use super::{merge_settings, Merged};
use crate::defaults::{default_fragment_for, DefaultContext, ProfileFamily};
use crate::policy;

const DATABASE_REQUIRED_KEYS: &[&str] = &["catalogId", "databaseInput"];
const TABLE_REQUIRED_KEYS: &[&str] = &["catalogId", "databaseName", "tableInput"];

/// One field of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            comment: Some(comment.into()),
        }
    }

    fn render(&self) -> Value {
        let mut column = Fragment::new();
        if let Some(comment) = &self.comment {
            column.insert("Comment", comment.as_str());
        }
        column
            .with("Name", self.name.as_str())
            .with("Type", self.data_type.as_str())
            .into_value()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location_uri: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseSettings {
    pub catalog_id: Value,
    pub database_input: DatabaseInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SerdeInfo {
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub serialization_library: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageDescriptor {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub compressed: Option<bool>,
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub number_of_buckets: Option<i64>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub serde_info: Option<SerdeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub partition_keys: Vec<Column>,
    #[serde(default)]
    pub storage_descriptor: Option<StorageDescriptor>,
    #[serde(default)]
    pub table_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableSettings {
    pub catalog_id: Value,
    pub database_name: Value,
    pub table_input: TableInput,
}

#[derive(Debug, Clone)]
pub struct DatabaseHandle {
    pub database: ResourceHandle,
    pub merged: Fragment,
    pub settings: DatabaseSettings,
}

impl DatabaseHandle {
    pub fn catalog_id(&self) -> Value {
        self.settings.catalog_id.clone()
    }

    pub fn database_name(&self) -> Value {
        self.database.reference()
    }
}

#[derive(Debug, Clone)]
pub struct TableHandle {
    pub table: ResourceHandle,
    pub settings: TableSettings,
}

/// Merge `overrides` over the catalog database defaults.
pub fn resolve_glue_database(
    environment: &Environment,
    id: &str,
    overrides: Option<&Fragment>,
) -> ConstructResult<Merged<DatabaseSettings>> {
    let ctx = DefaultContext::new(environment, id);
    let defaults = default_fragment_for(ProfileFamily::CatalogDatabase, None, &ctx)?;
    let layers: Vec<Fragment> = overrides.cloned().into_iter().collect();
    merge_settings(id, &defaults, &layers, DATABASE_REQUIRED_KEYS)
}

/// Declare a catalog database from resolved settings.
pub fn build_glue_database(
    scope: &mut Scope<'_>,
    id: &str,
    merged: Merged<DatabaseSettings>,
) -> ConstructResult<DatabaseHandle> {
    let input = &merged.settings.database_input;
    let mut database_input = Fragment::new();
    if let Some(description) = &input.description {
        database_input.insert("Description", description.as_str());
    }
    if let Some(location) = &input.location_uri {
        database_input.insert("LocationUri", location.as_str());
    }
    if let Some(name) = &input.name {
        database_input.insert("Name", name.as_str());
    }
    if !input.parameters.is_empty() {
        database_input.insert("Parameters", json!(input.parameters));
    }

    let properties = Fragment::new()
        .with("CatalogId", merged.settings.catalog_id.clone())
        .with("DatabaseInput", database_input);
    let database = scope.register(id, ResourceDeclaration::new(ResourceKind::GlueDatabase, properties))?;
    info!("Built catalog database '{}'", database.path);

    Ok(DatabaseHandle {
        database,
        merged: merged.fragment,
        settings: merged.settings,
    })
}

/// Build a catalog table from a fully merged table fragment.
pub fn build_glue_table(
    scope: &mut Scope<'_>,
    id: &str,
    database: Option<&ResourceHandle>,
    fragment: &Fragment,
) -> ConstructResult<TableHandle> {
    fragment.require_keys(id, TABLE_REQUIRED_KEYS)?;
    let settings: TableSettings = fragment.to_settings(id)?;
    policy::check_table(id, &settings)?;

    let properties = Fragment::new()
        .with("CatalogId", settings.catalog_id.clone())
        .with("DatabaseName", settings.database_name.clone())
        .with("TableInput", render_table_input(&settings.table_input));
    let mut declaration = ResourceDeclaration::new(ResourceKind::GlueTable, properties);
    if let Some(database) = database {
        declaration = declaration.with_reference("database", database);
    }
    let table = scope.register(id, declaration)?;
    info!("Built catalog table '{}'", table.path);

    Ok(TableHandle { table, settings })
}

fn render_table_input(input: &TableInput) -> Value {
    let mut out = Fragment::new();
    if let Some(description) = &input.description {
        out.insert("Description", description.as_str());
    }
    if let Some(name) = &input.name {
        out.insert("Name", name.as_str());
    }
    if !input.parameters.is_empty() {
        out.insert("Parameters", json!(input.parameters));
    }
    if !input.partition_keys.is_empty() {
        let keys: Vec<Value> = input.partition_keys.iter().map(Column::render).collect();
        out.insert("PartitionKeys", keys);
    }
    if let Some(descriptor) = &input.storage_descriptor {
        out.insert("StorageDescriptor", render_storage_descriptor(descriptor));
    }
    if let Some(table_type) = &input.table_type {
        out.insert("TableType", table_type.as_str());
    }
    out.into_value()
}

fn render_storage_descriptor(descriptor: &StorageDescriptor) -> Value {
    let mut out = Fragment::new();
    if !descriptor.columns.is_empty() {
        let columns: Vec<Value> = descriptor.columns.iter().map(Column::render).collect();
        out.insert("Columns", columns);
    }
    if let Some(compressed) = descriptor.compressed {
        out.insert("Compressed", compressed);
    }
    if let Some(format) = &descriptor.input_format {
        out.insert("InputFormat", format.as_str());
    }
    if let Some(location) = &descriptor.location {
        out.insert("Location", location.clone());
    }
    if let Some(buckets) = descriptor.number_of_buckets {
        out.insert("NumberOfBuckets", buckets);
    }
    if let Some(format) = &descriptor.output_format {
        out.insert("OutputFormat", format.as_str());
    }
    if !descriptor.parameters.is_empty() {
        out.insert("Parameters", json!(descriptor.parameters));
    }
    if let Some(serde_info) = &descriptor.serde_info {
        let mut info = Fragment::new();
        if !serde_info.parameters.is_empty() {
            info.insert("Parameters", json!(serde_info.parameters));
        }
        if let Some(library) = &serde_info.serialization_library {
            info.insert("SerializationLibrary", library.as_str());
        }
        out.insert("SerdeInfo", info);
    }
    out.into_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{ConstructError, OutputTree, StackConfig};

    #[test]
    fn test_database_defaults() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let handle = tree
            .root()
            .assemble("app", |scope| {
                let merged = resolve_glue_database(scope.environment(), "GlueDatabase", None)?;
                build_glue_database(scope, "GlueDatabase", merged)
            })
            .unwrap();

        let db = tree.get(&handle.database.logical_id).unwrap();
        assert_eq!(db.property("CatalogId"), Some(&json!({"Ref": "AWS::AccountId"})));
        assert_eq!(
            db.property("DatabaseInput.Description"),
            Some(&json!("A data catalog database generated by trellis"))
        );
    }

    #[test]
    fn test_explicit_table_without_database_binding() {
        let fragment = Fragment::from_value(json!({
            "catalogId": "fakecatalogfortest",
            "databaseName": "fakedatabase",
            "tableInput": {
                "parameters": {"classification": "json"},
                "storageDescriptor": {
                    "columns": [{"name": "id", "type": "int", "comment": "Identifier for the record"}],
                    "location": "testStream"
                }
            }
        }))
        .unwrap();

        let mut tree = OutputTree::new(StackConfig::new("test"));
        let handle = tree
            .root()
            .assemble("app", |scope| build_glue_table(scope, "GlueTable", None, &fragment))
            .unwrap();

        let table = tree.get(&handle.table.logical_id).unwrap();
        assert_eq!(table.property("DatabaseName"), Some(&json!("fakedatabase")));
        assert_eq!(
            table.property("TableInput.StorageDescriptor.Columns"),
            Some(&json!([{"Comment": "Identifier for the record", "Name": "id", "Type": "int"}]))
        );
        assert!(table.references().is_empty());
    }

    #[test]
    fn test_stream_table_without_columns() {
        let fragment = Fragment::from_value(json!({
            "catalogId": "fakecatalogfortest",
            "databaseName": "fakedatabase",
            "tableInput": {
                "parameters": {"classification": "json"},
                "storageDescriptor": {
                    "parameters": {"streamName": "testStream", "typeOfData": "kinesis"}
                }
            }
        }))
        .unwrap();

        let mut tree = OutputTree::new(StackConfig::new("test"));
        let handle = tree
            .root()
            .assemble("app", |scope| build_glue_table(scope, "GlueTable", None, &fragment))
            .unwrap();

        let table = tree.get(&handle.table.logical_id).unwrap();
        assert_eq!(
            table.property("TableInput.StorageDescriptor.Parameters"),
            Some(&json!({"streamName": "testStream", "typeOfData": "kinesis"}))
        );
        assert!(table.property("TableInput.StorageDescriptor.Columns").is_none());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let fragment = Fragment::from_value(json!({
            "catalogId": "c",
            "databaseName": "d",
            "tableInput": {
                "storageDescriptor": {
                    "columns": [{"name": "id", "type": "int"}, {"name": "id", "type": "string"}]
                }
            }
        }))
        .unwrap();
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let err = tree
            .root()
            .assemble("app", |scope| build_glue_table(scope, "GlueTable", None, &fragment))
            .unwrap_err();
        assert!(matches!(err, ConstructError::Validation { ref path, .. } if path == "tableInput.storageDescriptor.columns"));
    }

    #[test]
    fn test_unknown_table_key_rejected() {
        let fragment = Fragment::from_value(json!({
            "catalogId": "c",
            "databaseName": "d",
            "tableInput": {"colour": "red"}
        }))
        .unwrap();
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let err = tree
            .root()
            .assemble("app", |scope| build_glue_table(scope, "GlueTable", None, &fragment))
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
