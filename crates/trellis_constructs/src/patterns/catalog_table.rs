//! A catalog database and one table in it.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use trellis_core::{merge, tokens, ConstructError, ConstructResult, Fragment, Scope};

use super::AssemblyProgress;
use crate::builders::{
    build_glue_database, build_glue_table, resolve_glue_database, Column, DatabaseHandle, DatabaseSettings, Merged,
    TableHandle,
};
use crate::defaults::{default_table_fragment, lookup, CatalogContext, ProfileFamily};
use crate::policy::check_exclusive;

/// Source type used when the caller names none.
pub const DEFAULT_SOURCE_TYPE: &str = "kinesis";

const DATABASE_ID: &str = "GlueDatabase";
const TABLE_ID: &str = "GlueTable";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CatalogTableProps {
    pub database_props: Option<Fragment>,
    /// Overrides merged over the table defaults. Without a field schema they
    /// must describe the whole table.
    pub table_props: Option<Fragment>,
    pub field_schema: Vec<Column>,
    pub source_type: Option<String>,
    pub parameters: BTreeMap<String, String>,
    #[serde(skip)]
    pub existing_database: Option<DatabaseHandle>,
}

enum Database {
    Existing(DatabaseHandle),
    New(Merged<DatabaseSettings>),
}

/// Handles a catalog-table assembly exposes.
#[derive(Debug, Clone)]
pub struct CatalogTable {
    pub database: DatabaseHandle,
    pub table: TableHandle,
}

impl CatalogTable {
    pub fn new(scope: &mut Scope<'_>, id: &str, props: CatalogTableProps) -> ConstructResult<Self> {
        let mut progress = AssemblyProgress::start("catalog-table", id);
        let source_type = props.source_type.as_deref().unwrap_or(DEFAULT_SOURCE_TYPE);
        let from_schema = !props.field_schema.is_empty();
        let exposed = scope.assemble(id, |scope| {
            check_exclusive(
                id,
                &[
                    ("existingDatabase", props.existing_database.is_some()),
                    ("databaseProps", props.database_props.is_some()),
                ],
            )?;
            if !from_schema && props.table_props.is_none() {
                return Err(ConstructError::configuration(
                    format!("{}.fieldSchema", id),
                    "either a field schema or table props are required",
                ));
            }

            if from_schema {
                lookup(ProfileFamily::CatalogTable, Some(source_type))?;
            }
            if props.existing_database.is_none() {
                lookup(ProfileFamily::CatalogDatabase, None)?;
            }
            progress.advance();

            let database = match &props.existing_database {
                Some(existing) => Database::Existing(existing.clone()),
                None => Database::New(resolve_glue_database(
                    scope.environment(),
                    DATABASE_ID,
                    props.database_props.as_ref(),
                )?),
            };
            let (catalog_id, database_name) = match &database {
                Database::Existing(existing) => (existing.catalog_id(), existing.database_name()),
                Database::New(merged) => (
                    merged.settings.catalog_id.clone(),
                    tokens::reference(&scope.logical_id_for(DATABASE_ID)),
                ),
            };
            let base = if from_schema {
                let catalog = CatalogContext {
                    catalog_id,
                    database_name,
                    columns: &props.field_schema,
                    parameters: &props.parameters,
                };
                default_table_fragment(scope.environment(), TABLE_ID, source_type, catalog)?
            } else {
                Fragment::from_value(json!({
                    "catalogId": catalog_id,
                    "databaseName": database_name
                }))?
            };
            let fragment = merge(&base, props.table_props.as_ref());
            progress.advance();

            let database = match database {
                Database::Existing(existing) => existing,
                Database::New(merged) => build_glue_database(scope, DATABASE_ID, merged)?,
            };
            let table = build_glue_table(scope, TABLE_ID, Some(&database.database), &fragment)?;
            progress.advance();

            Ok(CatalogTable { database, table })
        })?;
        progress.finish();
        Ok(exposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::STREAM_NAME;
    use trellis_core::{OutputTree, StackConfig};

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "int", "Identifier for the record"),
            Column::new("name", "string", "The name of the record"),
        ]
    }

    fn stream_parameters() -> BTreeMap<String, String> {
        BTreeMap::from([(STREAM_NAME.to_string(), "testStream".to_string())])
    }

    #[test]
    fn test_table_from_field_schema() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let props = CatalogTableProps {
            field_schema: schema(),
            parameters: stream_parameters(),
            ..Default::default()
        };
        let pattern = CatalogTable::new(&mut tree.root(), "kinesis", props).unwrap();

        let table = tree.get(&pattern.table.table.logical_id).unwrap();
        assert_eq!(table.property("DatabaseName"), Some(&json!({"Ref": "kinesisGlueDatabase"})));
        assert_eq!(table.property("TableInput.TableType"), Some(&json!("EXTERNAL_TABLE")));
        assert_eq!(
            table.property("TableInput.StorageDescriptor.Location"),
            Some(&json!("testStream"))
        );
        assert_eq!(
            table.references().get("database").map(String::as_str),
            Some("kinesisGlueDatabase")
        );
    }

    #[test]
    fn test_database_declared_after_table_merge() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let database_props = Fragment::from_value(json!({"catalogId": "123456789012"})).unwrap();
        let props = CatalogTableProps {
            database_props: Some(database_props),
            field_schema: schema(),
            parameters: stream_parameters(),
            ..Default::default()
        };
        let pattern = CatalogTable::new(&mut tree.root(), "kinesis", props).unwrap();

        assert_eq!(pattern.database.database.logical_id, "kinesisGlueDatabase");
        assert_eq!(pattern.table.settings.catalog_id, json!("123456789012"));
        assert_eq!(pattern.table.settings.database_name, json!({"Ref": "kinesisGlueDatabase"}));
    }

    #[test]
    fn test_unsupported_source_type() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let props = CatalogTableProps {
            field_schema: schema(),
            parameters: stream_parameters(),
            source_type: Some("SomeSource".to_string()),
            ..Default::default()
        };
        let err = CatalogTable::new(&mut tree.root(), "kinesis", props).unwrap_err();
        assert!(err.is_configuration());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_table_props_without_schema() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let table_props = Fragment::from_value(json!({
            "tableInput": {
                "parameters": {"classification": "csv"},
                "storageDescriptor": {"columns": [{"name": "id", "type": "int"}]}
            }
        }))
        .unwrap();
        let props = CatalogTableProps {
            table_props: Some(table_props),
            ..Default::default()
        };
        let pattern = CatalogTable::new(&mut tree.root(), "csv", props).unwrap();
        assert!(pattern.table.settings.table_input.table_type.is_none());
        let table = tree.get(&pattern.table.table.logical_id).unwrap();
        assert_eq!(table.property("CatalogId"), Some(&json!({"Ref": "AWS::AccountId"})));
    }

    #[test]
    fn test_schema_or_table_props_required() {
        let mut tree = OutputTree::new(StackConfig::new("test"));
        let err = CatalogTable::new(&mut tree.root(), "empty", CatalogTableProps::default()).unwrap_err();
        assert!(matches!(err, ConstructError::Configuration { ref path, .. } if path == "empty.fieldSchema"));
    }
}
