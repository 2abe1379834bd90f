use serde_json::{json, Value};

use trellis_core::tokens;
use trellis_core::{ConstructError, ConstructResult, Fragment};

use super::DefaultContext;

/// Parameter carrying the source stream of a kinesis table.
pub const STREAM_NAME: &str = "STREAM_NAME";

const DATABASE_DESCRIPTION: &str = "A data catalog database generated by trellis";

pub(super) fn database(ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    Fragment::from_value(json!({
        "catalogId": ctx.environment.account_value(),
        "databaseInput": {
            "description": DATABASE_DESCRIPTION
        }
    }))
}

pub(super) fn kinesis_table(ctx: &DefaultContext<'_>) -> ConstructResult<Fragment> {
    let catalog = ctx.catalog.as_ref().ok_or_else(|| {
        ConstructError::configuration(
            ctx.name,
            "catalog table defaults require a database and a field schema",
        )
    })?;
    if catalog.columns.is_empty() {
        return Err(ConstructError::configuration(
            format!("{}.fieldSchema", ctx.name),
            "at least one field is required",
        ));
    }
    let stream = catalog.parameters.get(STREAM_NAME).ok_or_else(|| {
        ConstructError::configuration(
            format!("{}.parameters.{}", ctx.name, STREAM_NAME),
            "a kinesis table requires the name of its stream",
        )
    })?;

    let paths: Vec<&str> = catalog.columns.iter().map(|c| c.name.as_str()).collect();
    let endpoint = tokens::join(
        "",
        vec![
            Value::from("https://kinesis."),
            ctx.environment.region_value(),
            Value::from(".amazonaws.com"),
        ],
    );

    Fragment::from_value(json!({
        "catalogId": catalog.catalog_id,
        "databaseName": catalog.database_name,
        "tableInput": {
            "parameters": {"classification": "json"},
            "storageDescriptor": {
                "columns": serde_json::to_value(catalog.columns)?,
                "compressed": false,
                "inputFormat": "org.apache.hadoop.mapred.TextInputFormat",
                "location": stream,
                "numberOfBuckets": -1,
                "outputFormat": "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat",
                "parameters": {
                    "endpointUrl": endpoint,
                    "streamName": stream,
                    "typeOfData": "kinesis"
                },
                "serdeInfo": {
                    "parameters": {"paths": paths.join(",")},
                    "serializationLibrary": "org.openx.data.jsonserde.JsonSerDe"
                }
            },
            "tableType": "EXTERNAL_TABLE"
        }
    }))
}
