//! The in-memory database served by the fixture server.
//!
//! | catalog         | schema        | table           | kind  |
//! |-----------------|---------------|-----------------|-------|
//! | `datafusion`    | `@dremio`     | `Test`          | table |
//! | `spark_catalog` | `IOMETE_USER` | `ALTAY_TEST`    | table |
//! | `spark_catalog` | `IOMETE_USER` | `EVENTS`        | table |
//! | `spark_catalog` | `IOMETE_USER` | `RECENT_EVENTS` | view  |
//!
//! Identifiers keep their case, so `"@dremio".Test` and `IncidntNum` resolve
//! without quoting every name.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Decimal128Array, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use datafusion::datasource::MemTable;
use datafusion::error::{DataFusionError, Result};
use datafusion::logical_expr::{
    ColumnarValue, ScalarUDF, ScalarUDFImpl, Signature, TableType, Volatility,
};
use datafusion::prelude::{SessionConfig, SessionContext};
use datafusion::sql::TableReference;

pub const DEFAULT_CATALOG: &str = "datafusion";
pub const SPARK_CATALOG: &str = "spark_catalog";
pub const DREMIO_SCHEMA: &str = "@dremio";
pub const IOMETE_SCHEMA: &str = "IOMETE_USER";

pub const TABLE_TYPES: [&str; 3] = ["LOCAL TEMPORARY", "TABLE", "VIEW"];

/// Name Flight SQL clients see for a DataFusion table type
pub fn table_type_name(table_type: TableType) -> &'static str {
    match table_type {
        TableType::Base => "TABLE",
        TableType::View => "VIEW",
        TableType::Temporary => "LOCAL TEMPORARY",
    }
}

/// Create the session and load every fixture table
pub async fn new_context() -> Result<SessionContext> {
    let mut config = SessionConfig::new();
    config.options_mut().sql_parser.enable_ident_normalization = false;

    let ctx = SessionContext::new_with_config(config);
    ctx.register_udf(ScalarUDF::from(ConvertToInteger::new()));

    ctx.sql(&format!("CREATE SCHEMA \"{DREMIO_SCHEMA}\"")).await?;
    ctx.sql(&format!("CREATE DATABASE {SPARK_CATALOG}")).await?;
    ctx.sql(&format!("CREATE SCHEMA {SPARK_CATALOG}.\"{IOMETE_SCHEMA}\""))
        .await?;

    ctx.register_table(
        TableReference::partial(DREMIO_SCHEMA, "Test"),
        Arc::new(incidents()?),
    )?;
    ctx.register_table(
        TableReference::full(SPARK_CATALOG, IOMETE_SCHEMA, "ALTAY_TEST"),
        Arc::new(altay_test()?),
    )?;
    ctx.register_table(
        TableReference::full(SPARK_CATALOG, IOMETE_SCHEMA, "EVENTS"),
        Arc::new(events()?),
    )?;

    ctx.sql(&format!(
        "CREATE VIEW {SPARK_CATALOG}.\"{IOMETE_SCHEMA}\".\"RECENT_EVENTS\" AS \
         SELECT event_id, event_name FROM {SPARK_CATALOG}.\"{IOMETE_SCHEMA}\".\"EVENTS\" \
         WHERE event_id > 2"
    ))
    .await?;

    Ok(ctx)
}

fn mem_table(schema: Schema, columns: Vec<ArrayRef>) -> Result<MemTable> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    MemTable::try_new(schema, vec![vec![batch]])
}

/// San Francisco police incidents, twelve rows
fn incidents() -> Result<MemTable> {
    let rows = [
        ("150060275", "NON-CRIMINAL"),
        ("150098210", "ROBBERY"),
        ("150098210", "ASSAULT"),
        ("150098210", "SECONDARY CODES"),
        ("150098226", "VANDALISM"),
        ("150098232", "NON-CRIMINAL"),
        ("150098248", "SUSPICIOUS OCC"),
        ("150098248", "LARCENY/THEFT"),
        ("150098254", "ROBBERY"),
        ("150098260", "VEHICLE THEFT"),
        ("150098270", "DRUG/NARCOTIC"),
        ("150098280", "WARRANTS"),
    ];

    mem_table(
        Schema::new(vec![
            Field::new("IncidntNum", DataType::Utf8, true),
            Field::new("Category", DataType::Utf8, true),
        ]),
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|(num, _)| *num))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|(_, cat)| *cat))),
        ],
    )
}

fn altay_test() -> Result<MemTable> {
    let amounts = Decimal128Array::from(vec![Some(1999), None, Some(125050)])
        .with_precision_and_scale(10, 2)?;

    mem_table(
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("amount", DataType::Decimal128(10, 2), true),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("active", DataType::Boolean, true),
        ]),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec![Some("altay"), Some("iomete"), None])),
            Arc::new(amounts),
            Arc::new(TimestampMicrosecondArray::from(vec![
                Some(1_700_000_000_000_000),
                Some(1_700_000_060_000_000),
                None,
            ])),
            Arc::new(BooleanArray::from(vec![Some(true), Some(false), None])),
        ],
    )
}

fn events() -> Result<MemTable> {
    mem_table(
        Schema::new(vec![
            Field::new("event_id", DataType::Int32, false),
            Field::new("event_name", DataType::Utf8, false),
        ]),
        vec![
            Arc::new(Int32Array::from(vec![1, 2, 3, 4])),
            Arc::new(StringArray::from(vec!["login", "query", "export", "logout"])),
        ],
    )
}

/// `CONVERT_TO_INTEGER(value, ...)` casts its first argument to BIGINT and
/// ignores the rest.
#[derive(Debug)]
pub struct ConvertToInteger {
    signature: Signature,
    aliases: Vec<String>,
}

impl ConvertToInteger {
    pub fn new() -> Self {
        Self {
            signature: Signature::variadic_any(Volatility::Immutable),
            aliases: vec!["CONVERT_TO_INTEGER".to_string()],
        }
    }
}

impl Default for ConvertToInteger {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarUDFImpl for ConvertToInteger {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "convert_to_integer"
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[ColumnarValue]) -> Result<ColumnarValue> {
        match args.first() {
            Some(ColumnarValue::Array(array)) => {
                Ok(ColumnarValue::Array(cast(array, &DataType::Int64)?))
            }
            Some(ColumnarValue::Scalar(scalar)) => {
                Ok(ColumnarValue::Scalar(scalar.cast_to(&DataType::Int64)?))
            }
            None => Err(DataFusionError::Execution(
                "convert_to_integer expects at least one argument".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::AsArray;
    use arrow::datatypes::Int64Type;

    use super::*;

    async fn rows(ctx: &SessionContext, sql: &str) -> Vec<RecordBatch> {
        ctx.sql(sql).await.unwrap().collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_fixture_tables() {
        let ctx = new_context().await.unwrap();

        let batches = rows(&ctx, "SELECT IncidntNum, Category FROM \"@dremio\".Test LIMIT 10").await;
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 10);

        let batches = rows(&ctx, "SELECT id FROM spark_catalog.IOMETE_USER.ALTAY_TEST").await;
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 3);

        let batches = rows(&ctx, "SELECT event_id FROM spark_catalog.IOMETE_USER.RECENT_EVENTS").await;
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_convert_to_integer() {
        let ctx = new_context().await.unwrap();
        let batches = rows(
            &ctx,
            "SELECT CONVERT_TO_INTEGER(IncidntNum, 1, 1, 0) AS IncidntNum \
             FROM \"@dremio\".Test LIMIT 1",
        )
        .await;

        let column = batches[0].column(0).as_primitive::<Int64Type>();
        assert_eq!(column.value(0), 150060275);
    }

    #[test]
    fn test_table_type_name() {
        assert_eq!(table_type_name(TableType::Base), "TABLE");
        assert_eq!(table_type_name(TableType::View), "VIEW");
        assert!(TABLE_TYPES.contains(&table_type_name(TableType::Temporary)));
    }
}
