//! Smoke tests run against a live connection.
//!
//! Every routine uses its own statement and writes a plain text report.
//! Result sets are drained in batches until a batch comes back short.

use std::io::Write;

use flight_odbc_core::{CDataType, FlightSqlConnection, FlightSqlResultSet, Value};
use tracing::debug;

use crate::error::Result;

pub const BATCH_SIZE: usize = 100;

pub const BIND_COLUMN_QUERY: &str = "SELECT IncidntNum, Category FROM \"@dremio\".Test LIMIT 10";

pub const GET_DATA_QUERY: &str = "SELECT 1 UNION ALL SELECT 2 UNION ALL SELECT 3 UNION ALL \
                                  SELECT 4 UNION ALL SELECT 5 UNION ALL SELECT 6";

pub const BIND_COLUMN_BIG_INT_QUERY: &str = "SELECT IncidntNum, CAST(\"IncidntNum\" AS DOUBLE) / 100 AS double_field, Category
FROM (
  SELECT CONVERT_TO_INTEGER(IncidntNum, 1, 1, 0) AS IncidntNum, Category
  FROM (
    SELECT IncidntNum, Category FROM \"@dremio\".Test LIMIT 10
  ) nested_0
) nested_0";

pub const TABLES_SCHEMA: &str = "IOMETE_USER";
pub const COLUMNS_TABLE: &str = "ALTAY_TEST";

/// Bound values of `column` for the current rowset, SQL NULL as ""
fn bound_strings(result_set: &FlightSqlResultSet, column: usize) -> Vec<String> {
    result_set
        .bound_values(column)
        .unwrap_or_default()
        .iter()
        .map(|value| value.as_ref().map(Value::to_string).unwrap_or_default())
        .collect()
}

fn char_data(result_set: &FlightSqlResultSet, column: usize) -> Result<Option<String>> {
    Ok(result_set
        .get_data(column, CDataType::Char)?
        .map(|value| value.to_string()))
}

pub async fn test_bind_column<W: Write>(connection: &FlightSqlConnection, out: &mut W) -> Result<()> {
    let mut statement = connection.create_statement()?;
    let mut result_set = statement.execute(BIND_COLUMN_QUERY).await?;

    result_set.bind_column(1, CDataType::Char)?;
    result_set.bind_column(2, CDataType::Char)?;

    let mut total = 0;
    loop {
        let fetched = result_set.move_rows(BATCH_SIZE).await?;
        writeln!(out, "Fetched {fetched} rows.")?;

        total += fetched;
        writeln!(out, "Total:{total}")?;

        let numbers = bound_strings(&result_set, 1);
        let categories = bound_strings(&result_set, 2);
        for (i, (number, category)) in numbers.iter().zip(&categories).enumerate() {
            writeln!(out, "Row[{i}] IncidntNum: '{number}', Category: '{category}'")?;
        }

        if fetched < BATCH_SIZE {
            break;
        }
    }

    Ok(())
}

pub async fn test_get_data<W: Write>(connection: &FlightSqlConnection, out: &mut W) -> Result<()> {
    let mut statement = connection.create_statement()?;
    let mut result_set = statement.execute(GET_DATA_QUERY).await?;

    while result_set.move_rows(1).await? == 1 {
        let value = char_data(&result_set, 1)?.unwrap_or_default();
        writeln!(out, "{value}")?;
    }

    Ok(())
}

pub async fn test_bind_column_big_int<W: Write>(
    connection: &FlightSqlConnection,
    out: &mut W,
) -> Result<()> {
    let mut statement = connection.create_statement()?;
    let mut result_set = statement.execute(BIND_COLUMN_BIG_INT_QUERY).await?;

    result_set.bind_column(1, CDataType::Char)?;
    result_set.bind_column(2, CDataType::Double)?;
    result_set.bind_column(3, CDataType::Char)?;

    let mut total = 0;
    loop {
        let fetched = result_set.move_rows(BATCH_SIZE).await?;
        writeln!(out, "Fetched {fetched} rows.")?;

        total += fetched;
        writeln!(out, "Total:{total}")?;

        let numbers = bound_strings(&result_set, 1);
        let doubles = bound_strings(&result_set, 2);
        let categories = bound_strings(&result_set, 3);
        let rows = numbers.iter().zip(&doubles).zip(&categories);
        for (i, ((number, double), category)) in rows.enumerate() {
            writeln!(
                out,
                "Row[{i}] IncidntNum: '{number}', double_field: '{double}', Category: '{category}'"
            )?;
        }

        if fetched < BATCH_SIZE {
            break;
        }
    }

    Ok(())
}

/// Print `catalog.schema.table` for rows that have all three
async fn print_tables<W: Write>(mut result_set: FlightSqlResultSet, out: &mut W) -> Result<()> {
    while result_set.move_rows(1).await? == 1 {
        let catalog = char_data(&result_set, 1)?.unwrap_or_default();
        let schema = char_data(&result_set, 2)?.unwrap_or_default();
        let table = char_data(&result_set, 3)?.unwrap_or_default();

        if !catalog.is_empty() && !schema.is_empty() && !table.is_empty() {
            writeln!(out, "{catalog}.{schema}.{table}")?;
        } else {
            debug!(%catalog, %schema, %table, "skipping partial table name");
        }
    }

    Ok(())
}

/// What a BI tool asks for when it first connects: every table in every
/// catalog
pub async fn test_initial_get_tables_call<W: Write>(
    connection: &FlightSqlConnection,
    out: &mut W,
) -> Result<()> {
    let mut statement = connection.create_statement()?;
    let result_set = statement.get_tables_v3(Some("%"), None, None, None).await?;

    writeln!(out, "Initial call simulation - Catalog.Schema.Table")?;
    print_tables(result_set, out).await
}

pub async fn test_get_tables_v3<W: Write>(connection: &FlightSqlConnection, out: &mut W) -> Result<()> {
    let mut statement = connection.create_statement()?;
    let result_set = statement
        .get_tables_v3(Some("%"), Some(TABLES_SCHEMA), Some("%"), None)
        .await?;

    writeln!(out, "Schema call - Catalog.Schema.Table")?;
    print_tables(result_set, out).await
}

pub async fn test_get_columns_v3<W: Write>(connection: &FlightSqlConnection, out: &mut W) -> Result<()> {
    let mut statement = connection.create_statement()?;
    let mut result_set = statement
        .get_columns_v3(Some("%"), Some(TABLES_SCHEMA), Some(COLUMNS_TABLE), Some("%"))
        .await?;

    let column_count = result_set.metadata().column_count();

    while result_set.move_rows(1).await? == 1 {
        for column in 1..=column_count {
            let value = char_data(&result_set, column)?;
            write!(out, "{}\t", value.as_deref().unwrap_or("NULL"))?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{column_count}")?;

    Ok(())
}

/// The sequence the binary runs: the three catalog routines
pub async fn run<W: Write>(connection: &FlightSqlConnection, out: &mut W) -> Result<()> {
    test_initial_get_tables_call(connection, out).await?;
    test_get_tables_v3(connection, out).await?;
    test_get_columns_v3(connection, out).await?;

    out.flush()?;

    Ok(())
}
