//! Statements: queries and the catalog functions.

use std::sync::Arc;

use arrow::{array::RecordBatch, compute::concat_batches, datatypes::Schema};
use arrow_flight::{
    sql::{client::FlightSqlServiceClient, CommandGetDbSchemas, CommandGetTables},
    FlightInfo, Ticket,
};
use futures::TryStreamExt;
use tonic::transport::Channel;
use tracing::debug;

use crate::{
    catalog::{self, columns_schema, tables_schema},
    error::{DriverError, Result},
    pattern::is_match_all,
    result_set::{empty_schema, FlightSqlResultSet},
};

pub struct FlightSqlStatement {
    client: FlightSqlServiceClient<Channel>,
    max_rows: Option<usize>,
}

impl FlightSqlStatement {
    pub(crate) fn new(client: FlightSqlServiceClient<Channel>) -> Self {
        FlightSqlStatement {
            client,
            max_rows: None,
        }
    }

    /// Limit the rows of result sets created afterwards. `None` or `Some(0)`
    /// removes the limit.
    pub fn set_max_rows(&mut self, max_rows: Option<usize>) {
        self.max_rows = max_rows.filter(|max| *max > 0);
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.max_rows
    }

    /// Execute a query. Rows are streamed from the server's endpoints as the
    /// result set is moved.
    pub async fn execute(&mut self, sql: &str) -> Result<FlightSqlResultSet> {
        debug!(sql, "executing query");

        let info = self
            .client
            .execute(sql.to_string(), None)
            .await
            .map_err(|e| DriverError::Query(sql.into(), e.to_string()))?;
        let tickets = tickets(&info);
        let schema = info
            .try_decode_schema()
            .map(Arc::new)
            .unwrap_or_else(|_| empty_schema());

        debug!(sql, endpoints = tickets.len(), "query planned");

        Ok(
            FlightSqlResultSet::remote(schema, self.client.clone(), sql.into(), tickets)
                .with_max_rows(self.max_rows),
        )
    }

    /// List tables the way ODBC `SQLTables` does.
    ///
    /// Three argument combinations are enumerations instead of searches: a
    /// catalog of `%` with empty schema and table lists catalogs, a schema of
    /// `%` with empty catalog and table lists schemas, and a table type of `%`
    /// with everything else empty lists table types.
    pub async fn get_tables_v3(
        &mut self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        table_type: Option<&str>,
    ) -> Result<FlightSqlResultSet> {
        let empty = |value: Option<&str>| value == Some("");

        let batch = if catalog == Some("%") && empty(schema) && empty(table) {
            debug!("listing catalogs");
            let info = self.client.get_catalogs().await.map_err(metadata_error)?;
            catalog::tables_from_catalogs(&self.fetch_all(info).await?)?
        } else if empty(catalog) && schema == Some("%") && empty(table) {
            debug!("listing schemas");
            let info = self
                .client
                .get_db_schemas(CommandGetDbSchemas {
                    catalog: None,
                    db_schema_filter_pattern: None,
                })
                .await
                .map_err(metadata_error)?;
            catalog::tables_from_db_schemas(&self.fetch_all(info).await?)?
        } else if empty(catalog) && empty(schema) && empty(table) && table_type == Some("%") {
            debug!("listing table types");
            let info = self
                .client
                .get_table_types()
                .await
                .map_err(metadata_error)?;
            catalog::tables_from_table_types(&self.fetch_all(info).await?)?
        } else {
            let command = CommandGetTables {
                catalog: catalog_filter(catalog),
                db_schema_filter_pattern: schema.map(str::to_string),
                table_name_filter_pattern: table.map(str::to_string),
                table_types: parse_table_types(table_type),
                include_schema: false,
            };
            debug!(?command, "searching tables");
            let info = self
                .client
                .get_tables(command)
                .await
                .map_err(metadata_error)?;
            catalog::tables_from_tables(&self.fetch_all(info).await?)?
        };

        Ok(FlightSqlResultSet::from_batches(tables_schema(), vec![batch]).with_max_rows(self.max_rows))
    }

    /// List columns the way ODBC `SQLColumns` does. `column` is a LIKE
    /// pattern over column names.
    pub async fn get_columns_v3(
        &mut self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        column: Option<&str>,
    ) -> Result<FlightSqlResultSet> {
        let command = CommandGetTables {
            catalog: catalog_filter(catalog),
            db_schema_filter_pattern: schema.map(str::to_string),
            table_name_filter_pattern: table.map(str::to_string),
            table_types: vec![],
            include_schema: true,
        };
        debug!(?command, column, "searching columns");

        let info = self
            .client
            .get_tables(command)
            .await
            .map_err(metadata_error)?;
        let batch = catalog::columns_from_tables(&self.fetch_all(info).await?, column)?;

        Ok(FlightSqlResultSet::from_batches(columns_schema(), vec![batch]).with_max_rows(self.max_rows))
    }

    /// Fetch every endpoint of a metadata request into a single batch
    async fn fetch_all(&mut self, info: FlightInfo) -> Result<RecordBatch> {
        let tickets = tickets(&info);
        let mut schema = info.try_decode_schema().map(Arc::new).ok();
        let mut batches = vec![];

        for ticket in tickets {
            let mut stream = self
                .client
                .do_get(ticket)
                .await
                .map_err(metadata_error)?;

            while let Some(batch) = stream.try_next().await.map_err(metadata_error)? {
                batches.push(batch);
            }
        }

        if schema.is_none() {
            schema = batches.first().map(RecordBatch::schema);
        }
        let schema = schema.unwrap_or_else(|| Arc::new(Schema::empty()));

        concat_batches(&schema, &batches).map_err(metadata_error)
    }
}

fn tickets(info: &FlightInfo) -> Vec<Ticket> {
    info.endpoint
        .iter()
        .filter_map(|endpoint| endpoint.ticket.clone())
        .collect()
}

fn metadata_error(error: impl std::fmt::Display) -> DriverError {
    DriverError::Metadata(error.to_string())
}

/// `%` and a missing catalog both mean every catalog
fn catalog_filter(catalog: Option<&str>) -> Option<String> {
    catalog
        .filter(|catalog| !is_match_all(Some(catalog)))
        .map(str::to_string)
}

/// Split a table type list such as `'TABLE', 'VIEW'`. `%` selects every type.
fn parse_table_types(table_type: Option<&str>) -> Vec<String> {
    let Some(table_type) = table_type else {
        return vec![];
    };
    if is_match_all(Some(table_type.trim())) {
        return vec![];
    }

    table_type
        .split(',')
        .map(|item| item.trim().trim_matches('\'').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
