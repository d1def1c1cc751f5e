//! Forward-only result sets.
//!
//! A result set hands out rows in rowsets: every [`FlightSqlResultSet::move_rows`]
//! call replaces the current rowset with up to `n` further rows, pulling record
//! batches from the server (or from memory for catalog results) as needed.

use std::collections::{BTreeMap, VecDeque};

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    datatypes::{DataType, Schema, SchemaRef},
};
use arrow_flight::{
    decode::FlightRecordBatchStream, sql::client::FlightSqlServiceClient, Ticket,
};
use futures::TryStreamExt;
use tonic::transport::Channel;
use tracing::debug;

use crate::{
    error::{DriverError, Result},
    types::{convert_cell, CDataType, ColumnDescriptor, SqlDataType, Value},
};

/// Column information for a result set. Columns are numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSetMetadata {
    schema: SchemaRef,
}

impl ResultSetMetadata {
    pub fn new(schema: SchemaRef) -> Self {
        ResultSetMetadata { schema }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn column_count(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .collect()
    }

    pub fn column_name(&self, column: usize) -> Result<&str> {
        Ok(self.descriptor_field(column)?.name().as_str())
    }

    pub fn arrow_type(&self, column: usize) -> Result<&DataType> {
        Ok(self.descriptor_field(column)?.data_type())
    }

    pub fn sql_type(&self, column: usize) -> Result<SqlDataType> {
        Ok(SqlDataType::from_arrow(self.arrow_type(column)?))
    }

    pub fn is_nullable(&self, column: usize) -> Result<bool> {
        Ok(self.descriptor_field(column)?.is_nullable())
    }

    pub fn column_descriptor(&self, column: usize) -> Result<ColumnDescriptor> {
        Ok(ColumnDescriptor::from_field(self.descriptor_field(column)?))
    }

    fn descriptor_field(&self, column: usize) -> Result<&arrow::datatypes::Field> {
        check_column(column, self.column_count())?;

        Ok(self.schema.field(column - 1))
    }
}

fn check_column(column: usize, column_count: usize) -> Result<()> {
    if column == 0 || column > column_count {
        return Err(DriverError::ColumnOutOfRange(column, column_count));
    }

    Ok(())
}

/// Where record batches come from
enum BatchSource {
    Buffered(VecDeque<Result<RecordBatch>>),
    /// Endpoints of a statement, fetched one after another
    Remote {
        client: FlightSqlServiceClient<Channel>,
        sql: String,
        tickets: VecDeque<Ticket>,
        stream: Option<FlightRecordBatchStream>,
    },
}

impl BatchSource {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        match self {
            BatchSource::Buffered(batches) => batches.pop_front().transpose(),
            BatchSource::Remote {
                client,
                sql,
                tickets,
                stream,
            } => loop {
                if let Some(batches) = stream {
                    let batch = batches
                        .try_next()
                        .await
                        .map_err(|e| DriverError::Query(sql.clone(), e.to_string()))?;

                    match batch {
                        Some(batch) => return Ok(Some(batch)),
                        None => *stream = None,
                    }
                }

                let Some(ticket) = tickets.pop_front() else {
                    return Ok(None);
                };

                debug!(%sql, remaining = tickets.len(), "fetching endpoint");
                *stream = Some(
                    client
                        .do_get(ticket)
                        .await
                        .map_err(|e| DriverError::Query(sql.clone(), e.to_string()))?,
                );
            },
        }
    }
}

pub struct FlightSqlResultSet {
    metadata: ResultSetMetadata,
    source: BatchSource,
    // rows of the last batch that did not fit in the previous rowset
    pending: Option<RecordBatch>,
    rowset: Option<RecordBatch>,
    bindings: BTreeMap<usize, CDataType>,
    bound_values: BTreeMap<usize, Vec<Option<Value>>>,
    max_rows: Option<usize>,
    rows_fetched: usize,
}

impl FlightSqlResultSet {
    /// A result set over batches that are already in memory
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self::new(
            schema,
            BatchSource::Buffered(batches.into_iter().map(Ok).collect()),
        )
    }

    pub(crate) fn remote(
        schema: SchemaRef,
        client: FlightSqlServiceClient<Channel>,
        sql: String,
        tickets: Vec<Ticket>,
    ) -> Self {
        Self::new(
            schema,
            BatchSource::Remote {
                client,
                sql,
                tickets: tickets.into(),
                stream: None,
            },
        )
    }

    fn new(schema: SchemaRef, source: BatchSource) -> Self {
        FlightSqlResultSet {
            metadata: ResultSetMetadata::new(schema),
            source,
            pending: None,
            rowset: None,
            bindings: BTreeMap::new(),
            bound_values: BTreeMap::new(),
            max_rows: None,
            rows_fetched: 0,
        }
    }

    /// Stop yielding rows after `max_rows` rows. `None` or `Some(0)` is
    /// unlimited.
    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows.filter(|max| *max > 0);
        self
    }

    pub fn metadata(&self) -> &ResultSetMetadata {
        &self.metadata
    }

    /// Total number of rows handed out so far
    pub fn rows_fetched(&self) -> usize {
        self.rows_fetched
    }

    /// Bind `column` (1-based) so every rowset is converted to `c_type`.
    /// Binding a column again replaces the previous binding.
    pub fn bind_column(&mut self, column: usize, c_type: CDataType) -> Result<()> {
        check_column(column, self.metadata.column_count())?;
        self.bindings.insert(column, c_type);

        if let Some(rowset) = &self.rowset {
            let values = bind_values(rowset, column, c_type)?;
            self.bound_values.insert(column, values);
        }

        Ok(())
    }

    /// Values of a bound column for every row of the current rowset
    pub fn bound_values(&self, column: usize) -> Option<&[Option<Value>]> {
        self.bound_values.get(&column).map(Vec::as_slice)
    }

    /// Replace the current rowset with up to `n` further rows and return how
    /// many there are. Fewer than `n` means the result set is exhausted.
    pub async fn move_rows(&mut self, n: usize) -> Result<usize> {
        let wanted = match self.max_rows {
            Some(max) => n.min(max.saturating_sub(self.rows_fetched)),
            None => n,
        };

        let mut slices = vec![];
        let mut count = 0;

        while count < wanted {
            let batch = match self.pending.take() {
                Some(batch) => batch,
                None => match self.source.next_batch().await {
                    Ok(Some(batch)) => batch,
                    Ok(None) => break,
                    Err(e) => {
                        // rows taken so far are handed out by the next call
                        self.pending = join_batches(&slices)?;
                        return Err(e);
                    }
                },
            };

            if batch.num_rows() == 0 {
                continue;
            }

            let take = (wanted - count).min(batch.num_rows());
            if take < batch.num_rows() {
                self.pending = Some(batch.slice(take, batch.num_rows() - take));
            }
            slices.push(batch.slice(0, take));
            count += take;
        }

        self.rows_fetched += count;
        self.rowset = join_batches(&slices)?;

        // servers that send no schema up front are described by their batches
        if let Some(rowset) = &self.rowset {
            if self.metadata.column_count() == 0 {
                self.metadata = ResultSetMetadata::new(rowset.schema());
            }
        }

        self.bound_values.clear();
        if let Some(rowset) = &self.rowset {
            for (column, c_type) in &self.bindings {
                let values = bind_values(rowset, *column, *c_type)?;
                self.bound_values.insert(*column, values);
            }
        }

        Ok(count)
    }

    /// Read `column` (1-based) of the first row of the current rowset.
    /// SQL NULL is `None`.
    pub fn get_data(&self, column: usize, c_type: CDataType) -> Result<Option<Value>> {
        let rowset = self.rowset.as_ref().ok_or(DriverError::NoCurrentRow)?;
        check_column(column, rowset.num_columns())?;

        convert_cell(rowset.column(column - 1).as_ref(), 0, column, c_type)
    }
}

/// Concatenate slices into one batch, `None` when there are none
fn join_batches(slices: &[RecordBatch]) -> Result<Option<RecordBatch>> {
    let Some(first) = slices.first() else {
        return Ok(None);
    };

    concat_batches(&first.schema(), slices)
        .map(Some)
        .map_err(|e| DriverError::Metadata(format!("Error joining batches: {e}")))
}

fn bind_values(rowset: &RecordBatch, column: usize, c_type: CDataType) -> Result<Vec<Option<Value>>> {
    check_column(column, rowset.num_columns())?;
    let array = rowset.column(column - 1);

    (0..rowset.num_rows())
        .map(|row| convert_cell(array.as_ref(), row, column, c_type))
        .collect()
}

impl std::fmt::Debug for FlightSqlResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightSqlResultSet")
            .field("columns", &self.metadata.column_names())
            .field("rows_fetched", &self.rows_fetched)
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

/// An empty schema, used when the server does not describe its result
pub(crate) fn empty_schema() -> SchemaRef {
    std::sync::Arc::new(Schema::empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Field;

    use super::*;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("IncidntNum", DataType::Utf8, true),
            Field::new("amount", DataType::Float64, true),
        ]))
    }

    fn batch(start: i64, len: i64) -> RecordBatch {
        let numbers: Vec<String> = (start..start + len).map(|n| n.to_string()).collect();
        let amounts: Vec<Option<f64>> = (start..start + len)
            .map(|n| if n % 5 == 0 { None } else { Some(n as f64 / 100.0) })
            .collect();

        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(StringArray::from(numbers)),
                Arc::new(Float64Array::from(amounts)),
            ],
        )
        .unwrap()
    }

    fn result_set() -> FlightSqlResultSet {
        // 3 + 0 + 4 rows
        FlightSqlResultSet::from_batches(
            schema(),
            vec![batch(1, 3), batch(4, 0), batch(4, 4)],
        )
    }

    #[tokio::test]
    async fn test_move_rows_across_batches() {
        let mut result_set = result_set();

        assert_eq!(result_set.move_rows(2).await.unwrap(), 2);
        assert_eq!(
            result_set.get_data(1, CDataType::Char).unwrap(),
            Some(Value::Char("1".into()))
        );

        assert_eq!(result_set.move_rows(4).await.unwrap(), 4);
        assert_eq!(
            result_set.get_data(1, CDataType::Char).unwrap(),
            Some(Value::Char("3".into()))
        );

        assert_eq!(result_set.move_rows(4).await.unwrap(), 1);
        assert_eq!(result_set.move_rows(4).await.unwrap(), 0);
        assert_eq!(result_set.rows_fetched(), 7);
        assert_eq!(
            result_set.get_data(1, CDataType::Char),
            Err(DriverError::NoCurrentRow)
        );
    }

    #[tokio::test]
    async fn test_bound_values_follow_rowset() {
        let mut result_set = result_set();
        result_set.bind_column(1, CDataType::Char).unwrap();
        result_set.bind_column(2, CDataType::Double).unwrap();

        assert_eq!(result_set.move_rows(100).await.unwrap(), 7);

        let numbers = result_set.bound_values(1).unwrap();
        assert_eq!(numbers.len(), 7);
        assert_eq!(numbers[6], Some(Value::Char("7".into())));

        let amounts = result_set.bound_values(2).unwrap();
        assert_eq!(amounts[0], Some(Value::Double(0.01)));
        assert_eq!(amounts[4], None);

        assert_eq!(result_set.move_rows(100).await.unwrap(), 0);
        assert!(result_set.bound_values(1).is_none());
    }

    #[tokio::test]
    async fn test_bind_after_move() {
        let mut result_set = result_set();
        result_set.move_rows(3).await.unwrap();
        result_set.bind_column(1, CDataType::BigInt).unwrap();

        assert_eq!(
            result_set.bound_values(1).unwrap(),
            &[
                Some(Value::BigInt(1)),
                Some(Value::BigInt(2)),
                Some(Value::BigInt(3))
            ]
        );
    }

    #[tokio::test]
    async fn test_max_rows() {
        let mut limited = result_set().with_max_rows(Some(5));

        assert_eq!(limited.move_rows(3).await.unwrap(), 3);
        assert_eq!(limited.move_rows(3).await.unwrap(), 2);
        assert_eq!(limited.move_rows(3).await.unwrap(), 0);

        let mut unlimited = result_set().with_max_rows(Some(0));
        assert_eq!(unlimited.move_rows(100).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_column_errors() {
        let mut result_set = result_set();

        assert_eq!(
            result_set.bind_column(0, CDataType::Char),
            Err(DriverError::ColumnOutOfRange(0, 2))
        );
        assert_eq!(
            result_set.bind_column(3, CDataType::Char),
            Err(DriverError::ColumnOutOfRange(3, 2))
        );

        result_set.move_rows(1).await.unwrap();
        assert_eq!(
            result_set.get_data(3, CDataType::Char),
            Err(DriverError::ColumnOutOfRange(3, 2))
        );
    }

    #[tokio::test]
    async fn test_metadata_from_first_batch() {
        let ids = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(ids, vec![Arc::new(Int64Array::from(vec![10, 20]))]).unwrap();
        let mut result_set = FlightSqlResultSet::from_batches(empty_schema(), vec![batch]);

        assert_eq!(result_set.metadata().column_count(), 0);
        assert_eq!(result_set.move_rows(10).await.unwrap(), 2);

        let metadata = result_set.metadata();
        assert_eq!(metadata.column_names(), vec!["id"]);
        assert_eq!(metadata.sql_type(1).unwrap(), SqlDataType::BigInt);
        assert!(!metadata.is_nullable(1).unwrap());
        assert_eq!(
            result_set.get_data(1, CDataType::Long).unwrap(),
            Some(Value::Long(10))
        );
    }

    #[tokio::test]
    async fn test_rows_survive_a_failed_fetch() {
        let source = BatchSource::Buffered(
            vec![
                Ok(batch(1, 3)),
                Err(DriverError::Query("SELECT".into(), "stream reset".into())),
                Ok(batch(4, 2)),
            ]
            .into(),
        );
        let mut result_set = FlightSqlResultSet::new(schema(), source);

        assert!(matches!(
            result_set.move_rows(5).await,
            Err(DriverError::Query(_, _))
        ));
        assert_eq!(result_set.rows_fetched(), 0);

        assert_eq!(result_set.move_rows(5).await.unwrap(), 5);
        assert_eq!(result_set.rows_fetched(), 5);
        assert_eq!(
            result_set.get_data(1, CDataType::Char).unwrap(),
            Some(Value::Char("1".into()))
        );
        assert!(result_set.bound_values(1).is_none());
        assert_eq!(result_set.move_rows(5).await.unwrap(), 0);
    }
}
