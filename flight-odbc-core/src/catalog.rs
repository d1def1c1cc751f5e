//! Catalog function results.
//!
//! Flight SQL answers metadata requests with its own schemas. These functions
//! reshape those batches into the column layout of the ODBC 3.x `SQLTables`
//! and `SQLColumns` result sets.

use std::sync::{Arc, OnceLock};

use arrow::{
    array::{
        new_null_array, Array, ArrayRef, AsArray, Int16Builder, Int32Builder, RecordBatch,
        StringArray, StringBuilder,
    },
    compute::cast,
    datatypes::{DataType, Field, Schema, SchemaRef},
    ipc,
};

use crate::{
    error::{DriverError, Result},
    pattern::{is_match_all, like_mask},
    types::ColumnDescriptor,
};

pub const TABLE_COLUMNS: [&str; 5] = [
    "TABLE_CAT",
    "TABLE_SCHEM",
    "TABLE_NAME",
    "TABLE_TYPE",
    "REMARKS",
];

pub fn tables_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();

    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(
                TABLE_COLUMNS
                    .iter()
                    .map(|name| Field::new(*name, DataType::Utf8, true))
                    .collect::<Vec<_>>(),
            ))
        })
        .clone()
}

pub fn columns_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();

    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new("TABLE_CAT", DataType::Utf8, true),
                Field::new("TABLE_SCHEM", DataType::Utf8, true),
                Field::new("TABLE_NAME", DataType::Utf8, false),
                Field::new("COLUMN_NAME", DataType::Utf8, false),
                Field::new("DATA_TYPE", DataType::Int16, false),
                Field::new("TYPE_NAME", DataType::Utf8, false),
                Field::new("COLUMN_SIZE", DataType::Int32, true),
                Field::new("BUFFER_LENGTH", DataType::Int32, true),
                Field::new("DECIMAL_DIGITS", DataType::Int16, true),
                Field::new("NUM_PREC_RADIX", DataType::Int16, true),
                Field::new("NULLABLE", DataType::Int16, false),
                Field::new("REMARKS", DataType::Utf8, true),
                Field::new("COLUMN_DEF", DataType::Utf8, true),
                Field::new("SQL_DATA_TYPE", DataType::Int16, false),
                Field::new("SQL_DATETIME_SUB", DataType::Int16, true),
                Field::new("CHAR_OCTET_LENGTH", DataType::Int32, true),
                Field::new("ORDINAL_POSITION", DataType::Int32, false),
                Field::new("IS_NULLABLE", DataType::Utf8, true),
            ]))
        })
        .clone()
}

/// Read a string column by name, `None` for every row when it is absent
fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(vec![None; batch.num_rows()]);
    };

    let strings = cast(column, &DataType::Utf8)
        .map_err(|e| DriverError::Metadata(format!("Column {name} is not a string: {e}")))?;

    Ok(strings
        .as_string::<i32>()
        .iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn tables_batch(
    catalogs: Vec<Option<String>>,
    schemas: Vec<Option<String>>,
    tables: Vec<Option<String>>,
    table_types: Vec<Option<String>>,
) -> Result<RecordBatch> {
    let num_rows = tables.len();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(catalogs)),
        Arc::new(StringArray::from(schemas)),
        Arc::new(StringArray::from(tables)),
        Arc::new(StringArray::from(table_types)),
        new_null_array(&DataType::Utf8, num_rows),
    ];

    RecordBatch::try_new(tables_schema(), columns)
        .map_err(|e| DriverError::Metadata(format!("Error creating RecordBatch: {e}")))
}

/// `GetCatalogs` → one row per catalog
pub fn tables_from_catalogs(batch: &RecordBatch) -> Result<RecordBatch> {
    let num_rows = batch.num_rows();

    tables_batch(
        string_column(batch, "catalog_name")?,
        vec![None; num_rows],
        vec![None; num_rows],
        vec![None; num_rows],
    )
}

/// `GetDbSchemas` → one row per schema
pub fn tables_from_db_schemas(batch: &RecordBatch) -> Result<RecordBatch> {
    let num_rows = batch.num_rows();

    tables_batch(
        string_column(batch, "catalog_name")?,
        string_column(batch, "db_schema_name")?,
        vec![None; num_rows],
        vec![None; num_rows],
    )
}

/// `GetTableTypes` → one row per table type
pub fn tables_from_table_types(batch: &RecordBatch) -> Result<RecordBatch> {
    let num_rows = batch.num_rows();

    tables_batch(
        vec![None; num_rows],
        vec![None; num_rows],
        vec![None; num_rows],
        string_column(batch, "table_type")?,
    )
}

/// `GetTables` → one row per table
pub fn tables_from_tables(batch: &RecordBatch) -> Result<RecordBatch> {
    tables_batch(
        string_column(batch, "catalog_name")?,
        string_column(batch, "db_schema_name")?,
        string_column(batch, "table_name")?,
        string_column(batch, "table_type")?,
    )
}

/// Decode the IPC encoded schema Flight SQL attaches to `GetTables` rows.
///
/// Accepts both the size-prefixed stream framing and a bare flatbuffer
/// message.
pub fn decode_table_schema(bytes: &[u8]) -> Result<Schema> {
    if let Ok(schema) = ipc::convert::try_schema_from_ipc_buffer(bytes) {
        return Ok(schema);
    }

    let message = ipc::root_as_message(bytes)
        .map_err(|e| DriverError::Metadata(format!("Invalid table schema: {e}")))?;
    let schema = message
        .header_as_schema()
        .ok_or_else(|| DriverError::Metadata("Table schema message has no schema".into()))?;

    Ok(ipc::convert::fb_to_schema(schema))
}

#[derive(Default)]
struct ColumnsBuilder {
    table_cat: StringBuilder,
    table_schem: StringBuilder,
    table_name: StringBuilder,
    column_name: StringBuilder,
    data_type: Int16Builder,
    type_name: StringBuilder,
    column_size: Int32Builder,
    buffer_length: Int32Builder,
    decimal_digits: Int16Builder,
    num_prec_radix: Int16Builder,
    nullable: Int16Builder,
    remarks: StringBuilder,
    column_def: StringBuilder,
    sql_data_type: Int16Builder,
    sql_datetime_sub: Int16Builder,
    char_octet_length: Int32Builder,
    ordinal_position: Int32Builder,
    is_nullable: StringBuilder,
}

impl ColumnsBuilder {
    fn append(
        &mut self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: &str,
        field: &Field,
        ordinal_position: i32,
    ) {
        let descriptor = ColumnDescriptor::from_field(field);

        self.table_cat.append_option(catalog);
        self.table_schem.append_option(schema);
        self.table_name.append_value(table);
        self.column_name.append_value(field.name());
        self.data_type.append_value(descriptor.sql_type.code());
        self.type_name.append_value(&descriptor.type_name);
        self.column_size.append_option(descriptor.column_size);
        self.buffer_length.append_option(descriptor.buffer_length);
        self.decimal_digits.append_option(descriptor.decimal_digits);
        self.num_prec_radix.append_option(descriptor.num_prec_radix);
        self.nullable.append_value(descriptor.nullable_code());
        self.remarks.append_option(descriptor.remarks.as_deref());
        self.column_def.append_null();
        self.sql_data_type
            .append_value(descriptor.sql_type.verbose_code());
        self.sql_datetime_sub
            .append_option(descriptor.sql_type.datetime_subcode());
        self.char_octet_length
            .append_option(descriptor.char_octet_length);
        self.ordinal_position.append_value(ordinal_position);
        self.is_nullable.append_value(descriptor.is_nullable());
    }

    fn finish(mut self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.table_cat.finish()),
            Arc::new(self.table_schem.finish()),
            Arc::new(self.table_name.finish()),
            Arc::new(self.column_name.finish()),
            Arc::new(self.data_type.finish()),
            Arc::new(self.type_name.finish()),
            Arc::new(self.column_size.finish()),
            Arc::new(self.buffer_length.finish()),
            Arc::new(self.decimal_digits.finish()),
            Arc::new(self.num_prec_radix.finish()),
            Arc::new(self.nullable.finish()),
            Arc::new(self.remarks.finish()),
            Arc::new(self.column_def.finish()),
            Arc::new(self.sql_data_type.finish()),
            Arc::new(self.sql_datetime_sub.finish()),
            Arc::new(self.char_octet_length.finish()),
            Arc::new(self.ordinal_position.finish()),
            Arc::new(self.is_nullable.finish()),
        ];

        RecordBatch::try_new(columns_schema(), columns)
            .map_err(|e| DriverError::Metadata(format!("Error creating RecordBatch: {e}")))
    }
}

/// `GetTables` with `include_schema` → one row per column whose name matches
/// `column_pattern`
pub fn columns_from_tables(batch: &RecordBatch, column_pattern: Option<&str>) -> Result<RecordBatch> {
    if batch.num_rows() == 0 {
        return ColumnsBuilder::default().finish();
    }

    let catalogs = string_column(batch, "catalog_name")?;
    let schemas = string_column(batch, "db_schema_name")?;
    let tables = string_column(batch, "table_name")?;

    let table_schemas = batch
        .column_by_name("table_schema")
        .ok_or_else(|| DriverError::Metadata("GetTables result has no table_schema".into()))?;
    let table_schemas = cast(table_schemas, &DataType::Binary)
        .map_err(|e| DriverError::Metadata(format!("table_schema is not binary: {e}")))?;
    let table_schemas = table_schemas.as_binary::<i32>();

    let match_all = is_match_all(column_pattern);
    let mut builder = ColumnsBuilder::default();

    for row in 0..batch.num_rows() {
        let Some(table) = tables[row].as_deref() else {
            continue;
        };
        if table_schemas.is_null(row) {
            continue;
        }

        let schema = decode_table_schema(table_schemas.value(row))?;
        let keep = match column_pattern {
            Some(pattern) if !match_all => {
                let names = StringArray::from_iter_values(
                    schema.fields().iter().map(|field| field.name().as_str()),
                );
                Some(like_mask(pattern, &names)?)
            }
            _ => None,
        };

        for (index, field) in schema.fields().iter().enumerate() {
            if keep.as_ref().map_or(true, |mask| mask.value(index)) {
                builder.append(
                    catalogs[row].as_deref(),
                    schemas[row].as_deref(),
                    table,
                    field,
                    index as i32 + 1,
                );
            }
        }
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use arrow::array::{BinaryArray, Int16Array, Int32Array};
    use arrow::ipc::writer::{write_message, DictionaryTracker, IpcDataGenerator, IpcWriteOptions};

    use super::*;

    fn encode_schema(schema: &Schema) -> Vec<u8> {
        let options = IpcWriteOptions::default();
        let mut tracker = DictionaryTracker::new(false);
        let encoded = IpcDataGenerator::default().schema_to_bytes_with_dictionary_tracker(
            schema,
            &mut tracker,
            &options,
        );
        let mut bytes = vec![];
        write_message(&mut bytes, encoded, &options).unwrap();
        bytes
    }

    fn get_tables_batch() -> RecordBatch {
        let altay = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("amount", DataType::Float64, true),
        ]);
        let events = Schema::new(vec![Field::new("event_id", DataType::Int32, false)]);

        let schema = Arc::new(Schema::new(vec![
            Field::new("catalog_name", DataType::Utf8, true),
            Field::new("db_schema_name", DataType::Utf8, true),
            Field::new("table_name", DataType::Utf8, false),
            Field::new("table_type", DataType::Utf8, false),
            Field::new("table_schema", DataType::Binary, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["spark_catalog", "spark_catalog"])),
                Arc::new(StringArray::from(vec!["IOMETE_USER", "IOMETE_USER"])),
                Arc::new(StringArray::from(vec!["ALTAY_TEST", "EVENTS"])),
                Arc::new(StringArray::from(vec!["TABLE", "VIEW"])),
                Arc::new(BinaryArray::from(vec![
                    encode_schema(&altay).as_slice(),
                    encode_schema(&events).as_slice(),
                ])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_tables_from_tables() {
        let tables = tables_from_tables(&get_tables_batch()).unwrap();

        assert_eq!(tables.schema(), tables_schema());
        assert_eq!(tables.num_rows(), 2);

        let names = tables.column(2).as_string::<i32>();
        assert_eq!(names.value(0), "ALTAY_TEST");
        assert_eq!(names.value(1), "EVENTS");
        assert_eq!(tables.column(3).as_string::<i32>().value(1), "VIEW");
        assert_eq!(tables.column(4).null_count(), 2);
    }

    #[test]
    fn test_tables_from_catalogs_fills_nulls() {
        let catalogs = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new(
                "catalog_name",
                DataType::Utf8,
                false,
            )])),
            vec![Arc::new(StringArray::from(vec!["datafusion", "spark_catalog"]))],
        )
        .unwrap();

        let tables = tables_from_catalogs(&catalogs).unwrap();

        assert_eq!(tables.num_rows(), 2);
        assert_eq!(tables.column(0).as_string::<i32>().value(1), "spark_catalog");
        for column in 1..TABLE_COLUMNS.len() {
            assert_eq!(tables.column(column).null_count(), 2);
        }
    }

    #[test]
    fn test_columns_from_tables() {
        let columns = columns_from_tables(&get_tables_batch(), Some("%")).unwrap();

        assert_eq!(columns.num_columns(), 18);
        assert_eq!(columns.num_rows(), 4);

        let column_names = columns.column(3).as_string::<i32>();
        assert_eq!(column_names.value(0), "id");
        assert_eq!(column_names.value(3), "event_id");

        let data_types = columns.column(4).as_any().downcast_ref::<Int16Array>().unwrap();
        assert_eq!(data_types.value(0), -5);
        assert_eq!(data_types.value(1), 12);
        assert_eq!(data_types.value(2), 8);
        assert_eq!(data_types.value(3), 4);

        let ordinals = columns.column(16).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ordinals.values().to_vec(), vec![1, 2, 3, 1]);

        let is_nullable = columns.column(17).as_string::<i32>();
        assert_eq!(is_nullable.value(0), "NO");
        assert_eq!(is_nullable.value(1), "YES");
    }

    #[test]
    fn test_columns_from_tables_filters_by_pattern() {
        let columns = columns_from_tables(&get_tables_batch(), Some("%_id")).unwrap();

        assert_eq!(columns.num_rows(), 1);
        assert_eq!(columns.column(2).as_string::<i32>().value(0), "EVENTS");
        assert_eq!(columns.column(3).as_string::<i32>().value(0), "event_id");
    }

    #[test]
    fn test_decode_table_schema_rejects_garbage() {
        assert!(matches!(
            decode_table_schema(&[1, 2, 3]),
            Err(DriverError::Metadata(_))
        ));
    }
}
