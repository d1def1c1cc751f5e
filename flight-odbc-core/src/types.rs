//! ODBC type codes and the conversion of Arrow values into them.
//!
//! Arrow columns are described to callers with ODBC SQL types (see
//! [`SqlDataType::from_arrow`]) and cells are read back as one of the small
//! set of C types in [`CDataType`].

use std::fmt;

use arrow::{
    array::{Array, AsArray},
    compute::cast,
    datatypes::{DataType, Float64Type, Int32Type, Int64Type, TimeUnit},
    util::display::array_value_to_string,
};
use arrow_schema::Field;

use crate::error::{DriverError, Result};

/// Reported size of string and binary columns, which Arrow leaves unbounded
pub const DEFAULT_STRING_COLUMN_LENGTH: i32 = 1024;

pub const TYPE_NAME_METADATA: &str = "ARROW:FLIGHT:SQL:TYPE_NAME";
pub const PRECISION_METADATA: &str = "ARROW:FLIGHT:SQL:PRECISION";
pub const SCALE_METADATA: &str = "ARROW:FLIGHT:SQL:SCALE";
pub const REMARKS_METADATA: &str = "ARROW:FLIGHT:SQL:REMARKS";

const SQL_DATETIME: i16 = 9;
const SQL_CODE_DATE: i16 = 1;
const SQL_CODE_TIME: i16 = 2;
const SQL_CODE_TIMESTAMP: i16 = 3;

pub const SQL_NO_NULLS: i16 = 0;
pub const SQL_NULLABLE: i16 = 1;

/// ODBC SQL data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDataType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Varchar,
    Binary,
    TypeDate,
    TypeTime,
    TypeTimestamp,
    Interval,
}

impl SqlDataType {
    /// The numeric code ODBC assigns to this type
    pub fn code(&self) -> i16 {
        match self {
            SqlDataType::Bit => -7,
            SqlDataType::TinyInt => -6,
            SqlDataType::SmallInt => 5,
            SqlDataType::Integer => 4,
            SqlDataType::BigInt => -5,
            SqlDataType::Real => 7,
            SqlDataType::Double => 8,
            SqlDataType::Decimal => 3,
            SqlDataType::Varchar => 12,
            SqlDataType::Binary => -2,
            SqlDataType::TypeDate => 91,
            SqlDataType::TypeTime => 92,
            SqlDataType::TypeTimestamp => 93,
            SqlDataType::Interval => 10,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlDataType::Bit => "BOOLEAN",
            SqlDataType::TinyInt => "TINYINT",
            SqlDataType::SmallInt => "SMALLINT",
            SqlDataType::Integer => "INTEGER",
            SqlDataType::BigInt => "BIGINT",
            SqlDataType::Real => "FLOAT",
            SqlDataType::Double => "DOUBLE",
            SqlDataType::Decimal => "DECIMAL",
            SqlDataType::Varchar => "VARCHAR",
            SqlDataType::Binary => "BINARY",
            SqlDataType::TypeDate => "DATE",
            SqlDataType::TypeTime => "TIME",
            SqlDataType::TypeTimestamp => "TIMESTAMP",
            SqlDataType::Interval => "INTERVAL",
        }
    }

    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => SqlDataType::Bit,
            DataType::Int8 | DataType::UInt8 => SqlDataType::TinyInt,
            DataType::Int16 | DataType::UInt16 => SqlDataType::SmallInt,
            DataType::Int32 | DataType::UInt32 => SqlDataType::Integer,
            DataType::Int64 | DataType::UInt64 => SqlDataType::BigInt,
            DataType::Float16 | DataType::Float32 => SqlDataType::Real,
            DataType::Float64 => SqlDataType::Double,
            DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => SqlDataType::Decimal,
            DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_) => SqlDataType::Binary,
            DataType::Date32 | DataType::Date64 => SqlDataType::TypeDate,
            DataType::Time32(_) | DataType::Time64(_) => SqlDataType::TypeTime,
            DataType::Timestamp(_, _) => SqlDataType::TypeTimestamp,
            DataType::Interval(_) => SqlDataType::Interval,
            DataType::Dictionary(_, value_type) => SqlDataType::from_arrow(value_type),
            _ => SqlDataType::Varchar,
        }
    }

    /// The "verbose" type reported in SQL_DATA_TYPE, which folds the
    /// datetime types into SQL_DATETIME
    pub fn verbose_code(&self) -> i16 {
        match self {
            SqlDataType::TypeDate | SqlDataType::TypeTime | SqlDataType::TypeTimestamp => {
                SQL_DATETIME
            }
            other => other.code(),
        }
    }

    pub fn datetime_subcode(&self) -> Option<i16> {
        match self {
            SqlDataType::TypeDate => Some(SQL_CODE_DATE),
            SqlDataType::TypeTime => Some(SQL_CODE_TIME),
            SqlDataType::TypeTimestamp => Some(SQL_CODE_TIMESTAMP),
            _ => None,
        }
    }
}

/// How a single Arrow field is described by the catalog functions
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub sql_type: SqlDataType,
    pub type_name: String,
    pub column_size: Option<i32>,
    pub buffer_length: Option<i32>,
    pub decimal_digits: Option<i16>,
    pub num_prec_radix: Option<i16>,
    pub char_octet_length: Option<i32>,
    pub nullable: bool,
    pub remarks: Option<String>,
}

impl ColumnDescriptor {
    pub fn from_field(field: &Field) -> Self {
        let data_type = field.data_type();
        let sql_type = SqlDataType::from_arrow(data_type);
        let metadata = field.metadata();

        let mut column_size = column_size(sql_type, data_type);
        let mut decimal_digits = decimal_digits(sql_type, data_type);

        if let Some(precision) = metadata.get(PRECISION_METADATA).and_then(|p| p.parse().ok()) {
            column_size = Some(precision);
        }
        if let Some(scale) = metadata.get(SCALE_METADATA).and_then(|s| s.parse().ok()) {
            decimal_digits = Some(scale);
        }

        let buffer_length = match sql_type {
            SqlDataType::Bit | SqlDataType::TinyInt => Some(1),
            SqlDataType::SmallInt => Some(2),
            SqlDataType::Integer | SqlDataType::Real => Some(4),
            SqlDataType::BigInt | SqlDataType::Double => Some(8),
            SqlDataType::Decimal => column_size.map(|precision| precision + 2),
            SqlDataType::TypeDate | SqlDataType::TypeTime => Some(6),
            SqlDataType::TypeTimestamp => Some(16),
            SqlDataType::Varchar | SqlDataType::Binary => column_size,
            SqlDataType::Interval => None,
        };

        let num_prec_radix = match sql_type {
            SqlDataType::TinyInt
            | SqlDataType::SmallInt
            | SqlDataType::Integer
            | SqlDataType::BigInt
            | SqlDataType::Decimal => Some(10),
            SqlDataType::Real | SqlDataType::Double => Some(2),
            _ => None,
        };

        let char_octet_length = match sql_type {
            SqlDataType::Varchar | SqlDataType::Binary => column_size,
            _ => None,
        };

        ColumnDescriptor {
            sql_type,
            type_name: metadata
                .get(TYPE_NAME_METADATA)
                .cloned()
                .unwrap_or_else(|| sql_type.type_name().to_string()),
            column_size,
            buffer_length,
            decimal_digits,
            num_prec_radix,
            char_octet_length,
            nullable: field.is_nullable(),
            remarks: metadata.get(REMARKS_METADATA).cloned(),
        }
    }

    pub fn nullable_code(&self) -> i16 {
        if self.nullable {
            SQL_NULLABLE
        } else {
            SQL_NO_NULLS
        }
    }

    pub fn is_nullable(&self) -> &'static str {
        if self.nullable {
            "YES"
        } else {
            "NO"
        }
    }
}

fn column_size(sql_type: SqlDataType, data_type: &DataType) -> Option<i32> {
    match (sql_type, data_type) {
        (SqlDataType::Bit, _) => Some(1),
        (SqlDataType::TinyInt, _) => Some(3),
        (SqlDataType::SmallInt, _) => Some(5),
        (SqlDataType::Integer, _) => Some(10),
        (SqlDataType::BigInt, DataType::UInt64) => Some(20),
        (SqlDataType::BigInt, _) => Some(19),
        (SqlDataType::Real, _) => Some(7),
        (SqlDataType::Double, _) => Some(15),
        (SqlDataType::Decimal, DataType::Decimal128(precision, _))
        | (SqlDataType::Decimal, DataType::Decimal256(precision, _)) => Some(*precision as i32),
        (SqlDataType::TypeDate, _) => Some(10),
        (SqlDataType::TypeTime, _) => Some(12),
        (SqlDataType::TypeTimestamp, _) => Some(23),
        (SqlDataType::Binary, DataType::FixedSizeBinary(width)) => Some(*width),
        (SqlDataType::Varchar, _) | (SqlDataType::Binary, _) => Some(DEFAULT_STRING_COLUMN_LENGTH),
        _ => None,
    }
}

fn decimal_digits(sql_type: SqlDataType, data_type: &DataType) -> Option<i16> {
    match (sql_type, data_type) {
        (SqlDataType::Bit, _)
        | (SqlDataType::TinyInt, _)
        | (SqlDataType::SmallInt, _)
        | (SqlDataType::Integer, _)
        | (SqlDataType::BigInt, _) => Some(0),
        (SqlDataType::Decimal, DataType::Decimal128(_, scale))
        | (SqlDataType::Decimal, DataType::Decimal256(_, scale)) => Some(*scale as i16),
        (SqlDataType::TypeTimestamp, DataType::Timestamp(unit, _))
        | (SqlDataType::TypeTime, DataType::Time32(unit))
        | (SqlDataType::TypeTime, DataType::Time64(unit)) => Some(match unit {
            TimeUnit::Second => 0,
            TimeUnit::Millisecond => 3,
            TimeUnit::Microsecond => 6,
            TimeUnit::Nanosecond => 9,
        }),
        _ => None,
    }
}

/// The C types a cell can be read as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CDataType {
    Char,
    Long,
    BigInt,
    Double,
    Bit,
}

/// A cell converted to a [`CDataType`]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Char(String),
    Long(i32),
    BigInt(i64),
    Double(f64),
    Bit(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(value) => write!(f, "{value}"),
            Value::Long(value) => write!(f, "{value}"),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Bit(value) => write!(f, "{}", u8::from(*value)),
        }
    }
}

/// Read `row` of `array` as `target`. `column` is only used for error
/// messages. SQL NULL is returned as `None`.
pub fn convert_cell(
    array: &dyn Array,
    row: usize,
    column: usize,
    target: CDataType,
) -> Result<Option<Value>> {
    // NullArray has no validity buffer, only logical nulls
    if array.logical_nulls().is_some_and(|nulls| nulls.is_null(row)) {
        return Ok(None);
    }

    let to_error = |e: arrow::error::ArrowError| DriverError::Conversion(column, e.to_string());

    let value = match target {
        CDataType::Char => Value::Char(array_value_to_string(array, row).map_err(to_error)?),
        CDataType::Long => {
            let cell = cast_cell(array, row, column, &DataType::Int32)?;
            Value::Long(cell.as_primitive::<Int32Type>().value(0))
        }
        CDataType::BigInt => {
            let cell = cast_cell(array, row, column, &DataType::Int64)?;
            Value::BigInt(cell.as_primitive::<Int64Type>().value(0))
        }
        CDataType::Double => {
            let cell = cast_cell(array, row, column, &DataType::Float64)?;
            Value::Double(cell.as_primitive::<Float64Type>().value(0))
        }
        CDataType::Bit => {
            let cell = cast_cell(array, row, column, &DataType::Boolean)?;
            Value::Bit(cell.as_boolean().value(0))
        }
    };

    Ok(Some(value))
}

/// Cast a single non-null cell, treating a null result as a failed
/// conversion
fn cast_cell(
    array: &dyn Array,
    row: usize,
    column: usize,
    to_type: &DataType,
) -> Result<arrow::array::ArrayRef> {
    let cell = cast(&array.slice(row, 1), to_type).map_err(|e| {
        DriverError::Conversion(column, format!("cannot cast to {to_type}: {e}"))
    })?;

    if cell.is_null(0) {
        return Err(DriverError::Conversion(
            column,
            format!(
                "value '{}' cannot be represented as {to_type}",
                array_value_to_string(array, row).unwrap_or_default()
            ),
        ));
    }

    Ok(cell)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use arrow::array::{BooleanArray, Float64Array, Int64Array, NullArray, StringArray};

    use super::*;

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(SqlDataType::from_arrow(&DataType::Boolean), SqlDataType::Bit);
        assert_eq!(SqlDataType::from_arrow(&DataType::UInt8), SqlDataType::TinyInt);
        assert_eq!(SqlDataType::from_arrow(&DataType::Int32), SqlDataType::Integer);
        assert_eq!(SqlDataType::from_arrow(&DataType::Int64), SqlDataType::BigInt);
        assert_eq!(SqlDataType::from_arrow(&DataType::Float64), SqlDataType::Double);
        assert_eq!(SqlDataType::from_arrow(&DataType::LargeUtf8), SqlDataType::Varchar);
        assert_eq!(
            SqlDataType::from_arrow(&DataType::Timestamp(TimeUnit::Microsecond, None)),
            SqlDataType::TypeTimestamp
        );
        assert_eq!(
            SqlDataType::from_arrow(&DataType::Dictionary(
                Box::new(DataType::Int32),
                Box::new(DataType::Utf8)
            )),
            SqlDataType::Varchar
        );
        assert_eq!(SqlDataType::from_arrow(&DataType::Null), SqlDataType::Varchar);

        assert_eq!(SqlDataType::BigInt.code(), -5);
        assert_eq!(SqlDataType::TypeDate.verbose_code(), 9);
        assert_eq!(SqlDataType::TypeDate.datetime_subcode(), Some(1));
        assert_eq!(SqlDataType::Varchar.datetime_subcode(), None);
    }

    #[test]
    fn test_column_descriptor() {
        let id = ColumnDescriptor::from_field(&Field::new("id", DataType::Int64, false));
        assert_eq!(id.sql_type, SqlDataType::BigInt);
        assert_eq!(id.type_name, "BIGINT");
        assert_eq!(id.column_size, Some(19));
        assert_eq!(id.buffer_length, Some(8));
        assert_eq!(id.decimal_digits, Some(0));
        assert_eq!(id.num_prec_radix, Some(10));
        assert_eq!(id.char_octet_length, None);
        assert_eq!(id.nullable_code(), SQL_NO_NULLS);
        assert_eq!(id.is_nullable(), "NO");

        let name = ColumnDescriptor::from_field(&Field::new("name", DataType::Utf8, true));
        assert_eq!(name.column_size, Some(DEFAULT_STRING_COLUMN_LENGTH));
        assert_eq!(name.char_octet_length, Some(DEFAULT_STRING_COLUMN_LENGTH));
        assert_eq!(name.decimal_digits, None);
        assert_eq!(name.is_nullable(), "YES");

        let price = ColumnDescriptor::from_field(&Field::new(
            "price",
            DataType::Decimal128(10, 2),
            true,
        ));
        assert_eq!(price.column_size, Some(10));
        assert_eq!(price.buffer_length, Some(12));
        assert_eq!(price.decimal_digits, Some(2));
    }

    #[test]
    fn test_column_descriptor_metadata_overrides() {
        let field = Field::new("code", DataType::Utf8, true).with_metadata(HashMap::from([
            (TYPE_NAME_METADATA.to_string(), "CHAR".to_string()),
            (PRECISION_METADATA.to_string(), "8".to_string()),
            (REMARKS_METADATA.to_string(), "fixed width".to_string()),
        ]));
        let descriptor = ColumnDescriptor::from_field(&field);

        assert_eq!(descriptor.type_name, "CHAR");
        assert_eq!(descriptor.column_size, Some(8));
        assert_eq!(descriptor.char_octet_length, Some(8));
        assert_eq!(descriptor.remarks.as_deref(), Some("fixed width"));
    }

    #[test]
    fn test_convert_cell() {
        let strings = StringArray::from(vec![Some("150060275"), None, Some("ROBBERY")]);
        assert_eq!(
            convert_cell(&strings, 0, 1, CDataType::Char).unwrap(),
            Some(Value::Char("150060275".into()))
        );
        assert_eq!(convert_cell(&strings, 1, 1, CDataType::Char).unwrap(), None);
        assert_eq!(
            convert_cell(&strings, 0, 1, CDataType::BigInt).unwrap(),
            Some(Value::BigInt(150060275))
        );
        assert!(matches!(
            convert_cell(&strings, 2, 1, CDataType::Double),
            Err(DriverError::Conversion(1, _))
        ));

        let ints = Int64Array::from(vec![150060275]);
        assert_eq!(
            convert_cell(&ints, 0, 2, CDataType::Double).unwrap(),
            Some(Value::Double(150060275.0))
        );
        assert_eq!(
            convert_cell(&ints, 0, 2, CDataType::Long).unwrap(),
            Some(Value::Long(150060275))
        );

        let doubles = Float64Array::from(vec![1500602.75]);
        assert_eq!(
            convert_cell(&doubles, 0, 2, CDataType::Char).unwrap(),
            Some(Value::Char("1500602.75".into()))
        );

        let flags = BooleanArray::from(vec![true]);
        let flag = convert_cell(&flags, 0, 3, CDataType::Bit).unwrap().unwrap();
        assert_eq!(flag, Value::Bit(true));
        assert_eq!(flag.to_string(), "1");
    }

    #[test]
    fn test_convert_null_typed_column() {
        let nulls = NullArray::new(2);

        for target in [CDataType::Char, CDataType::BigInt, CDataType::Bit] {
            assert_eq!(convert_cell(&nulls, 1, 1, target).unwrap(), None);
        }
    }
}
