//! A small ODBC-style driver layer over Flight SQL.
//!
//! ```no_run
//! # async fn run() -> flight_odbc_core::error::Result<()> {
//! use flight_odbc_core::{CDataType, ConnPropertyMap, FlightSqlDriver};
//!
//! let properties: ConnPropertyMap = [("host", "localhost"), ("port", "32010")]
//!     .into_iter()
//!     .collect();
//!
//! let mut connection = FlightSqlDriver::new().create_connection();
//! connection.connect(&properties).await?;
//!
//! let mut statement = connection.create_statement()?;
//! let mut result_set = statement.execute("SELECT 1").await?;
//! while result_set.move_rows(1).await? == 1 {
//!     println!("{:?}", result_set.get_data(1, CDataType::Char)?);
//! }
//!
//! connection.close();
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod connection;
pub mod error;
pub mod pattern;
pub mod properties;
pub mod result_set;
pub mod statement;
pub mod tls;
pub mod types;

pub use connection::{FlightSqlConnection, FlightSqlDriver};
pub use error::{DriverError, Result};
pub use properties::ConnPropertyMap;
pub use result_set::{FlightSqlResultSet, ResultSetMetadata};
pub use statement::FlightSqlStatement;
pub use types::{CDataType, SqlDataType, Value};
