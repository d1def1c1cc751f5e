use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum DriverError {
    #[error("Error authenticating: {0}")]
    Authentication(String),

    #[error("Column index {0} is out of bounds (result set has {1} columns)")]
    ColumnOutOfRange(usize, usize),

    #[error("Error connecting to {0}: {1}")]
    Connect(String, String),

    #[error("Error converting column {0}: {1}")]
    Conversion(usize, String),

    #[error("Invalid value '{1}' for connection property {0}")]
    InvalidProperty(String, String),

    #[error("Error retrieving metadata: {0}")]
    Metadata(String),

    #[error("Missing required connection attributes: {}", .0.join(", "))]
    MissingAttributes(Vec<String>),

    #[error("There is no current row, call move_rows first")]
    NoCurrentRow,

    #[error("Connection is not open")]
    NotConnected,

    #[error("Error executing query ({0}) {1}")]
    Query(String, String),

    #[error("Error configuring TLS: {0}")]
    Tls(String),
}
