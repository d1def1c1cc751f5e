use flight_odbc_core::DriverError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum ClientError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Error writing output: {0}")]
    Output(String),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Output(e.to_string())
    }
}

/// The command line could not be turned into connection properties
#[derive(Error, Debug, PartialEq, Clone)]
pub enum UsageError {
    #[error("{0}")]
    Invalid(String),
}

impl UsageError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<clap::Error> for UsageError {
    fn from(e: clap::Error) -> Self {
        UsageError::Invalid(e.to_string())
    }
}
