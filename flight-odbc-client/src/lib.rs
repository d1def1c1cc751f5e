//! Command line smoke tests for the Flight SQL driver.

pub mod args;
pub mod error;
pub mod smoke;

pub use args::{parse_connection_properties, usage};
pub use error::{ClientError, UsageError};
