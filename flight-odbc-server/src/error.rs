use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum ServerError {
    #[error("Error binding {0}: {1}")]
    Bind(String, String),

    #[error("Error loading fixtures: {0}")]
    Fixtures(String),

    #[error("Error configuring TLS: {0}")]
    Tls(String),

    #[error("Error serving Flight SQL: {0}")]
    Transport(String),
}
