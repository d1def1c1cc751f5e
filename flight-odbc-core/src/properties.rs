//! Connection properties.
//!
//! A property map is a set of string key/value pairs handed to
//! [`FlightSqlConnection::connect`](crate::FlightSqlConnection::connect).
//! Keys are compared without regard to ASCII case and the last write wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

pub const HOST: &str = "host";
pub const PORT: &str = "port";
pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const TOKEN: &str = "token";
pub const USE_ENCRYPTION: &str = "useEncryption";
pub const DISABLE_CERTIFICATE_VERIFICATION: &str = "disableCertificateVerification";

/// Keys consumed by the driver itself. Everything else is sent to the server
/// as a call header.
const BUILTIN_KEYS: [&str; 7] = [
    HOST,
    PORT,
    USER,
    PASSWORD,
    TOKEN,
    USE_ENCRYPTION,
    DISABLE_CERTIFICATE_VERIFICATION,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnPropertyMap {
    // lowercased key -> (key as written, value)
    entries: BTreeMap<String, (String, String)>,
}

impl ConnPropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, returning the value it replaced
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value.into()))
            .map(|(_, previous)| previous)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs, keys as they were written
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Read a boolean property, falling back to `default` when it is absent
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => parse_bool(value)
                .ok_or_else(|| DriverError::InvalidProperty(key.into(), value.into())),
        }
    }

    /// Properties that are not understood by the driver, as lowercased
    /// header names with their values
    pub fn call_headers(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(lowered, _)| {
                !BUILTIN_KEYS
                    .iter()
                    .any(|builtin| builtin.eq_ignore_ascii_case(lowered))
            })
            .map(|(lowered, (_, value))| (lowered.to_owned(), value.to_owned()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnPropertyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = ConnPropertyMap::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_ignoring_case() {
        let mut properties = ConnPropertyMap::new();
        assert_eq!(properties.insert("HOST", "one"), None);
        assert_eq!(properties.insert(HOST, "two"), Some("one".into()));

        assert_eq!(properties.len(), 1);
        assert_eq!(properties.get("Host"), Some("two"));
        assert_eq!(properties.iter().next(), Some((HOST, "two")));
    }

    #[test]
    fn test_get_bool() {
        let properties: ConnPropertyMap = [
            (USE_ENCRYPTION, "FALSE"),
            (DISABLE_CERTIFICATE_VERIFICATION, "1"),
            ("broken", "maybe"),
        ]
        .into_iter()
        .collect();

        assert!(!properties.get_bool(USE_ENCRYPTION, true).unwrap());
        assert!(properties
            .get_bool(DISABLE_CERTIFICATE_VERIFICATION, false)
            .unwrap());
        assert!(properties.get_bool("absent", true).unwrap());
        assert_eq!(
            properties.get_bool("broken", false),
            Err(DriverError::InvalidProperty("broken".into(), "maybe".into()))
        );
    }

    #[test]
    fn test_call_headers_skip_builtin_keys() {
        let properties: ConnPropertyMap = [
            (HOST, "localhost"),
            (PORT, "443"),
            ("useencryption", "true"),
            ("data_plane", "spark-resources"),
            ("Cluster", "arrow"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            properties.call_headers(),
            vec![
                ("cluster".to_string(), "arrow".to_string()),
                ("data_plane".to_string(), "spark-resources".to_string()),
            ]
        );
    }
}
