//! Connections to a Flight SQL server.
//!
//! A connection is created unconnected by [`FlightSqlDriver`] and opened with a
//! [`ConnPropertyMap`]. Statements share the connection's gRPC channel.

use std::str::FromStr;

use arrow_flight::sql::client::FlightSqlServiceClient;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use crate::{
    error::{DriverError, Result},
    properties::{
        ConnPropertyMap, DISABLE_CERTIFICATE_VERIFICATION, HOST, PASSWORD, PORT, TOKEN, USER,
        USE_ENCRYPTION,
    },
    statement::FlightSqlStatement,
    tls,
};

const REQUIRED_ATTRIBUTES: [&str; 2] = [HOST, PORT];

#[derive(Debug, Default, Clone, Copy)]
pub struct FlightSqlDriver;

impl FlightSqlDriver {
    pub fn new() -> Self {
        FlightSqlDriver
    }

    /// Create a connection that still has to be opened with
    /// [`FlightSqlConnection::connect`]
    pub fn create_connection(&self) -> FlightSqlConnection {
        FlightSqlConnection::default()
    }
}

#[derive(Debug, Default)]
pub struct FlightSqlConnection {
    client: Option<FlightSqlServiceClient<Channel>>,
    uri: Option<String>,
}

impl FlightSqlConnection {
    /// Required attributes that are absent or empty in `properties`
    pub fn missing_attributes(properties: &ConnPropertyMap) -> Vec<String> {
        REQUIRED_ATTRIBUTES
            .iter()
            .filter(|key| {
                properties
                    .get(key)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(|key| key.to_string())
            .collect()
    }

    /// Open the connection.
    ///
    /// With `useEncryption` (the default) the channel is TLS, verifying the
    /// server certificate unless `disableCertificateVerification` is set.
    /// A `token` property is sent as a bearer token, otherwise a non-empty
    /// `user` performs the Flight basic-auth handshake.
    pub async fn connect(&mut self, properties: &ConnPropertyMap) -> Result<()> {
        let missing = Self::missing_attributes(properties);
        if !missing.is_empty() {
            return Err(DriverError::MissingAttributes(missing));
        }

        let uri = endpoint_uri(properties)?;
        let use_encryption = properties.get_bool(USE_ENCRYPTION, true)?;
        let verify_certificates = !properties.get_bool(DISABLE_CERTIFICATE_VERIFICATION, false)?;

        // encrypted channels are addressed as http://, see tls::TlsConnector
        let endpoint = Endpoint::from_shared(uri.replacen("https://", "http://", 1))
            .map_err(|e| DriverError::Connect(uri.clone(), describe(&e)))?;

        debug!(%uri, use_encryption, verify_certificates, "opening channel");
        let channel = if use_encryption {
            if !verify_certificates {
                warn!(%uri, "server certificate verification is disabled");
            }
            endpoint
                .connect_with_connector(tls::connector(verify_certificates)?)
                .await
        } else {
            endpoint.connect().await
        }
        .map_err(|e| DriverError::Connect(uri.clone(), describe(&e)))?;

        let mut client = FlightSqlServiceClient::new(channel);

        for (key, value) in properties.call_headers() {
            validate_header(&key, &value)?;
            debug!(header = %key, "adding call header");
            client.set_header(key, value);
        }

        if let Some(token) = non_empty(properties.get(TOKEN)) {
            client.set_token(token.to_string());
        } else if let Some(user) = non_empty(properties.get(USER)) {
            let password = properties.get(PASSWORD).unwrap_or_default();
            client
                .handshake(user, password)
                .await
                .map_err(|e| DriverError::Authentication(e.to_string()))?;
            debug!(user, "authenticated");
        }

        info!(%uri, "connected");
        self.client = Some(client);
        self.uri = Some(uri);

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// The URI of the open connection
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn create_statement(&self) -> Result<FlightSqlStatement> {
        let client = self.client.as_ref().ok_or(DriverError::NotConnected)?;

        Ok(FlightSqlStatement::new(client.clone()))
    }

    /// Release the client. Closing a closed connection does nothing.
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            info!(uri = self.uri.as_deref().unwrap_or_default(), "connection closed");
        }
        self.uri = None;
    }
}

fn endpoint_uri(properties: &ConnPropertyMap) -> Result<String> {
    let host = properties.get(HOST).unwrap_or_default().trim();
    let port_value = properties.get(PORT).unwrap_or_default();
    let port: u16 = port_value
        .trim()
        .parse()
        .map_err(|_| DriverError::InvalidProperty(PORT.into(), port_value.into()))?;
    let scheme = if properties.get_bool(USE_ENCRYPTION, true)? {
        "https"
    } else {
        "http"
    };

    // bare IPv6 addresses need brackets in a URI
    if host.contains(':') && !host.starts_with('[') {
        Ok(format!("{scheme}://[{host}]:{port}"))
    } else {
        Ok(format!("{scheme}://{host}:{port}"))
    }
}

fn validate_header(key: &str, value: &str) -> Result<()> {
    AsciiMetadataKey::from_str(key)
        .map_err(|_| DriverError::InvalidProperty(key.into(), value.into()))?;
    AsciiMetadataValue::try_from(value)
        .map_err(|_| DriverError::InvalidProperty(key.into(), value.into()))?;

    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Flatten an error and its sources, tonic's top level message is terse
fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
