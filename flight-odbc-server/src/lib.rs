//! An in-memory Flight SQL server for exercising the driver.
//!
//! [`spawn`] and [`spawn_tls`] start a server on an ephemeral localhost port
//! and are what the integration tests use; the `flight-odbc-server` binary
//! calls [`serve`].

pub mod error;
pub mod fixtures;
pub mod service;

use std::net::SocketAddr;

use arrow_flight::flight_service_server::FlightServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};
use tracing::{error, info};

use crate::error::{Result, ServerError};
pub use crate::service::FixtureService;
pub use tonic::transport::Identity;

fn server(tls: Option<Identity>) -> Result<Server> {
    let builder = Server::builder();

    match tls {
        Some(identity) => builder
            .tls_config(ServerTlsConfig::new().identity(identity))
            .map_err(|e| ServerError::Tls(e.to_string())),
        None => Ok(builder),
    }
}

/// Serve on `addr` until the server fails. With an identity the server
/// speaks TLS only.
pub async fn serve(service: FixtureService, addr: SocketAddr, tls: Option<Identity>) -> Result<()> {
    info!(%addr, tls = tls.is_some(), "listening");

    server(tls)?
        .add_service(FlightServiceServer::new(service))
        .serve(addr)
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))
}

/// Serve plaintext on an ephemeral localhost port in the background and
/// return the bound address
pub async fn spawn(service: FixtureService) -> Result<SocketAddr> {
    spawn_with(service, None).await
}

/// Like [`spawn`], over TLS with the given certificate and key
pub async fn spawn_tls(service: FixtureService, identity: Identity) -> Result<SocketAddr> {
    spawn_with(service, Some(identity)).await
}

async fn spawn_with(service: FixtureService, tls: Option<Identity>) -> Result<SocketAddr> {
    let mut server = server(tls)?;
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| ServerError::Bind("127.0.0.1:0".into(), e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind("127.0.0.1:0".into(), e.to_string()))?;

    tokio::spawn(async move {
        let result = server
            .add_service(FlightServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;

        if let Err(e) = result {
            error!(%addr, "fixture server stopped: {e}");
        }
    });

    info!(%addr, "fixture server started");
    Ok(addr)
}
