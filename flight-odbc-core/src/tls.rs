//! TLS for encrypted connections.
//!
//! tonic only verifies certificates, so the driver builds its own rustls
//! client configuration and hands the channel a connector that speaks TLS on
//! every connection. When certificate verification is disabled every server
//! certificate is accepted, though handshake signatures are still checked.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use tonic::codegen::{
    http::uri::{InvalidUriParts, PathAndQuery, Scheme},
    http::Uri,
    Service,
};

use crate::error::{DriverError, Result};

type Inner = HttpsConnector<HttpConnector>;
type ConnectResult = std::result::Result<
    <Inner as Service<Uri>>::Response,
    <Inner as Service<Uri>>::Error,
>;

/// Connector for encrypted channels.
///
/// tonic refuses `https://` URIs unless it owns the TLS configuration, so
/// encrypted channels are addressed as `http://` and this connector upgrades
/// each connection regardless of the scheme it is asked for.
#[derive(Clone)]
pub struct TlsConnector {
    inner: Inner,
}

impl Service<Uri> for TlsConnector {
    type Response = <Inner as Service<Uri>>::Response;
    type Error = <Inner as Service<Uri>>::Error;
    type Future = Pin<Box<dyn Future<Output = ConnectResult> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        match with_https_scheme(uri) {
            Ok(uri) => Box::pin(self.inner.call(uri)),
            Err(e) => Box::pin(async move { Err(e.into()) }),
        }
    }
}

fn with_https_scheme(uri: Uri) -> std::result::Result<Uri, InvalidUriParts> {
    let mut parts = uri.into_parts();
    parts.scheme = Some(Scheme::HTTPS);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    Uri::from_parts(parts)
}

pub fn client_config(verify_certificates: bool) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| DriverError::Tls(e.to_string()))?;

    let mut config = if verify_certificates {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    };

    // gRPC needs HTTP/2
    config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(config)
}

pub fn connector(verify_certificates: bool) -> Result<TlsConnector> {
    let config = client_config(verify_certificates)?;

    let inner = HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_only()
        .enable_http2()
        .build();

    Ok(TlsConnector { inner })
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
