use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use flight_odbc_server::{serve, FixtureService, Identity};
use tracing_subscriber::EnvFilter;

/// Serve the fixture database over Flight SQL
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:32010")]
    listen: SocketAddr,

    /// Require a basic-auth handshake with this user
    #[arg(short, long, requires = "password")]
    user: Option<String>,

    /// Password for --user
    #[arg(short = 'w', long)]
    password: Option<String>,

    /// PEM certificate chain, serves TLS when given
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut service = FixtureService::new()
        .await
        .context("loading fixture tables")?;
    if let (Some(user), Some(password)) = (args.user, args.password) {
        service = service.with_credentials(user, password);
    }

    let tls = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            let cert = tokio::fs::read(cert)
                .await
                .with_context(|| format!("reading {}", cert.display()))?;
            let key = tokio::fs::read(key)
                .await
                .with_context(|| format!("reading {}", key.display()))?;
            Some(Identity::from_pem(cert, key))
        }
        _ => None,
    };

    serve(service, args.listen, tls)
        .await
        .with_context(|| format!("serving on {}", args.listen))
}
