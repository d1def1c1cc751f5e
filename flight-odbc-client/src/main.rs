use std::io::Write;

use anyhow::Context;
use flight_odbc_client::{parse_connection_properties, smoke, usage};
use flight_odbc_core::FlightSqlDriver;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "flight-odbc-client".to_string());

    let driver = FlightSqlDriver::new();
    let mut connection = driver.create_connection();

    let properties = match parse_connection_properties(std::env::args_os()) {
        Ok(properties) => properties,
        Err(error) => {
            debug!("{error}");
            eprint!("{}", usage(&program));
            std::process::exit(error.exit_code());
        }
    };

    connection
        .connect(&properties)
        .await
        .context("connecting to the Flight SQL server")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    smoke::run(&connection, &mut out)
        .await
        .context("running smoke tests")?;
    out.flush()?;

    connection.close();

    Ok(())
}
