//! Command line flags and the connection properties they produce.

use std::ffi::OsString;

use clap::Parser;
use flight_odbc_core::{
    properties::{
        DISABLE_CERTIFICATE_VERIFICATION, HOST, PASSWORD, PORT, USER, USE_ENCRYPTION,
    },
    ConnPropertyMap,
};

use crate::error::UsageError;

pub const DATA_PLANE: &str = "data_plane";
pub const CLUSTER: &str = "cluster";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "443";
pub const DEFAULT_DATA_PLANE: &str = "spark-resources";
pub const DEFAULT_CLUSTER: &str = "arrow";

/// `-h` belongs to `--host` and the flag set is closed, so there is no help
/// flag: `--help` is an unknown flag like any other
#[derive(Parser, Debug, Default, PartialEq)]
#[command(
    name = "flight-odbc-client",
    about = "Connect to a Flight SQL server and list its tables and columns",
    disable_help_flag = true,
    args_override_self = true
)]
pub struct Args {
    /// Flight SQL server host
    #[arg(short = 'h', long, value_name = "host")]
    pub host: Option<String>,

    /// Flight SQL server port
    #[arg(short, long, value_name = "port")]
    pub port: Option<String>,

    /// Username
    #[arg(short, long, value_name = "username")]
    pub user: Option<String>,

    /// Password
    #[arg(short = 'w', long, value_name = "password")]
    pub password: Option<String>,

    /// Data plane name
    #[arg(short, long = "data-plane", value_name = "name")]
    pub data_plane: Option<String>,

    /// Cluster name
    #[arg(short, long, value_name = "name")]
    pub cluster: Option<String>,

    /// Disable encryption
    #[arg(short, long = "no-encryption")]
    pub no_encryption: bool,

    /// Disable certificate verification
    #[arg(short = 'k', long = "disable-cert-verify")]
    pub disable_cert_verify: bool,
}

impl Args {
    /// Defaults overlaid with the flags that were given
    pub fn into_properties(self) -> ConnPropertyMap {
        let mut properties = default_properties();

        let overrides = [
            (HOST, self.host),
            (PORT, self.port),
            (USER, self.user),
            (PASSWORD, self.password),
            (DATA_PLANE, self.data_plane),
            (CLUSTER, self.cluster),
        ];
        for (key, value) in overrides {
            if let Some(value) = value {
                properties.insert(key, value);
            }
        }

        if self.no_encryption {
            properties.insert(USE_ENCRYPTION, "false");
        }
        if self.disable_cert_verify {
            properties.insert(DISABLE_CERTIFICATE_VERIFICATION, "true");
        }

        properties
    }
}

pub fn default_properties() -> ConnPropertyMap {
    [
        (HOST, DEFAULT_HOST),
        (PORT, DEFAULT_PORT),
        (USER, ""),
        (PASSWORD, ""),
        (USE_ENCRYPTION, "true"),
        (DISABLE_CERTIFICATE_VERIFICATION, "false"),
        (DATA_PLANE, DEFAULT_DATA_PLANE),
        (CLUSTER, DEFAULT_CLUSTER),
    ]
    .into_iter()
    .collect()
}

/// Parse process arguments (program name first) into connection properties
pub fn parse_connection_properties<I, T>(args: I) -> Result<ConnPropertyMap, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::try_parse_from(args)?;

    Ok(args.into_properties())
}

/// The usage text printed when the arguments cannot be parsed
pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [options]\n\
         Options:\n\
         \x20 --host, -h <host>           Flight SQL server host\n\
         \x20 --port, -p <port>           Flight SQL server port\n\
         \x20 --user, -u <username>       Username\n\
         \x20 --password, -w <password>   Password\n\
         \x20 --data-plane, -d <name>     Data plane name\n\
         \x20 --cluster, -c <name>        Cluster name\n\
         \x20 --no-encryption, -n         Disable encryption\n\
         \x20 --disable-cert-verify, -k   Disable certificate verification\n"
    )
}
