use std::{env, fmt};

use log::error;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{config::SslMode, Client, Config};

use crate::error::{ConfigError, RefreshError};

pub const ENV_HOST: &str = "COVID_DB_HOST";
pub const ENV_NAME: &str = "COVID_DB_NAME";
pub const ENV_USER: &str = "COVID_DB_USER";
pub const ENV_PASS: &str = "COVID_DB_PASS";

/// Connection settings for the Postgres database holding the `country` table.
#[derive(Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

// Keep the password out of the logs.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl DbConfig {
    /// Read the settings from the `COVID_DB_*` environment variables.
    pub fn from_env() -> Result<DbConfig, ConfigError> {
        let var = |name: &str| env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()));
        Ok(DbConfig {
            host: var(ENV_HOST)?,
            dbname: var(ENV_NAME)?,
            user: var(ENV_USER)?,
            password: var(ENV_PASS)?,
        })
    }

    pub fn pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .ssl_mode(SslMode::Require);
        config
    }
}

/// Open a new connection, always encrypted.
///
/// Like libpq's `sslmode=require`, the server certificate is not verified.
/// The connection task is spawned on the current runtime and finishes when
/// the returned [`Client`] is dropped.
pub async fn connect(config: &DbConfig) -> Result<Client, RefreshError> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.pg_config().connect(tls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("postgres connection error: {}", e);
        }
    });
    Ok(client)
}
