use std::fmt;

use thiserror::Error;

/// Everything that can go wrong during one refresh run.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("failed to download the source file: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv header is missing column '{0}'")]
    MissingColumn(String),

    #[error("invalid count '{value}' for {iso_code} on {date}")]
    InvalidCount {
        iso_code: String,
        date: String,
        value: String,
    },

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),
}

/// The stage a [`RefreshError`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Parse,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Fetch => write!(f, "fetch"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Persistence => write!(f, "persistence"),
        }
    }
}

impl RefreshError {
    pub fn kind(&self) -> ErrorKind {
        use RefreshError::*;
        match self {
            Fetch(_) => ErrorKind::Fetch,
            Csv(_) | MissingColumn(_) | InvalidCount { .. } => ErrorKind::Parse,
            Database(_) | Tls(_) => ErrorKind::Persistence,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(String),
}
