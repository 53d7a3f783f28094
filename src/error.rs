//! Error types for the DSM certificate client.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("unsupported service: {0}")]
    UnsupportedService(String),

    #[error("IO on {}: {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP status other than 200, or a decoded body with `success: false`.
    #[error("remote: HTTP {status}: {body}")]
    Remote {
        status: u16,
        body:   serde_json::Value,
    },

    #[error("registry conflict: service {service:?} claimed by certificates {ids:?}")]
    RegistryConflict {
        service: String,
        ids:     Vec<String>,
    },

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CertError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<url::ParseError> for CertError {
    fn from(e: url::ParseError) -> Self {
        Self::Config(format!("bad URL: {e}"))
    }
}

impl CertError {
    /// HTTP status carried by a `Remote` failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CertError>;
