//! TLS trust and identity material for the origin connection.

use std::{fs, path::Path};

use reqwest::{Certificate, Identity};
use thiserror::Error;

use crate::config::TlsSettings;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {kind} file `{path}`: {source}")]
    Read {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {kind} in `{path}`: {source}")]
    Parse {
        kind: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CA file `{path}` contains no certificates")]
    EmptyBundle { path: String },
}

/// Already-loaded TLS material handed to the upstream client.
#[derive(Default)]
pub struct TlsMaterial {
    /// Extra trust roots.
    pub roots: Vec<Certificate>,
    /// Client certificate and key for mutual TLS.
    pub identity: Option<Identity>,
}

impl TlsMaterial {
    /// Load PEM files named in the settings. The client identity is only
    /// loaded when both certificate and key are configured.
    pub fn load(settings: &TlsSettings) -> Result<Self, TlsError> {
        let roots = match settings.ca.as_deref() {
            Some(path) => load_roots(path)?,
            None => Vec::new(),
        };

        let identity = match (settings.cert.as_deref(), settings.key.as_deref()) {
            (Some(cert), Some(key)) => Some(load_identity(cert, key)?),
            _ => None,
        };

        Ok(Self { roots, identity })
    }

    /// True when neither custom trust nor a client certificate is configured.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.identity.is_none()
    }
}

fn read(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.display().to_string(),
        source,
    })
}

fn load_roots(path: &Path) -> Result<Vec<Certificate>, TlsError> {
    let pem = read("CA certificate", path)?;
    let roots = Certificate::from_pem_bundle(&pem).map_err(|source| TlsError::Parse {
        kind: "CA certificate",
        path: path.display().to_string(),
        source,
    })?;
    if roots.is_empty() {
        return Err(TlsError::EmptyBundle {
            path: path.display().to_string(),
        });
    }
    Ok(roots)
}

fn load_identity(cert: &Path, key: &Path) -> Result<Identity, TlsError> {
    let mut pem = read("client certificate", cert)?;
    pem.push(b'\n');
    pem.extend(read("client key", key)?);
    Identity::from_pem(&pem).map_err(|source| TlsError::Parse {
        kind: "client certificate/key pair",
        path: cert.display().to_string(),
        source,
    })
}
