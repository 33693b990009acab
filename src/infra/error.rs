use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("pid file `{path}`: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unix socket `{path}`: {message}")]
    Socket { path: PathBuf, message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn socket(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Socket {
            path: path.into(),
            message: message.into(),
        }
    }
}
