//! PID file written at startup and removed on exit.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::warn;

use super::error::InfraError;

/// Removes the PID file when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`, replacing any previous content.
    pub fn create(path: &Path) -> Result<Self, InfraError> {
        fs::write(path, format!("{}\n", std::process::id())).map_err(|source| {
            InfraError::PidFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(
                target = "cache_stnsd::pidfile",
                path = %self.path.display(),
                error = %err,
                "failed to remove pid file"
            );
        }
    }
}
