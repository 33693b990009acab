use std::{
    fs,
    future::IntoFuture,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use axum::Router;
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use crate::infra::{error::InfraError, shutdown::Shutdown};

/// Serve `router` on the unix socket at `path` until shutdown is requested.
///
/// In-flight requests get `grace` to finish once the signal fires; after that
/// `serve` stops waiting and returns. Connection tasks still running at that
/// point belong to the runtime and end when it shuts down, which the binary
/// does right after `serve` returns. The socket file is removed on return.
pub async fn serve(
    path: &Path,
    router: Router,
    shutdown: Shutdown,
    grace: Duration,
) -> Result<(), InfraError> {
    let listener = bind(path).await?;
    let _socket_file = SocketFile {
        path: path.to_path_buf(),
    };

    info!(
        target = "cache_stnsd::http",
        socket = %path.display(),
        "listening on unix socket"
    );

    let mut drain_signal = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { drain_signal.wait().await })
        .into_future();
    tokio::pin!(server);

    let mut deadline_signal = shutdown;
    let deadline = async move {
        deadline_signal.wait().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = &mut server => result?,
        _ = deadline => {
            warn!(
                target = "cache_stnsd::http",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; closing remaining connections"
            );
        }
    }

    info!(target = "cache_stnsd::http", "server stopped");
    Ok(())
}

/// Bind the socket, clearing a stale file left behind by a crashed daemon.
async fn bind(path: &Path) -> Result<UnixListener, InfraError> {
    match fs::symlink_metadata(path) {
        Ok(_) => {
            if UnixStream::connect(path).await.is_ok() {
                return Err(InfraError::socket(
                    path,
                    "another process is already listening",
                ));
            }
            fs::remove_file(path).map_err(|err| {
                InfraError::socket(path, format!("failed to remove stale socket: {err}"))
            })?;
            info!(
                target = "cache_stnsd::http",
                socket = %path.display(),
                "removed stale socket file"
            );
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(InfraError::socket(path, format!("failed to inspect: {err}")));
        }
    }

    UnixListener::bind(path)
        .map_err(|err| InfraError::socket(path, format!("failed to bind: {err}")))
}

struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                target = "cache_stnsd::http",
                socket = %self.path.display(),
                error = %err,
                "failed to remove socket file"
            ),
        }
    }
}
