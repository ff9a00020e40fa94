//! Transport bootstrap: socket binding and graceful serving.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, Stream};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::oneshot;
use tonic::transport::server::Connected;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::grpc::KeyManagementServiceImpl;

/// Server setup and transport failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A stale socket could not be removed
    #[error("failed to remove stale socket {path}: {source}")]
    StaleSocket {
        /// Socket path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The listener could not be bound
    #[error("failed to listen on {path}: {source}")]
    Bind {
        /// Socket path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The gRPC transport failed
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Bind a unix socket at `path`, replacing a leftover socket file.
///
/// # Errors
///
/// Returns an error if the stale socket cannot be removed or binding fails.
pub fn bind_unix(path: &Path) -> Result<UnixListener, ServerError> {
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed stale socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ServerError::StaleSocket {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    UnixListener::bind(path).map_err(|source| ServerError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Connection stream over a unix listener.
pub fn unix_incoming(listener: UnixListener) -> impl Stream<Item = io::Result<UnixStream>> + Send {
    stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(stream, _)| stream);
        Some((accepted, listener))
    })
}

/// Connection stream over a TCP listener.
pub fn tcp_incoming(listener: TcpListener) -> impl Stream<Item = io::Result<TcpStream>> + Send {
    stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(stream, _)| stream);
        Some((accepted, listener))
    })
}

/// Serve `service` on `incoming` until `shutdown` resolves.
///
/// After the signal, in-flight requests get `drain_timeout` to finish before
/// the server is dropped.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] if the server fails.
pub async fn serve<I, IO, S>(
    service: KeyManagementServiceImpl,
    incoming: I,
    shutdown: S,
    drain_timeout: Duration,
) -> Result<(), ServerError>
where
    I: Stream<Item = io::Result<IO>> + Send + 'static,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IO::ConnectInfo: Clone + Send + Sync + 'static,
    S: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = Server::builder()
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(Box::pin(incoming), async move {
            let _ = stop_rx.await;
        });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(ServerError::from),
        () = shutdown => info!("shutdown requested, draining in-flight requests"),
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(drain_timeout, server).await {
        Ok(result) => result.map_err(ServerError::from),
        Err(_) => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "drain timeout reached, closing remaining connections"
            );
            Ok(())
        }
    }
}

/// Bind `path` and serve until `shutdown`, removing the socket afterwards.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn serve_unix<S>(
    service: KeyManagementServiceImpl,
    path: &Path,
    shutdown: S,
    drain_timeout: Duration,
) -> Result<(), ServerError>
where
    S: Future<Output = ()>,
{
    let listener = bind_unix(path)?;
    info!(path = %path.display(), "listening for KMS requests");

    let result = serve(service, unix_incoming(listener), shutdown, drain_timeout).await;

    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove socket");
        }
    }
    result
}
