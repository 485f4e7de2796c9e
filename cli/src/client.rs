//! Thin IPC client used by every short-lived `trust` subcommand: connect to
//! the daemon's admin socket, send one [`DaemonCommand`], await one
//! [`DaemonResponse`], all bounded by [`ipc::IPC_TIMEOUT`].

use crate::ipc::{self, DaemonCommand, DaemonResponse, IpcMessage};
use std::io;
use thiserror::Error;
use tokio::net::UnixStream;

/// Failure modes talking to the daemon over the admin socket.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the trust daemon at {path}: {source}")]
    Connect { path: String, source: io::Error },
    #[error("ipc error: {0}")]
    Ipc(#[from] ipc::IpcError),
    #[error("the daemon did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

/// Sends `command` to the daemon listening on `socket_path` and returns its
/// response, or [`ClientError::Timeout`] if the whole round trip exceeds
/// [`ipc::IPC_TIMEOUT`].
pub async fn send(socket_path: &str, command: DaemonCommand) -> Result<DaemonResponse, ClientError> {
    tokio::time::timeout(ipc::IPC_TIMEOUT, send_inner(socket_path, command))
        .await
        .map_err(|_| ClientError::Timeout(ipc::IPC_TIMEOUT))?
}

async fn send_inner(socket_path: &str, command: DaemonCommand) -> Result<DaemonResponse, ClientError> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|source| ClientError::Connect { path: socket_path.to_string(), source })?;

    ipc::write_frame(&mut stream, &IpcMessage::new(command)).await?;
    let response: IpcMessage<DaemonResponse> = ipc::read_frame(&mut stream).await?;
    Ok(response.payload)
}
