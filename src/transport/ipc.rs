// src/transport/ipc.rs

use crate::error::{SpError, SpResult};
use crate::transport::{Dialer, Listener};

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug)]
pub(crate) struct IpcAcceptor {
  listener: UnixListener,
  path: PathBuf,
}

impl IpcAcceptor {
  /// Binds a Unix domain socket at `path`, replacing a stale socket file left by a
  /// previous process.
  pub(crate) fn bind(path: &PathBuf) -> SpResult<(Self, String)> {
    let uri = format!("ipc://{}", path.display());
    match std::fs::remove_file(path) {
      Ok(()) => tracing::debug!(path = ?path, "Removed stale IPC socket file"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(SpError::bind_failed(e, &uri)),
    }
    let listener = UnixListener::bind(path).map_err(|e| SpError::bind_failed(e, &uri))?;
    tracing::info!(path = ?path, "IPC listener bound");
    Ok((
      Self {
        listener,
        path: path.clone(),
      },
      uri,
    ))
  }
}

#[async_trait]
impl Listener for IpcAcceptor {
  type Stream = UnixStream;

  async fn accept(&mut self) -> io::Result<(UnixStream, String)> {
    let (stream, _) = self.listener.accept().await?;
    Ok((stream, format!("ipc://{}", self.path.display())))
  }
}

impl Drop for IpcAcceptor {
  fn drop(&mut self) {
    match std::fs::remove_file(&self.path) {
      Ok(()) => tracing::debug!(path = ?self.path, "Removed IPC socket file"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => tracing::warn!(path = ?self.path, error = %e, "Failed to remove IPC socket file"),
    }
  }
}

#[derive(Debug)]
pub(crate) struct IpcDialer {
  path: PathBuf,
}

impl IpcDialer {
  pub(crate) fn new(path: PathBuf) -> Self {
    Self { path }
  }
}

#[async_trait]
impl Dialer for IpcDialer {
  type Stream = UnixStream;

  async fn dial(&self) -> io::Result<(UnixStream, String)> {
    let stream = UnixStream::connect(&self.path).await?;
    Ok((stream, format!("ipc://{}", self.path.display())))
  }
}
