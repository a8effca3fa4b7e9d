// src/transport/mod.rs

pub(crate) mod endpoint;
pub(crate) mod tcp;

#[cfg(feature = "inproc")]
pub(crate) mod inproc;
#[cfg(all(feature = "ipc", unix))]
pub(crate) mod ipc;

use crate::engine::{run_connection, ConnectionRole, SpStream};
use crate::error::{SpError, SpResult};
use crate::socket::core::SocketCore;
use crate::socket::stats::Statistic;
use endpoint::Endpoint;

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Pause after a failing `accept` so a persistent error does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A bound endpoint that yields incoming connections.
#[async_trait]
pub(crate) trait Listener: Send + 'static {
  type Stream: SpStream;

  /// Waits for the next connection; the string names the peer for logging.
  async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;
}

/// A remote endpoint that can be dialled repeatedly.
#[async_trait]
pub(crate) trait Dialer: Send + Sync + 'static {
  type Stream: SpStream;

  async fn dial(&self) -> io::Result<(Self::Stream, String)>;
}

/// Binds `endpoint` and starts accepting on it. Returns the address actually
/// bound and the accept task.
pub(crate) async fn bind(
  core: Arc<SocketCore>,
  endpoint: &Endpoint,
  token: CancellationToken,
) -> SpResult<(String, JoinHandle<()>)> {
  match endpoint {
    Endpoint::Tcp { host, port } => {
      let (listener, resolved) = tcp::TcpAcceptor::bind(&core, host, *port)?;
      Ok(spawn_listener(core, listener, resolved, token))
    }
    #[cfg(all(feature = "ipc", unix))]
    Endpoint::Ipc(path) => {
      let (listener, resolved) = ipc::IpcAcceptor::bind(path)?;
      Ok(spawn_listener(core, listener, resolved, token))
    }
    #[cfg(all(feature = "ipc", not(unix)))]
    Endpoint::Ipc(path) => Err(SpError::UnsupportedTransport(format!("ipc://{}", path.display()))),
    #[cfg(feature = "inproc")]
    Endpoint::Inproc(name) => {
      let (listener, resolved) = inproc::InprocAcceptor::bind(&core, name)?;
      Ok(spawn_listener(core, listener, resolved, token))
    }
  }
}

/// Starts connecting to `endpoint` in the background. Name resolution happens
/// here so unresolvable hosts fail the call; everything after is retried.
pub(crate) async fn connect(
  core: Arc<SocketCore>,
  endpoint: &Endpoint,
  token: CancellationToken,
) -> SpResult<(String, JoinHandle<()>)> {
  match endpoint {
    Endpoint::Tcp { host, port } => {
      let dialer = tcp::TcpDialer::resolve(&core, host, *port).await?;
      let uri = format!("tcp://{}:{}", host, port);
      Ok(spawn_dialer(core, dialer, uri, token))
    }
    #[cfg(all(feature = "ipc", unix))]
    Endpoint::Ipc(path) => {
      let uri = format!("ipc://{}", path.display());
      Ok(spawn_dialer(core, ipc::IpcDialer::new(path.clone()), uri, token))
    }
    #[cfg(all(feature = "ipc", not(unix)))]
    Endpoint::Ipc(path) => Err(SpError::UnsupportedTransport(format!("ipc://{}", path.display()))),
    #[cfg(feature = "inproc")]
    Endpoint::Inproc(name) => {
      let uri = format!("inproc://{}", name);
      Ok(spawn_dialer(core.clone(), inproc::InprocDialer::new(&core, name.clone()), uri, token))
    }
  }
}

fn spawn_listener<L: Listener>(
  core: Arc<SocketCore>,
  listener: L,
  uri: String,
  token: CancellationToken,
) -> (String, JoinHandle<()>) {
  let task = tokio::spawn(run_accept_loop(core, listener, uri.clone(), token));
  (uri, task)
}

fn spawn_dialer<D: Dialer>(
  core: Arc<SocketCore>,
  dialer: D,
  uri: String,
  token: CancellationToken,
) -> (String, JoinHandle<()>) {
  let task = tokio::spawn(run_connect_loop(core, dialer, uri.clone(), token));
  (uri, task)
}

/// Accepts until cancelled, then waits for every accepted connection to finish.
async fn run_accept_loop<L: Listener>(core: Arc<SocketCore>, mut listener: L, uri: String, token: CancellationToken) {
  let handle = core.handle;
  let mut connections = JoinSet::new();
  tracing::debug!(handle, uri = %uri, "Accept loop started");

  loop {
    tokio::select! {
      biased;
      _ = token.cancelled() => break,
      accepted = listener.accept() => match accepted {
        Ok((stream, peer)) => {
          tracing::debug!(handle, uri = %uri, peer = %peer, "Accepted connection");
          connections.spawn(run_connection(
            core.clone(),
            stream,
            peer,
            ConnectionRole::Accepted,
            token.child_token(),
          ));
        }
        Err(e) => {
          core.stats.incr(Statistic::AcceptErrors);
          tracing::warn!(handle, uri = %uri, error = %e, "Accept failed");
          tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
          }
        }
      },
      Some(_) = connections.join_next(), if !connections.is_empty() => {}
    }
  }

  // Stop accepting before the connections linger.
  drop(listener);
  while let Some(result) = connections.join_next().await {
    if let Err(e) = result {
      tracing::error!(handle, uri = %uri, error = %e, "Connection task panicked");
    }
  }
  tracing::debug!(handle, uri = %uri, "Accept loop stopped");
}

/// Dials, runs the connection, and redials with backoff until cancelled.
async fn run_connect_loop<D: Dialer>(core: Arc<SocketCore>, dialer: D, uri: String, token: CancellationToken) {
  let handle = core.handle;
  let mut backoff = Backoff::new(&core);

  while !token.is_cancelled() {
    let attempt = tokio::select! {
      _ = token.cancelled() => break,
      attempt = dialer.dial() => attempt,
    };
    match attempt {
      Ok((stream, peer)) => {
        backoff = Backoff::new(&core);
        run_connection(core.clone(), stream, peer, ConnectionRole::Connected, token.child_token()).await;
      }
      Err(e) => {
        core.stats.incr(Statistic::ConnectErrors);
        tracing::debug!(handle, uri = %uri, error = %e, "Connect attempt failed");
      }
    }
    let delay = backoff.next_delay();
    tokio::select! {
      _ = token.cancelled() => break,
      _ = tokio::time::sleep(delay) => {}
    }
  }
  tracing::debug!(handle, uri = %uri, "Connecter stopped");
}

/// Reconnect delays: `RECONNECT_IVL`, doubling up to `RECONNECT_IVL_MAX` when that is
/// larger, otherwise constant.
#[derive(Debug)]
struct Backoff {
  current: Duration,
  max: Duration,
}

impl Backoff {
  fn new(core: &SocketCore) -> Self {
    let options = core.options.read();
    Self {
      current: options.reconnect_ivl,
      max: options.reconnect_ivl_max,
    }
  }

  fn next_delay(&mut self) -> Duration {
    let delay = self.current;
    if self.max > self.current {
      self.current = (self.current * 2).min(self.max);
    }
    delay
  }
}

pub(crate) fn connect_failed(host: &str, port: u16, reason: impl ToString) -> SpError {
  SpError::Connect {
    endpoint: format!("tcp://{}:{}", host, port),
    reason: reason.to_string(),
  }
}
