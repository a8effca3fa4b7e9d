// src/transport/inproc.rs

use crate::context::Context;
use crate::error::{SpError, SpResult};
use crate::socket::core::SocketCore;
use crate::transport::{Dialer, Listener};

use async_channel::Receiver as AsyncReceiver;
use async_trait::async_trait;
use std::io;
use tokio::io::DuplexStream;

/// Buffer of each direction of an in-process connection.
const INPROC_BUFFER: usize = 64 * 1024;
/// Connections a binder has not yet picked up.
pub(crate) const INPROC_BACKLOG: usize = 16;

/// Half of an in-process connection handed to the binder, with the connecter's name.
pub(crate) type InprocConnection = (DuplexStream, String);

#[derive(Debug)]
pub(crate) struct InprocAcceptor {
  name: String,
  context: Context,
  incoming: AsyncReceiver<InprocConnection>,
}

impl InprocAcceptor {
  /// Registers `name` with the socket's context. Names are unique per context.
  pub(crate) fn bind(core: &SocketCore, name: &str) -> SpResult<(Self, String)> {
    let uri = format!("inproc://{}", name);
    let (tx, rx) = async_channel::bounded(INPROC_BACKLOG);
    if !core.context.inner().register_inproc(name, tx) {
      let e = io::Error::new(io::ErrorKind::AddrInUse, "inproc name already bound");
      return Err(SpError::bind_failed(e, &uri));
    }
    tracing::info!(handle = core.handle, name, "Inproc endpoint bound");
    Ok((
      Self {
        name: name.to_string(),
        context: core.context.clone(),
        incoming: rx,
      },
      uri,
    ))
  }
}

#[async_trait]
impl Listener for InprocAcceptor {
  type Stream = DuplexStream;

  async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
    self
      .incoming
      .recv()
      .await
      .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "inproc registration closed"))
  }
}

impl Drop for InprocAcceptor {
  fn drop(&mut self) {
    self.incoming.close();
    self.context.inner().unregister_inproc(&self.name);
  }
}

#[derive(Debug)]
pub(crate) struct InprocDialer {
  name: String,
  handle: usize,
  context: Context,
}

impl InprocDialer {
  pub(crate) fn new(core: &SocketCore, name: String) -> Self {
    Self {
      name,
      handle: core.handle,
      context: core.context.clone(),
    }
  }
}

#[async_trait]
impl Dialer for InprocDialer {
  type Stream = DuplexStream;

  /// Fails with `NotFound` until some socket binds the name; the connecter keeps retrying.
  async fn dial(&self) -> io::Result<(DuplexStream, String)> {
    let binder = self
      .context
      .inner()
      .lookup_inproc(&self.name)
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "inproc name not bound"))?;
    let (ours, theirs) = tokio::io::duplex(INPROC_BUFFER);
    binder
      .send((theirs, format!("inproc-connecter-{}", self.handle)))
      .await
      .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "inproc binder went away"))?;
    Ok((ours, format!("inproc://{}", self.name)))
  }
}
