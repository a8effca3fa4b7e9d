// src/socket/pub_socket.rs

use crate::error::SpResult;
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::patterns::Distributor;
use crate::socket::{unsupported, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use std::sync::Arc;

/// Broadcasts to every subscriber. Never blocks: slow subscribers miss messages.
#[derive(Debug)]
pub(crate) struct PubSocket {
  core: Arc<SocketCore>,
  distributor: Distributor,
}

impl PubSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      distributor: Distributor::new(),
    }
  }
}

#[async_trait]
impl ISocket for PubSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, _control: Control, _flags: Flags) -> SpResult<()> {
    let delivered = self.distributor.send_to_all(&msg);
    tracing::trace!(handle = self.core.handle, delivered, size = msg.size(), "PUB published message");
    Ok(())
  }

  async fn recv(&self, _flags: Flags) -> SpResult<(Msg, Control)> {
    Err(unsupported(self.core.protocol, "PUB sockets cannot receive"))
  }

  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool {
    self.distributor.add_pipe(pipe_id, tx);
    true
  }

  fn pipe_detached(&self, pipe_id: u32) {
    self.distributor.remove_pipe(pipe_id);
  }

  fn ingress(&self, _pipe_id: u32, _msg: Msg) -> Option<Inbound> {
    None
  }

  fn readiness(&self) -> PollEvents {
    PollEvents::OUT
  }
}
