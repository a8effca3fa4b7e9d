// src/socket/pull_socket.rs

use crate::error::SpResult;
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::socket::core::SocketCore;
use crate::socket::{inbound_readiness, recv_fair_queued, unsupported, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct PullSocket {
  core: Arc<SocketCore>,
}

impl PullSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self { core }
  }
}

#[async_trait]
impl ISocket for PullSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, _msg: Msg, _control: Control, _flags: Flags) -> SpResult<()> {
    Err(unsupported(self.core.protocol, "PULL sockets cannot send"))
  }

  async fn recv(&self, flags: Flags) -> SpResult<(Msg, Control)> {
    let inbound = recv_fair_queued(&self.core, flags).await?;
    Ok((inbound.body, Control::empty()))
  }

  // Outbound pipes exist only to satisfy the engine; nothing is ever queued on them.
  fn pipe_attached(&self, _pipe_id: u32, _tx: AsyncSender<Msg>) -> bool {
    true
  }

  fn pipe_detached(&self, _pipe_id: u32) {}

  fn readiness(&self) -> PollEvents {
    inbound_readiness(&self.core)
  }
}
