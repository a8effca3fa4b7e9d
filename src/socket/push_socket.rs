// src/socket/push_socket.rs

use crate::error::SpResult;
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::socket::core::SocketCore;
use crate::socket::patterns::LoadBalancer;
use crate::socket::{send_load_balanced, unsupported, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct PushSocket {
  core: Arc<SocketCore>,
  load_balancer: LoadBalancer,
}

impl PushSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      load_balancer: LoadBalancer::new(),
    }
  }
}

#[async_trait]
impl ISocket for PushSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, _control: Control, flags: Flags) -> SpResult<()> {
    let pipe_id = send_load_balanced(&self.core, &self.load_balancer, msg, flags).await?;
    tracing::trace!(handle = self.core.handle, pipe_id, "PUSH queued message");
    Ok(())
  }

  async fn recv(&self, _flags: Flags) -> SpResult<(Msg, Control)> {
    Err(unsupported(self.core.protocol, "PUSH sockets cannot receive"))
  }

  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool {
    self.load_balancer.add_pipe(pipe_id, tx);
    true
  }

  fn pipe_detached(&self, pipe_id: u32) {
    self.load_balancer.remove_pipe(pipe_id);
  }

  // PULL peers never send; anything arriving is dropped.
  fn ingress(&self, _pipe_id: u32, _msg: Msg) -> Option<crate::socket::core::Inbound> {
    None
  }

  fn readiness(&self) -> PollEvents {
    if self.load_balancer.has_capacity() {
      PollEvents::OUT
    } else {
      PollEvents::empty()
    }
  }
}
