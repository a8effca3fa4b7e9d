// src/socket/pair_socket.rs

use crate::error::SpResult;
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::socket::core::SocketCore;
use crate::socket::patterns::LoadBalancer;
use crate::socket::{inbound_readiness, recv_fair_queued, send_load_balanced, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// One-to-one socket. A second peer is refused while the first is attached.
#[derive(Debug)]
pub(crate) struct PairSocket {
  core: Arc<SocketCore>,
  // Holds at most one pipe.
  peer: LoadBalancer,
  peer_id: Mutex<Option<u32>>,
}

impl PairSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      peer: LoadBalancer::new(),
      peer_id: Mutex::new(None),
    }
  }
}

#[async_trait]
impl ISocket for PairSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, _control: Control, flags: Flags) -> SpResult<()> {
    send_load_balanced(&self.core, &self.peer, msg, flags).await?;
    Ok(())
  }

  async fn recv(&self, flags: Flags) -> SpResult<(Msg, Control)> {
    let inbound = recv_fair_queued(&self.core, flags).await?;
    Ok((inbound.body, Control::empty()))
  }

  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool {
    let mut peer_id = self.peer_id.lock();
    if let Some(existing) = *peer_id {
      tracing::warn!(handle = self.core.handle, pipe_id, existing, "PAIR already has a peer, refusing connection");
      return false;
    }
    *peer_id = Some(pipe_id);
    self.peer.add_pipe(pipe_id, tx);
    true
  }

  fn pipe_detached(&self, pipe_id: u32) {
    let mut peer_id = self.peer_id.lock();
    if *peer_id == Some(pipe_id) {
      *peer_id = None;
      self.peer.remove_pipe(pipe_id);
    }
  }

  fn readiness(&self) -> PollEvents {
    let mut events = inbound_readiness(&self.core);
    if self.peer.has_capacity() {
      events |= PollEvents::OUT;
    }
    events
  }
}
