// src/socket/sub_socket.rs

use crate::error::{SpError, SpResult};
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::options::{SUB_SUBSCRIBE, SUB_UNSUBSCRIBE};
use crate::socket::patterns::SubscriptionTrie;
use crate::socket::{inbound_readiness, recv_fair_queued, unsupported, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives published messages whose body starts with a subscribed prefix.
/// With no subscriptions nothing is delivered.
#[derive(Debug)]
pub(crate) struct SubSocket {
  core: Arc<SocketCore>,
  subscriptions: SubscriptionTrie,
}

impl SubSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      subscriptions: SubscriptionTrie::new(),
    }
  }
}

#[async_trait]
impl ISocket for SubSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, _msg: Msg, _control: Control, _flags: Flags) -> SpResult<()> {
    Err(unsupported(self.core.protocol, "SUB sockets cannot send"))
  }

  async fn recv(&self, flags: Flags) -> SpResult<(Msg, Control)> {
    let inbound = recv_fair_queued(&self.core, flags).await?;
    Ok((inbound.body, Control::empty()))
  }

  fn set_pattern_option(&self, level: i32, option: i32, value: &[u8]) -> SpResult<()> {
    if level != self.core.protocol.id() as i32 {
      return Err(SpError::InvalidOption { level, option });
    }
    match option {
      SUB_SUBSCRIBE => {
        self.subscriptions.subscribe(value);
        Ok(())
      }
      SUB_UNSUBSCRIBE => {
        if self.subscriptions.unsubscribe(value) {
          Ok(())
        } else {
          Err(SpError::InvalidOptionValue { level, option })
        }
      }
      _ => Err(SpError::InvalidOption { level, option }),
    }
  }

  fn pipe_attached(&self, _pipe_id: u32, _tx: AsyncSender<Msg>) -> bool {
    true
  }

  fn pipe_detached(&self, _pipe_id: u32) {}

  fn ingress(&self, pipe_id: u32, msg: Msg) -> Option<Inbound> {
    if self.subscriptions.matches(msg.data()) {
      Some(Inbound::plain(pipe_id, msg))
    } else {
      tracing::trace!(handle = self.core.handle, pipe_id, "SUB filtered out message");
      None
    }
  }

  fn readiness(&self) -> PollEvents {
    inbound_readiness(&self.core)
  }
}
