// src/socket/rep_socket.rs

use crate::error::{SpError, SpResult};
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::protocol::sp::backtrace;
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::patterns::{HeaderState, ReplyRouter, RouteOutcome};
use crate::socket::{inbound_readiness, recv_fair_queued, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// Responder side of request/reply and of surveys (REP and RESPONDENT share the logic).
///
/// Every received request is tagged with `pipe-id ‖ backtrace`. A cooked socket keeps
/// that header until the reply is sent; a raw socket hands it to the caller as
/// [`Control`] and tracks it as in flight until it is used.
#[derive(Debug)]
pub(crate) struct RepSocket {
  core: Arc<SocketCore>,
  router: ReplyRouter,
  /// Cooked mode: header of the request currently being answered.
  held: Mutex<Option<Bytes>>,
}

impl RepSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      router: ReplyRouter::new(),
      held: Mutex::new(None),
    }
  }

  fn route_reply(&self, pipe_id: u32, backtrace: &[u8], msg: Msg) {
    let reply = Msg::from_bytes(backtrace::prepend(backtrace, msg.data()));
    match self.router.route(pipe_id, reply) {
      RouteOutcome::Sent => {
        tracing::trace!(handle = self.core.handle, pipe_id, "Reply queued");
      }
      RouteOutcome::PipeGone => {
        tracing::debug!(handle = self.core.handle, pipe_id, "Requester is gone, dropping reply");
      }
      RouteOutcome::PipeFull => {
        tracing::debug!(handle = self.core.handle, pipe_id, "Requester pipe is full, dropping reply");
      }
    }
  }

  fn send_raw(&self, msg: Msg, control: Control) -> SpResult<()> {
    let header = control.into_bytes();
    let (pipe_id, backtrace) = backtrace::split_pipe_id(&header)
      .ok_or_else(|| SpError::ProtocolViolation("control is not a reply header".into()))?;
    match self.router.untrack(pipe_id, &header) {
      HeaderState::InFlight => {
        self.route_reply(pipe_id, &backtrace, msg);
        Ok(())
      }
      HeaderState::Retired => {
        tracing::debug!(handle = self.core.handle, pipe_id, "Dropping reply on a retired control");
        Ok(())
      }
      HeaderState::Unknown => Err(SpError::ProtocolViolation(
        "control header is not in flight (already answered or foreign)".into(),
      )),
    }
  }
}

#[async_trait]
impl ISocket for RepSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, control: Control, _flags: Flags) -> SpResult<()> {
    if self.core.is_raw() {
      return self.send_raw(msg, control);
    }
    let header = self
      .held
      .lock()
      .take()
      .ok_or(SpError::InvalidState("no request is waiting for a reply"))?;
    let (pipe_id, backtrace) = backtrace::split_pipe_id(&header)
      .ok_or_else(|| SpError::Internal("stored request header is malformed".into()))?;
    self.route_reply(pipe_id, &backtrace, msg);
    self.core.notify_activity();
    Ok(())
  }

  async fn recv(&self, flags: Flags) -> SpResult<(Msg, Control)> {
    if self.core.is_raw() {
      let inbound = recv_fair_queued(&self.core, flags).await?;
      self.router.track(inbound.pipe_id, inbound.header.clone());
      return Ok((inbound.body, Control::from_bytes(inbound.header)));
    }
    if self.held.lock().is_some() {
      return Err(SpError::InvalidState("previous request has not been answered"));
    }
    let inbound = recv_fair_queued(&self.core, flags).await?;
    *self.held.lock() = Some(inbound.header);
    Ok((inbound.body, Control::empty()))
  }

  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool {
    self.router.add_pipe(pipe_id, tx);
    true
  }

  fn pipe_detached(&self, pipe_id: u32) {
    self.router.remove_pipe(pipe_id);
  }

  fn ingress(&self, pipe_id: u32, msg: Msg) -> Option<Inbound> {
    let max_hops = self.core.options.read().maxttl as usize;
    let body = msg.into_bytes();
    match backtrace::split_backtrace(&body, max_hops) {
      Some((trace, payload)) => Some(Inbound {
        pipe_id,
        header: backtrace::prepend(&pipe_id.to_be_bytes(), &trace),
        body: Msg::from_bytes(payload),
      }),
      None => {
        tracing::debug!(handle = self.core.handle, pipe_id, "Dropping request with a malformed or too long backtrace");
        None
      }
    }
  }

  fn readiness(&self) -> PollEvents {
    if self.core.is_raw() {
      return inbound_readiness(&self.core) | PollEvents::OUT;
    }
    if self.held.lock().is_some() {
      PollEvents::OUT
    } else {
      inbound_readiness(&self.core)
    }
  }
}
