// src/socket/mod.rs

pub(crate) mod core;
pub mod options;
pub(crate) mod patterns;
pub(crate) mod stats;
pub mod types;

pub(crate) mod pair_socket;
pub(crate) mod pub_socket;
pub(crate) mod pull_socket;
pub(crate) mod push_socket;
pub(crate) mod rep_socket;
pub(crate) mod req_socket;
pub(crate) mod sub_socket;
pub(crate) mod surveyor_socket;

pub use stats::Statistic;
pub use types::{Domain, EndpointId, Protocol, Socket, ToBytes, AF_SP, AF_SP_RAW};

use crate::context::Context;
use crate::error::{SpError, SpResult};
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::protocol::sp::backtrace;
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::patterns::LoadBalancer;
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use std::sync::Arc;

/// Pattern logic of one socket type. Implementations embed `Arc<SocketCore>`;
/// connection tasks reach them through a weak back-reference held by the core.
#[async_trait]
pub(crate) trait ISocket: Send + Sync + 'static {
  fn core(&self) -> &Arc<SocketCore>;

  /// Sends `msg`. `control` is empty unless the caller is a raw socket that carries headers.
  async fn send(&self, msg: Msg, control: Control, flags: Flags) -> SpResult<()>;

  /// Receives the next message and, for header-carrying sockets, its routing header.
  async fn recv(&self, flags: Flags) -> SpResult<(Msg, Control)>;

  /// Applies an option at the pattern's own level (the protocol id).
  fn set_pattern_option(&self, level: i32, option: i32, _value: &[u8]) -> SpResult<()> {
    Err(SpError::InvalidOption { level, option })
  }

  fn get_pattern_option(&self, level: i32, option: i32) -> SpResult<Vec<u8>> {
    Err(SpError::InvalidOption { level, option })
  }

  /// Called when a connection completes its handshake. Returning false refuses it.
  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool;

  /// Called after a connection's pipe is removed.
  fn pipe_detached(&self, pipe_id: u32);

  /// Turns a frame read from `pipe_id` into a queued message, or drops it.
  fn ingress(&self, pipe_id: u32, msg: Msg) -> Option<Inbound> {
    Some(Inbound::plain(pipe_id, msg))
  }

  /// Which operations would currently complete without waiting.
  fn readiness(&self) -> PollEvents;
}

/// Creates the pattern implementation for `protocol` and wires it to a new core.
pub(crate) fn create_socket(handle: usize, ctx: Context, domain: Domain, protocol: Protocol) -> SpResult<Socket> {
  let core = SocketCore::new(handle, ctx, domain, protocol);
  let logic: Arc<dyn ISocket> = match protocol {
    Protocol::Pair => Arc::new(pair_socket::PairSocket::new(core.clone())),
    Protocol::Pub => Arc::new(pub_socket::PubSocket::new(core.clone())),
    Protocol::Sub => Arc::new(sub_socket::SubSocket::new(core.clone())),
    Protocol::Req => req_socket::ReqSocket::create(core.clone())?,
    Protocol::Rep | Protocol::Respondent => Arc::new(rep_socket::RepSocket::new(core.clone())),
    Protocol::Push => Arc::new(push_socket::PushSocket::new(core.clone())),
    Protocol::Pull => Arc::new(pull_socket::PullSocket::new(core.clone())),
    Protocol::Surveyor => Arc::new(surveyor_socket::SurveyorSocket::new(core.clone())),
  };
  core.set_socket_logic(Arc::downgrade(&logic));
  tracing::debug!(handle, %protocol, ?domain, "Socket created");
  Ok(Socket::new(logic))
}

// --- Helpers shared by the pattern implementations ---

/// Sends through a load balancer, waiting up to `SNDTIMEO` for a pipe with capacity.
/// Returns the pipe the message went to.
pub(crate) async fn send_load_balanced(
  core: &SocketCore,
  lb: &LoadBalancer,
  msg: Msg,
  flags: Flags,
) -> SpResult<u32> {
  let timeout = core.options.read().sndtimeo;
  let mut pending = Some(msg);
  core
    .wait_for(flags, timeout, || match pending.take() {
      Some(msg) => match lb.try_send(msg) {
        Ok(pipe_id) => Ok(Some(pipe_id)),
        Err(back) => {
          pending = Some(back);
          Ok(None)
        }
      },
      None => Err(SpError::Internal("load balanced message already consumed".into())),
    })
    .await
}

/// Pops the next inbound message, waiting up to `RCVTIMEO`.
pub(crate) async fn recv_fair_queued(core: &SocketCore, flags: Flags) -> SpResult<Inbound> {
  let timeout = core.options.read().rcvtimeo;
  core.wait_for(flags, timeout, || Ok(core.inbound.try_pop())).await
}

pub(crate) fn unsupported(protocol: Protocol, op: &'static str) -> SpError {
  tracing::trace!(%protocol, op, "Operation not supported by pattern");
  SpError::InvalidSocketType(op)
}

/// Splits the backtrace off a reply or survey response. Frames without a complete
/// backtrace within `MAXTTL` hops are dropped.
pub(crate) fn split_backtrace_ingress(core: &SocketCore, pipe_id: u32, msg: Msg) -> Option<Inbound> {
  let max_hops = core.options.read().maxttl as usize;
  let body = msg.into_bytes();
  match backtrace::split_backtrace(&body, max_hops) {
    Some((header, payload)) => Some(Inbound {
      pipe_id,
      header,
      body: Msg::from_bytes(payload),
    }),
    None => {
      tracing::debug!(handle = core.handle, pipe_id, "Dropping frame without a valid backtrace");
      None
    }
  }
}

/// IN readiness shared by every pattern that queues plain inbound messages.
pub(crate) fn inbound_readiness(core: &SocketCore) -> PollEvents {
  if core.inbound.has_items() {
    PollEvents::IN
  } else {
    PollEvents::empty()
  }
}
