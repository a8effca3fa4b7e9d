// src/socket/types.rs

use crate::error::{SpError, SpResult};
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::socket::core::SocketCore;
use crate::socket::options::{
  self, duration_ms_to_bytes, parse_duration_ms_option, SOL_SOCKET, TCP_LEVEL,
};
use crate::socket::stats::Statistic;
use crate::socket::ISocket;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifies one endpoint created by `bind` or `connect` on a socket.
pub type EndpointId = i32;

/// Standard scalability-protocol domain.
pub const AF_SP: i32 = 1;
/// Raw domain: routing headers are exposed to the caller.
pub const AF_SP_RAW: i32 = 2;

/// Whether a socket runs the full protocol state machine or exposes routing headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
  /// "Cooked" sockets: the library manages request ids and reply routing.
  Sp,
  /// Raw sockets: `recv_with_control` / `send_with_control` carry the routing header.
  /// Required for devices and for sharing one responder between concurrent workers.
  SpRaw,
}

impl Domain {
  pub fn id(&self) -> i32 {
    match self {
      Domain::Sp => AF_SP,
      Domain::SpRaw => AF_SP_RAW,
    }
  }

  pub fn from_id(id: i32) -> Option<Self> {
    match id {
      AF_SP => Some(Domain::Sp),
      AF_SP_RAW => Some(Domain::SpRaw),
      _ => None,
    }
  }
}

/// The messaging pattern a socket implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
  /// One-to-one bidirectional messaging.
  Pair,
  /// Publish messages to subscribers.
  Pub,
  /// Receive published messages matching a subscription.
  Sub,
  /// Send requests and receive replies.
  Req,
  /// Receive requests and send replies.
  Rep,
  /// Distribute messages round-robin to a pool of pullers (pipeline).
  Push,
  /// Collect messages from pushers (pipeline).
  Pull,
  /// Broadcast a survey and collect responses until a deadline.
  Surveyor,
  /// Answer surveys.
  Respondent,
}

impl Protocol {
  /// Protocol id carried in the connection header.
  pub const fn id(&self) -> u16 {
    match self {
      Protocol::Pair => 16,
      Protocol::Pub => 32,
      Protocol::Sub => 33,
      Protocol::Req => 48,
      Protocol::Rep => 49,
      Protocol::Push => 80,
      Protocol::Pull => 81,
      Protocol::Surveyor => 98,
      Protocol::Respondent => 99,
    }
  }

  pub fn from_id(id: i32) -> Option<Self> {
    Some(match id {
      16 => Protocol::Pair,
      32 => Protocol::Pub,
      33 => Protocol::Sub,
      48 => Protocol::Req,
      49 => Protocol::Rep,
      80 => Protocol::Push,
      81 => Protocol::Pull,
      98 => Protocol::Surveyor,
      99 => Protocol::Respondent,
      _ => return None,
    })
  }

  /// The only protocol a socket of this type will talk to.
  pub fn peer(&self) -> Protocol {
    match self {
      Protocol::Pair => Protocol::Pair,
      Protocol::Pub => Protocol::Sub,
      Protocol::Sub => Protocol::Pub,
      Protocol::Req => Protocol::Rep,
      Protocol::Rep => Protocol::Req,
      Protocol::Push => Protocol::Pull,
      Protocol::Pull => Protocol::Push,
      Protocol::Surveyor => Protocol::Respondent,
      Protocol::Respondent => Protocol::Surveyor,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Protocol::Pair => "PAIR",
      Protocol::Pub => "PUB",
      Protocol::Sub => "SUB",
      Protocol::Req => "REQ",
      Protocol::Rep => "REP",
      Protocol::Push => "PUSH",
      Protocol::Pull => "PULL",
      Protocol::Surveyor => "SURVEYOR",
      Protocol::Respondent => "RESPONDENT",
    }
  }

  pub fn can_send(&self) -> bool {
    !matches!(self, Protocol::Sub | Protocol::Pull)
  }

  pub fn can_recv(&self) -> bool {
    !matches!(self, Protocol::Pub | Protocol::Push)
  }

  /// True for the request/reply and survey patterns, whose raw sockets expose a routing header.
  pub fn carries_header(&self) -> bool {
    matches!(
      self,
      Protocol::Req | Protocol::Rep | Protocol::Surveyor | Protocol::Respondent
    )
  }
}

impl fmt::Display for Protocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// An exclusively owned scalability-protocol socket.
///
/// Sockets are not `Clone`. To use one from several tasks (for example a raw REP
/// socket shared by workers) wrap it in an `Arc`. Cooked sockets assume a single
/// reader and a single writer: a cooked REP shared between workers will pair replies
/// with whichever request was received last.
pub struct Socket {
  inner: Arc<dyn ISocket>,
}

impl Socket {
  pub(crate) fn new(socket_impl: Arc<dyn ISocket>) -> Self {
    Self { inner: socket_impl }
  }

  fn core(&self) -> &Arc<SocketCore> {
    self.inner.core()
  }

  /// Handle assigned by the context; also the default `SOCKET_NAME`.
  pub fn handle(&self) -> usize {
    self.core().handle
  }

  pub fn domain(&self) -> Domain {
    self.core().domain
  }

  pub fn protocol(&self) -> Protocol {
    self.core().protocol
  }

  pub fn is_raw(&self) -> bool {
    self.core().is_raw()
  }

  fn exposes_header(&self) -> bool {
    self.is_raw() && self.protocol().carries_header()
  }

  // --- Endpoints ---

  /// Starts listening on a local endpoint. On failure nothing is left registered.
  pub async fn bind(&self, endpoint: &str) -> SpResult<EndpointId> {
    self.core().bind(endpoint).await
  }

  /// Connects to a remote endpoint. The connection is (re)established in the
  /// background, so connecting before the peer binds is fine.
  pub async fn connect(&self, endpoint: &str) -> SpResult<EndpointId> {
    self.core().connect(endpoint).await
  }

  /// Removes an endpoint, closing the connections that belong to it.
  pub async fn shutdown(&self, endpoint_id: EndpointId) -> SpResult<()> {
    self.core().check_open()?;
    self.core().shutdown_endpoint(endpoint_id).await
  }

  /// Address an endpoint is actually using, e.g. `tcp://127.0.0.1:41234` after binding port 0.
  pub fn endpoint(&self, endpoint_id: EndpointId) -> SpResult<String> {
    self.core().check_open()?;
    self.core().endpoint_uri(endpoint_id)
  }

  // --- Messaging ---

  pub async fn send(&self, msg: Msg) -> SpResult<()> {
    self.send_with_flags(msg, Flags::empty()).await
  }

  /// Sends according to the socket's pattern. Blocks for at most `SNDTIMEO` unless
  /// `Flags::DONTWAIT` is given, in which case a full socket yields `WouldBlock`.
  pub async fn send_with_flags(&self, msg: Msg, flags: Flags) -> SpResult<()> {
    self.core().check_open()?;
    if self.exposes_header() {
      return Err(SpError::ProtocolViolation(format!(
        "raw {} sockets must send with a control header",
        self.protocol()
      )));
    }
    self.inner.send(msg, Control::empty(), flags).await
  }

  pub async fn recv(&self) -> SpResult<Msg> {
    self.recv_with_flags(Flags::empty()).await
  }

  /// Receives according to the socket's pattern, waiting at most `RCVTIMEO`.
  pub async fn recv_with_flags(&self, flags: Flags) -> SpResult<Msg> {
    self.core().check_open()?;
    if self.exposes_header() {
      return Err(SpError::ProtocolViolation(format!(
        "raw {} sockets must receive with a control header",
        self.protocol()
      )));
    }
    let (msg, _) = self.inner.recv(flags).await?;
    Ok(msg)
  }

  /// Sends a reply (or request, or survey) along the routing header in `control`.
  ///
  /// On sockets that carry no header the control must be empty.
  pub async fn send_with_control(&self, msg: Msg, control: Control, flags: Flags) -> SpResult<()> {
    self.core().check_open()?;
    if !self.exposes_header() && !control.is_empty() {
      return Err(SpError::InvalidState("socket does not carry routing headers"));
    }
    self.inner.send(msg, control, flags).await
  }

  /// Receives a message together with its routing header. Sockets that carry no
  /// header return an empty control.
  pub async fn recv_with_control(&self, flags: Flags) -> SpResult<(Msg, Control)> {
    self.core().check_open()?;
    let (msg, control) = self.inner.recv(flags).await?;
    if self.exposes_header() {
      Ok((msg, control))
    } else {
      Ok((msg, Control::empty()))
    }
  }

  // --- Options ---

  pub fn set_option<T: ToBytes>(&self, level: i32, option: i32, value: T) -> SpResult<()> {
    self.set_option_raw(level, option, &value.to_bytes())
  }

  pub fn set_option_raw(&self, level: i32, option: i32, value: &[u8]) -> SpResult<()> {
    let core = self.core();
    core.check_open()?;
    match level {
      SOL_SOCKET | TCP_LEVEL => core.options.write().apply(level, option, value)?,
      _ => self.inner.set_pattern_option(level, option, value)?,
    }
    tracing::debug!(handle = core.handle, level, option, "Socket option set");
    core.notify_activity();
    Ok(())
  }

  pub fn get_option(&self, level: i32, option: i32) -> SpResult<Vec<u8>> {
    let core = self.core();
    core.check_open()?;
    match (level, option) {
      (SOL_SOCKET, options::DOMAIN) => Ok(self.domain().id().to_ne_bytes().to_vec()),
      (SOL_SOCKET, options::PROTOCOL) => Ok((self.protocol().id() as i32).to_ne_bytes().to_vec()),
      (SOL_SOCKET, _) | (TCP_LEVEL, _) => core.options.read().get(level, option),
      _ => self.inner.get_pattern_option(level, option),
    }
  }

  fn get_i32_option(&self, level: i32, option: i32) -> SpResult<i32> {
    let bytes = self.get_option(level, option)?;
    options::parse_i32_option(&bytes).map_err(|_| SpError::Internal("option is not an integer".into()))
  }

  fn get_duration_option(&self, level: i32, option: i32) -> SpResult<Option<Duration>> {
    let bytes = self.get_option(level, option)?;
    parse_duration_ms_option(&bytes).map_err(|_| SpError::Internal("option is not a duration".into()))
  }

  pub fn tcp_nodelay(&self) -> SpResult<bool> {
    Ok(self.get_i32_option(TCP_LEVEL, options::TCP_NODELAY)? != 0)
  }

  pub fn set_tcp_nodelay(&self, nodelay: bool) -> SpResult<()> {
    self.set_option(TCP_LEVEL, options::TCP_NODELAY, nodelay)
  }

  /// REQ only: how long to wait for a reply before resending the request.
  pub fn resend_interval(&self) -> SpResult<Duration> {
    let level = Protocol::Req.id() as i32;
    Ok(self.get_duration_option(level, options::REQ_RESEND_IVL)?.unwrap_or_default())
  }

  pub fn set_resend_interval(&self, interval: Duration) -> SpResult<()> {
    self.set_option(Protocol::Req.id() as i32, options::REQ_RESEND_IVL, interval)
  }

  /// SUB only: receive messages whose body starts with `topic`. An empty topic matches all.
  pub fn subscribe(&self, topic: &[u8]) -> SpResult<()> {
    self.set_option_raw(Protocol::Sub.id() as i32, options::SUB_SUBSCRIBE, topic)
  }

  pub fn unsubscribe(&self, topic: &[u8]) -> SpResult<()> {
    self.set_option_raw(Protocol::Sub.id() as i32, options::SUB_UNSUBSCRIBE, topic)
  }

  /// `None` waits until every queued message is flushed.
  pub fn linger(&self) -> SpResult<Option<Duration>> {
    self.get_duration_option(SOL_SOCKET, options::LINGER)
  }

  pub fn set_linger(&self, linger: Option<Duration>) -> SpResult<()> {
    self.set_option_raw(SOL_SOCKET, options::LINGER, &duration_ms_to_bytes(linger))
  }

  /// `None` blocks indefinitely.
  pub fn recv_timeout(&self) -> SpResult<Option<Duration>> {
    self.get_duration_option(SOL_SOCKET, options::RCVTIMEO)
  }

  pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> SpResult<()> {
    self.set_option_raw(SOL_SOCKET, options::RCVTIMEO, &duration_ms_to_bytes(timeout))
  }

  pub fn send_timeout(&self) -> SpResult<Option<Duration>> {
    self.get_duration_option(SOL_SOCKET, options::SNDTIMEO)
  }

  pub fn set_send_timeout(&self, timeout: Option<Duration>) -> SpResult<()> {
    self.set_option_raw(SOL_SOCKET, options::SNDTIMEO, &duration_ms_to_bytes(timeout))
  }

  /// SURVEYOR only: how long responses to a survey are collected.
  pub fn surveyor_deadline(&self) -> SpResult<Duration> {
    let level = Protocol::Surveyor.id() as i32;
    Ok(self.get_duration_option(level, options::SURVEYOR_DEADLINE)?.unwrap_or_default())
  }

  pub fn set_surveyor_deadline(&self, deadline: Duration) -> SpResult<()> {
    self.set_option(Protocol::Surveyor.id() as i32, options::SURVEYOR_DEADLINE, deadline)
  }

  // --- Introspection ---

  pub fn statistic(&self, stat: Statistic) -> SpResult<u64> {
    self.core().check_open()?;
    Ok(self.core().stats.get(stat))
  }

  pub(crate) fn readiness(&self) -> PollEvents {
    self.inner.readiness()
  }

  pub(crate) fn socket_core(&self) -> &Arc<SocketCore> {
    self.core()
  }

  /// Waits up to `timeout_ms` for any of `events` to become ready on this socket.
  /// See [`crate::poll`].
  pub async fn poll_events(&self, events: PollEvents, timeout_ms: i32) -> SpResult<PollEvents> {
    let mut items = [crate::poll::PollItem::new(self, events)];
    crate::poll::poll(&mut items, timeout_ms).await?;
    Ok(items[0].revents)
  }

  /// Closes every endpoint and connection, giving queued messages up to `LINGER` to
  /// flush. Closing twice fails with `BadHandle`.
  pub async fn close(&self) -> SpResult<()> {
    let core = self.core();
    if !core.mark_closed() {
      return Err(SpError::BadHandle);
    }
    tracing::info!(handle = core.handle, protocol = %core.protocol, "Closing socket");
    core.shutdown().await;
    Ok(())
  }
}

impl Drop for Socket {
  fn drop(&mut self) {
    let core = self.core();
    if core.mark_closed() {
      tracing::debug!(handle = core.handle, "Socket dropped without close, shutting down in background");
      core.abandon();
    }
  }
}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket")
      .field("handle", &self.handle())
      .field("domain", &self.domain())
      .field("protocol", &self.protocol())
      .finish_non_exhaustive()
  }
}

static_assertions::assert_impl_all!(Socket: Send, Sync);
static_assertions::assert_not_impl_any!(Socket: Clone);

/// Values accepted by [`Socket::set_option`], encoded the way options travel on the raw API.
pub trait ToBytes {
  fn to_bytes(&self) -> Vec<u8>;
}

impl ToBytes for Vec<u8> {
  fn to_bytes(&self) -> Vec<u8> {
    self.clone()
  }
}

impl ToBytes for &[u8] {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_vec()
  }
}

impl<const N: usize> ToBytes for &[u8; N] {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_vec()
  }
}

impl ToBytes for i32 {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_ne_bytes().to_vec()
  }
}

impl ToBytes for bool {
  fn to_bytes(&self) -> Vec<u8> {
    (*self as i32).to_ne_bytes().to_vec()
  }
}

/// Durations are sent as whole milliseconds, saturating at `i32::MAX`.
impl ToBytes for Duration {
  fn to_bytes(&self) -> Vec<u8> {
    duration_ms_to_bytes(Some(*self))
  }
}

impl ToBytes for &str {
  fn to_bytes(&self) -> Vec<u8> {
    self.as_bytes().to_vec()
  }
}

impl ToBytes for String {
  fn to_bytes(&self) -> Vec<u8> {
    self.as_bytes().to_vec()
  }
}
