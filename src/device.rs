// src/device.rs

use crate::error::{DeviceSide, SpError, SpResult};
use crate::message::Flags;
use crate::socket::Socket;

/// Relays messages between two raw sockets until one of them fails.
///
/// `a` and `b` must both be raw and speak complementary protocols (e.g. raw REP
/// facing clients and raw REQ facing workers). Each direction the two patterns
/// allow is forwarded with its control header intact. The relay never returns `Ok`:
/// it ends with [`SpError::Device`] naming the socket that failed, typically with
/// `BadHandle` after a close or `Terminated` after the context is terminated.
pub async fn device(a: &Socket, b: &Socket) -> SpResult<()> {
  if !a.is_raw() || !b.is_raw() {
    return Err(SpError::InvalidState("device sockets must be raw"));
  }
  if a.protocol().peer() != b.protocol() {
    return Err(SpError::InvalidSocketType("device sockets must speak complementary protocols"));
  }
  tracing::info!(first = a.handle(), second = b.handle(), protocol = %a.protocol(), "Device started");

  let forward = relay(a, b, DeviceSide::First, DeviceSide::Second);
  let backward = relay(b, a, DeviceSide::Second, DeviceSide::First);
  let result = futures::future::try_join(forward, backward).await.map(|_| ());
  if let Err(e) = &result {
    tracing::info!(first = a.handle(), second = b.handle(), error = %e, "Device stopped");
  }
  result
}

async fn relay(from: &Socket, to: &Socket, from_side: DeviceSide, to_side: DeviceSide) -> SpResult<()> {
  if !from.protocol().can_recv() || !to.protocol().can_send() {
    return Ok(());
  }
  let fail = |side, source| SpError::Device {
    side,
    source: Box::new(source),
  };
  loop {
    let (msg, control) = match from.recv_with_control(Flags::empty()).await {
      Ok(received) => received,
      Err(SpError::Timeout) => continue,
      Err(e) => return Err(fail(from_side, e)),
    };
    match to.send_with_control(msg, control, Flags::empty()).await {
      Ok(()) => {}
      Err(SpError::Timeout) => {
        tracing::debug!(from = from.handle(), to = to.handle(), "Send timed out, dropping relayed message");
      }
      // A reply whose request was already answered or whose requester left.
      Err(SpError::ProtocolViolation(reason)) => {
        tracing::warn!(from = from.handle(), to = to.handle(), %reason, "Dropping message the target refused");
      }
      Err(e) => return Err(fail(to_side, e)),
    }
  }
}
