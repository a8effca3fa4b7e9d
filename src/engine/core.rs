// src/engine/core.rs

use crate::engine::SpStream;
use crate::error::{SpError, SpResult};
use crate::message::Msg;
use crate::protocol::sp::{SpCodec, SpHeader, SP_HEADER_LENGTH};
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::stats::Statistic;
use crate::socket::types::Protocol;

use async_channel::{Receiver as AsyncReceiver, Sender as AsyncSender};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

/// Peers that do not complete the protocol header exchange in time are dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionRole {
  Accepted,
  Connected,
}

/// Drives one connection from handshake to teardown.
///
/// Returns once the peer goes away, the stream fails, or `token` is cancelled. In the
/// last case queued outbound messages are flushed for up to `LINGER` first.
pub(crate) async fn run_connection<S: SpStream>(
  core: Arc<SocketCore>,
  mut stream: S,
  peer: String,
  role: ConnectionRole,
  token: CancellationToken,
) {
  let handle = core.handle;
  let handshake = tokio::select! {
    _ = token.cancelled() => return,
    result = tokio::time::timeout(HANDSHAKE_TIMEOUT, exchange_headers(&mut stream, core.protocol)) => {
      result.unwrap_or_else(|_| Err(SpError::Timeout))
    }
  };
  if let Err(e) = handshake {
    core.stats.incr(Statistic::DroppedConnections);
    tracing::warn!(handle, peer = %peer, error = %e, "Handshake failed, dropping connection");
    return;
  }

  let pipe_id = core.next_pipe_id();
  let Some(ends) = core.attach_pipe(pipe_id) else {
    core.stats.incr(Statistic::DroppedConnections);
    tracing::debug!(handle, peer = %peer, "Socket refused the connection");
    return;
  };
  core.stats.incr(match role {
    ConnectionRole::Accepted => Statistic::AcceptedConnections,
    ConnectionRole::Connected => Statistic::EstablishedConnections,
  });
  tracing::debug!(handle, pipe_id, peer = %peer, ?role, "Connection established");

  let max_size = core.options.read().rcvmaxsize;
  let (read_half, write_half) = tokio::io::split(stream);
  let reader = read_loop(&core, pipe_id, ends.inbound, FramedRead::new(read_half, SpCodec::new(max_size)));
  let writer = write_loop(&core, ends.outbound, FramedWrite::new(write_half, SpCodec::new(None)));
  tokio::pin!(reader);
  tokio::pin!(writer);

  tokio::select! {
    result = &mut reader => {
      core.detach_pipe(pipe_id);
      connection_lost(&core, pipe_id, "read", result);
    }
    result = &mut writer => {
      core.detach_pipe(pipe_id);
      connection_lost(&core, pipe_id, "write", result);
    }
    _ = token.cancelled() => {
      // Detaching closes the outbound queue; the writer then drains what is left.
      core.detach_pipe(pipe_id);
      let linger = core.options.read().linger;
      let flushed = match linger {
        Some(limit) => tokio::time::timeout(limit, &mut writer).await.ok(),
        None => Some((&mut writer).await),
      };
      match flushed {
        Some(Ok(())) => tracing::trace!(handle, pipe_id, "Outbound queue flushed"),
        Some(Err(e)) => tracing::debug!(handle, pipe_id, error = %e, "Flush on shutdown failed"),
        None => tracing::debug!(handle, pipe_id, ?linger, "Linger expired, discarding queued messages"),
      }
    }
  }
}

async fn exchange_headers<S: SpStream>(stream: &mut S, protocol: Protocol) -> SpResult<()> {
  stream.write_all(&SpHeader::new(protocol.id()).to_bytes()).await?;
  stream.flush().await?;

  let mut buf = [0u8; SP_HEADER_LENGTH];
  stream.read_exact(&mut buf).await.map_err(|e| match e.kind() {
    std::io::ErrorKind::UnexpectedEof => SpError::ConnectionClosed,
    _ => SpError::Transport(e),
  })?;
  let peer = SpHeader::decode(&buf)?;
  if peer.protocol != protocol.peer().id() {
    return Err(SpError::ProtocolViolation(format!(
      "{} socket cannot talk to peer protocol {}",
      protocol, peer.protocol
    )));
  }
  Ok(())
}

fn connection_lost(core: &SocketCore, pipe_id: u32, side: &str, result: SpResult<()>) {
  core.stats.incr(Statistic::BrokenConnections);
  match result {
    Ok(()) => tracing::debug!(handle = core.handle, pipe_id, side, "Connection closed"),
    Err(e) => tracing::warn!(handle = core.handle, pipe_id, side, error = %e, "Connection failed"),
  }
}

async fn read_loop<R>(
  core: &SocketCore,
  pipe_id: u32,
  inbound: AsyncSender<Inbound>,
  mut frames: FramedRead<R, SpCodec>,
) -> SpResult<()>
where
  R: AsyncRead + Unpin,
{
  while let Some(frame) = frames.next().await {
    let msg = frame?;
    core.stats.message_received(msg.size());
    let Some(logic) = core.socket_logic() else {
      break;
    };
    let Some(item) = logic.ingress(pipe_id, msg) else {
      continue;
    };
    drop(logic);
    // Blocks while the pipe's share of the inbound queue is at RCVHWM.
    if inbound.send(item).await.is_err() {
      break;
    }
    core.notify_activity();
  }
  Ok(())
}

async fn write_loop<W>(
  core: &SocketCore,
  outbound: AsyncReceiver<Msg>,
  mut sink: FramedWrite<W, SpCodec>,
) -> SpResult<()>
where
  W: AsyncWrite + Unpin,
{
  while let Ok(msg) = outbound.recv().await {
    // A slot in the pipe just freed up.
    core.notify_activity();
    let size = msg.size();
    sink.feed(msg).await?;
    if outbound.is_empty() {
      sink.flush().await?;
    }
    core.stats.message_sent(size);
  }
  sink.flush().await?;
  sink.get_mut().shutdown().await?;
  Ok(())
}
