// src/transport/tcp.rs

use crate::error::{SpError, SpResult};
use crate::socket::core::SocketCore;
use crate::socket::options::TcpTransportConfig;
use crate::transport::endpoint::bind_address;
use crate::transport::{connect_failed, Dialer, Listener};

use async_trait::async_trait;
use socket2::{Domain as SockDomain, Protocol as SockProtocol, SockRef, Socket as RawSocket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

const LISTEN_BACKLOG: i32 = 128;

#[derive(Debug)]
pub(crate) struct TcpAcceptor {
  listener: TcpListener,
  core: Arc<SocketCore>,
}

impl TcpAcceptor {
  /// Binds the listening socket. Returns it with the resolved URI (ephemeral port filled in).
  pub(crate) fn bind(core: &Arc<SocketCore>, host: &str, port: u16) -> SpResult<(Self, String)> {
    let uri = format!("tcp://{}:{}", host, port);
    let ip = bind_address(host).ok_or_else(|| SpError::InvalidEndpoint(uri.clone()))?;
    let listener = create_listener(SocketAddr::new(ip, port)).map_err(|e| SpError::bind_failed(e, &uri))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(handle = core.handle, %local_addr, uri = %uri, "TCP listener bound");
    let acceptor = Self {
      listener,
      core: core.clone(),
    };
    Ok((acceptor, format!("tcp://{}", local_addr)))
  }
}

fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
  let socket = RawSocket::new(SockDomain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;
  socket.set_reuse_address(true)?;
  socket.bind(&addr.into())?;
  socket.listen(LISTEN_BACKLOG)?;
  socket.set_nonblocking(true)?;
  TcpListener::from_std(socket.into())
}

#[async_trait]
impl Listener for TcpAcceptor {
  type Stream = TcpStream;

  async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
    let (stream, peer_addr) = self.listener.accept().await?;
    apply_tcp_socket_options(&stream, &self.core)?;
    Ok((stream, peer_addr.to_string()))
  }
}

#[derive(Debug)]
pub(crate) struct TcpDialer {
  addrs: Vec<SocketAddr>,
  core: Arc<SocketCore>,
}

impl TcpDialer {
  /// Resolves the remote host once; the connecter keeps dialling the result.
  pub(crate) async fn resolve(core: &Arc<SocketCore>, host: &str, port: u16) -> SpResult<Self> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
      .await
      .map_err(|e| connect_failed(host, port, e))?
      .collect();
    if addrs.is_empty() {
      return Err(connect_failed(host, port, "host resolved to no addresses"));
    }
    tracing::debug!(handle = core.handle, host, port, ?addrs, "Resolved TCP peer");
    Ok(Self {
      addrs,
      core: core.clone(),
    })
  }
}

#[async_trait]
impl Dialer for TcpDialer {
  type Stream = TcpStream;

  async fn dial(&self) -> io::Result<(TcpStream, String)> {
    let stream = TcpStream::connect(&self.addrs[..]).await?;
    apply_tcp_socket_options(&stream, &self.core)?;
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    Ok((stream, peer))
  }
}

/// Applies the socket's TCP options as they stand when the stream is established.
fn apply_tcp_socket_options(stream: &TcpStream, core: &SocketCore) -> io::Result<()> {
  let config = TcpTransportConfig::from(&*core.options.read());
  let socket_ref = SockRef::from(stream);
  socket_ref.set_nodelay(config.tcp_nodelay)?;
  socket_ref.set_keepalive(true)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  use crate::context::Context;
  use crate::socket::types::{Domain, Protocol};

  #[tokio::test]
  async fn listener_reports_ephemeral_port() {
    let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    assert_ne!(listener.local_addr().unwrap().port(), 0);
  }

  #[tokio::test]
  async fn nodelay_is_read_when_each_stream_is_established() {
    let ctx = Context::new().unwrap();
    let core = SocketCore::new(1, ctx.clone(), Domain::Sp, Protocol::Pair);
    let (mut acceptor, _) = TcpAcceptor::bind(&core, "127.0.0.1", 0).unwrap();
    let addr = acceptor.listener.local_addr().unwrap();
    let dialer = TcpDialer::resolve(&core, "127.0.0.1", addr.port()).await.unwrap();

    // Changed after bind and connect: the next streams pick it up.
    core.options.write().tcp_nodelay = true;
    let (dialled, _) = dialer.dial().await.unwrap();
    let (accepted, _) = acceptor.accept().await.unwrap();
    assert!(SockRef::from(&dialled).nodelay().unwrap());
    assert!(SockRef::from(&accepted).nodelay().unwrap());

    core.options.write().tcp_nodelay = false;
    let _client = TcpStream::connect(addr).await.unwrap();
    let (accepted, _) = acceptor.accept().await.unwrap();
    assert!(!SockRef::from(&accepted).nodelay().unwrap());

    ctx.term().await;
  }
}
