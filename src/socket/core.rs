// src/socket/core.rs

use crate::context::Context;
use crate::error::{SpError, SpResult};
use crate::message::{Flags, Msg};
use crate::socket::options::SocketOptions;
use crate::socket::patterns::FairQueue;
use crate::socket::stats::{SocketStats, Statistic};
use crate::socket::types::{Domain, EndpointId, Protocol};
use crate::socket::ISocket;
use crate::transport::{self, endpoint::parse_endpoint};

use async_channel::{Receiver as AsyncReceiver, Sender as AsyncSender};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A message as delivered by a connection's reader, after the pattern has
/// stripped any routing header from the body.
#[derive(Debug)]
pub(crate) struct Inbound {
  pub pipe_id: u32,
  pub header: Bytes,
  pub body: Msg,
}

impl Inbound {
  pub fn plain(pipe_id: u32, body: Msg) -> Self {
    Self {
      pipe_id,
      header: Bytes::new(),
      body,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointType {
  Listener,
  Connecter,
}

/// Information stored for each endpoint created by `bind` or `connect`.
#[derive(Debug)]
pub(crate) struct EndpointInfo {
  pub endpoint_type: EndpointType,
  pub endpoint_uri: String,
  /// Address actually in use (ephemeral TCP ports resolved).
  pub resolved_uri: String,
  pub token: CancellationToken,
  pub task_handle: JoinHandle<()>,
}

/// The two queue ends a connection task drives once its pipe is attached.
pub(crate) struct PipeEnds {
  pub outbound: AsyncReceiver<Msg>,
  pub inbound: AsyncSender<Inbound>,
}

/// Shared state of one socket: options, endpoints, attached pipes and the
/// inbound fair queue. Pattern logic (`ISocket`) and connection tasks both hold it.
pub(crate) struct SocketCore {
  pub(crate) handle: usize,
  pub(crate) context: Context,
  pub(crate) domain: Domain,
  pub(crate) protocol: Protocol,
  pub(crate) options: RwLock<SocketOptions>,
  pub(crate) inbound: FairQueue<Inbound>,
  pub(crate) stats: SocketStats,
  endpoints: Mutex<HashMap<EndpointId, EndpointInfo>>,
  next_endpoint_id: AtomicI32,
  pipes: Mutex<HashMap<u32, AsyncSender<Msg>>>,
  next_pipe_id: AtomicU32,
  /// Woken whenever something that may unblock a send, recv or poll happens.
  activity: Notify,
  token: CancellationToken,
  closed: AtomicBool,
  tasks: Mutex<Vec<JoinHandle<()>>>,
  socket_logic: RwLock<Option<Weak<dyn ISocket>>>,
}

impl std::fmt::Debug for SocketCore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SocketCore")
      .field("handle", &self.handle)
      .field("domain", &self.domain)
      .field("protocol", &self.protocol)
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl SocketCore {
  pub(crate) fn new(handle: usize, context: Context, domain: Domain, protocol: Protocol) -> Arc<Self> {
    let token = context.inner().child_token();
    Arc::new(Self {
      handle,
      context,
      domain,
      protocol,
      options: RwLock::new(SocketOptions::new(handle)),
      inbound: FairQueue::new(),
      stats: SocketStats::default(),
      endpoints: Mutex::new(HashMap::new()),
      next_endpoint_id: AtomicI32::new(1),
      pipes: Mutex::new(HashMap::new()),
      next_pipe_id: AtomicU32::new(rand::random::<u32>() & 0x7fff_ffff),
      activity: Notify::new(),
      token,
      closed: AtomicBool::new(false),
      tasks: Mutex::new(Vec::new()),
      socket_logic: RwLock::new(None),
    })
  }

  pub(crate) fn set_socket_logic(&self, logic: Weak<dyn ISocket>) {
    *self.socket_logic.write() = Some(logic);
  }

  pub(crate) fn socket_logic(&self) -> Option<Arc<dyn ISocket>> {
    self.socket_logic.read().as_ref().and_then(Weak::upgrade)
  }

  pub(crate) fn is_raw(&self) -> bool {
    self.domain == Domain::SpRaw
  }

  pub(crate) fn token(&self) -> &CancellationToken {
    &self.token
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Marks the socket closed. Returns false if it already was.
  pub(crate) fn mark_closed(&self) -> bool {
    !self.closed.swap(true, Ordering::AcqRel)
  }

  /// Fails with `BadHandle` after close and `Terminated` once the context is terminating.
  pub(crate) fn check_open(&self) -> SpResult<()> {
    if self.is_closed() {
      Err(SpError::BadHandle)
    } else if self.context.is_terminated() {
      Err(SpError::Terminated)
    } else {
      Ok(())
    }
  }

  fn stopped_error(&self) -> SpError {
    if self.is_closed() {
      SpError::BadHandle
    } else {
      SpError::Terminated
    }
  }

  pub(crate) fn notify_activity(&self) {
    self.activity.notify_waiters();
  }

  pub(crate) fn spawn_task(&self, task: JoinHandle<()>) {
    self.tasks.lock().push(task);
  }

  /// Repeats `attempt` until it yields a value, waking on socket activity.
  ///
  /// `DONTWAIT` turns a first `None` into `WouldBlock`; otherwise the wait is bounded by
  /// `timeout` (`None` waits forever) and ends early with `BadHandle`/`Terminated`.
  pub(crate) async fn wait_for<T, F>(&self, flags: Flags, timeout: Option<Duration>, mut attempt: F) -> SpResult<T>
  where
    F: FnMut() -> SpResult<Option<T>> + Send,
  {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
      self.check_open()?;
      let notified = self.activity.notified();
      tokio::pin!(notified);
      // Register before checking so a wakeup between the check and the await is not lost.
      notified.as_mut().enable();

      if let Some(value) = attempt()? {
        return Ok(value);
      }
      if flags.is_dontwait() {
        return Err(SpError::WouldBlock);
      }

      tokio::select! {
        _ = &mut notified => {}
        _ = self.token.cancelled() => return Err(self.stopped_error()),
        _ = sleep_until_opt(deadline) => return Err(SpError::Timeout),
      }
    }
  }

  pub(crate) fn activity(&self) -> &Notify {
    &self.activity
  }

  // --- Pipes ---

  pub(crate) fn next_pipe_id(&self) -> u32 {
    self.next_pipe_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff
  }

  /// Registers a freshly handshaken connection with the pattern. Returns `None` if the
  /// pattern refuses it (e.g. a second PAIR peer).
  pub(crate) fn attach_pipe(&self, pipe_id: u32) -> Option<PipeEnds> {
    let logic = self.socket_logic()?;
    let (sndhwm, rcvhwm) = {
      let options = self.options.read();
      (options.sndhwm, options.rcvhwm)
    };
    let (out_tx, out_rx) = async_channel::bounded(sndhwm);
    if !logic.pipe_attached(pipe_id, out_tx.clone()) {
      return None;
    }
    let in_tx = self.inbound.pipe_attached(pipe_id, rcvhwm);
    self.pipes.lock().insert(pipe_id, out_tx);
    self.stats.incr(Statistic::CurrentConnections);
    tracing::debug!(handle = self.handle, pipe_id, "Pipe attached");
    self.notify_activity();
    Some(PipeEnds {
      outbound: out_rx,
      inbound: in_tx,
    })
  }

  /// Removes a connection's pipe. Closing the outbound channel lets the writer flush
  /// whatever is still queued and then stop.
  pub(crate) fn detach_pipe(&self, pipe_id: u32) {
    let Some(tx) = self.pipes.lock().remove(&pipe_id) else {
      return;
    };
    tx.close();
    if let Some(logic) = self.socket_logic() {
      logic.pipe_detached(pipe_id);
    }
    self.stats.decr(Statistic::CurrentConnections);
    tracing::debug!(handle = self.handle, pipe_id, "Pipe detached");
    self.notify_activity();
  }

  // --- Endpoints ---

  pub(crate) async fn bind(self: &Arc<Self>, endpoint: &str) -> SpResult<EndpointId> {
    self.check_open()?;
    let parsed = parse_endpoint(endpoint)?;
    let token = self.token.child_token();
    let (resolved_uri, task_handle) = match transport::bind(self.clone(), &parsed, token.clone()).await {
      Ok(bound) => bound,
      Err(e) => {
        self.stats.incr(Statistic::BindErrors);
        tracing::warn!(handle = self.handle, uri = %endpoint, error = %e, "Bind failed");
        return Err(e);
      }
    };
    tracing::info!(handle = self.handle, uri = %endpoint, resolved = %resolved_uri, "Endpoint bound");
    Ok(self.register_endpoint(EndpointType::Listener, endpoint, resolved_uri, token, task_handle))
  }

  pub(crate) async fn connect(self: &Arc<Self>, endpoint: &str) -> SpResult<EndpointId> {
    self.check_open()?;
    let parsed = parse_endpoint(endpoint)?;
    let token = self.token.child_token();
    let (resolved_uri, task_handle) = transport::connect(self.clone(), &parsed, token.clone()).await?;
    tracing::info!(handle = self.handle, uri = %endpoint, "Connecting");
    Ok(self.register_endpoint(EndpointType::Connecter, endpoint, resolved_uri, token, task_handle))
  }

  fn register_endpoint(
    &self,
    endpoint_type: EndpointType,
    endpoint_uri: &str,
    resolved_uri: String,
    token: CancellationToken,
    task_handle: JoinHandle<()>,
  ) -> EndpointId {
    let eid = self.next_endpoint_id.fetch_add(1, Ordering::Relaxed);
    self.endpoints.lock().insert(
      eid,
      EndpointInfo {
        endpoint_type,
        endpoint_uri: endpoint_uri.to_string(),
        resolved_uri,
        token,
        task_handle,
      },
    );
    eid
  }

  pub(crate) fn endpoint_uri(&self, eid: EndpointId) -> SpResult<String> {
    self
      .endpoints
      .lock()
      .get(&eid)
      .map(|info| info.resolved_uri.clone())
      .ok_or(SpError::UnknownEndpoint(eid))
  }

  /// Removes one endpoint and waits for its connections to flush and stop.
  pub(crate) async fn shutdown_endpoint(&self, eid: EndpointId) -> SpResult<()> {
    let info = self.endpoints.lock().remove(&eid).ok_or(SpError::UnknownEndpoint(eid))?;
    tracing::info!(handle = self.handle, uri = %info.endpoint_uri, kind = ?info.endpoint_type, "Shutting down endpoint");
    info.token.cancel();
    if let Err(e) = info.task_handle.await {
      tracing::error!(handle = self.handle, uri = %info.endpoint_uri, error = %e, "Endpoint task panicked");
    }
    Ok(())
  }

  /// Stops every endpoint and background task. Connections get up to `LINGER`
  /// to flush before this returns.
  pub(crate) async fn shutdown(&self) {
    self.token.cancel();
    self.notify_activity();
    let endpoints: Vec<EndpointInfo> = self.endpoints.lock().drain().map(|(_, info)| info).collect();
    let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
    let handles = endpoints.into_iter().map(|info| info.task_handle).chain(tasks);
    for result in futures::future::join_all(handles).await {
      if let Err(e) = result {
        tracing::error!(handle = self.handle, error = %e, "Socket task panicked during shutdown");
      }
    }
    self.inbound.close();
    self.context.inner().unregister_socket(self.handle);
    tracing::info!(handle = self.handle, "Socket shut down");
  }

  /// Synchronous part of shutdown, used when a socket is dropped without `close()`.
  pub(crate) fn abandon(&self) {
    self.token.cancel();
    self.inbound.close();
    self.context.inner().unregister_socket(self.handle);
  }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}
