// src/context.rs

use crate::error::{SpError, SpResult};
use crate::socket::core::SocketCore;
use crate::socket::{self, Domain, Protocol, Socket};

#[cfg(feature = "inproc")]
use crate::transport::inproc::InprocConnection;
#[cfg(feature = "inproc")]
use async_channel::Sender as AsyncSender;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Most sockets a single context keeps open at once.
pub const MAX_SOCKETS: usize = 512;

/// State shared by every clone of a [`Context`].
pub(crate) struct ContextInner {
  next_handle: AtomicUsize,
  sockets: Mutex<HashMap<usize, Weak<SocketCore>>>,
  #[cfg(feature = "inproc")]
  inproc_registry: Mutex<HashMap<String, AsyncSender<InprocConnection>>>,
  terminated: AtomicBool,
  /// Parent of every socket token; cancelled by `term`.
  token: CancellationToken,
}

impl ContextInner {
  fn new() -> Self {
    Self {
      next_handle: AtomicUsize::new(1),
      sockets: Mutex::new(HashMap::new()),
      #[cfg(feature = "inproc")]
      inproc_registry: Mutex::new(HashMap::new()),
      terminated: AtomicBool::new(false),
      token: CancellationToken::new(),
    }
  }

  pub(crate) fn next_handle(&self) -> usize {
    self.next_handle.fetch_add(1, Ordering::Relaxed)
  }

  pub(crate) fn child_token(&self) -> CancellationToken {
    self.token.child_token()
  }

  /// Records a live socket. Fails once `MAX_SOCKETS` are open.
  fn register_socket(&self, handle: usize, core: Weak<SocketCore>) -> SpResult<()> {
    let mut sockets = self.sockets.lock();
    if sockets.len() >= MAX_SOCKETS {
      return Err(SpError::Creation(format!("too many open sockets (limit {})", MAX_SOCKETS)));
    }
    sockets.insert(handle, core);
    tracing::debug!(socket_handle = handle, open = sockets.len(), "Socket registered");
    Ok(())
  }

  pub(crate) fn unregister_socket(&self, handle: usize) {
    if self.sockets.lock().remove(&handle).is_some() {
      tracing::debug!(socket_handle = handle, "Socket unregistered");
    }
  }

  fn live_sockets(&self) -> Vec<Arc<SocketCore>> {
    self.sockets.lock().values().filter_map(Weak::upgrade).collect()
  }

  /// Claims `name` for a binder. Returns false if another socket already holds it.
  #[cfg(feature = "inproc")]
  pub(crate) fn register_inproc(&self, name: &str, binder: AsyncSender<InprocConnection>) -> bool {
    let mut registry = self.inproc_registry.lock();
    if registry.get(name).is_some_and(|existing| !existing.is_closed()) {
      return false;
    }
    tracing::debug!(inproc_name = %name, "Registering inproc binding");
    registry.insert(name.to_string(), binder);
    true
  }

  #[cfg(feature = "inproc")]
  pub(crate) fn unregister_inproc(&self, name: &str) {
    if self.inproc_registry.lock().remove(name).is_some() {
      tracing::debug!(inproc_name = %name, "Unregistered inproc binding");
    }
  }

  #[cfg(feature = "inproc")]
  pub(crate) fn lookup_inproc(&self, name: &str) -> Option<AsyncSender<InprocConnection>> {
    self.inproc_registry.lock().get(name).cloned()
  }
}

/// Owns socket handles, the in-process endpoint registry and library termination.
/// Clones share the same state.
#[derive(Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  pub fn new() -> SpResult<Self> {
    tracing::debug!("Creating new rnano Context");
    Ok(Self {
      inner: Arc::new(ContextInner::new()),
    })
  }

  /// Creates a socket speaking `protocol` in `domain`. Must be called from within a
  /// Tokio runtime, which drives the socket's connections.
  pub fn socket(&self, domain: Domain, protocol: Protocol) -> SpResult<Socket> {
    if self.is_terminated() {
      return Err(SpError::Terminated);
    }
    tokio::runtime::Handle::try_current()
      .map_err(|_| SpError::Creation("sockets must be created inside a Tokio runtime".into()))?;
    let handle = self.inner.next_handle();
    let socket = socket::create_socket(handle, self.clone(), domain, protocol)?;
    // On failure the socket drops here and releases everything it set up.
    self.inner.register_socket(handle, Arc::downgrade(socket.socket_core()))?;
    Ok(socket)
  }

  /// Creates a socket from the numeric `AF_SP`/`AF_SP_RAW` domain and protocol id.
  pub fn socket_raw(&self, domain: i32, protocol: i32) -> SpResult<Socket> {
    let domain = Domain::from_id(domain).ok_or(SpError::InvalidSocketType("unknown domain"))?;
    let protocol = Protocol::from_id(protocol).ok_or(SpError::InvalidSocketType("unknown protocol"))?;
    self.socket(domain, protocol)
  }

  /// Terminates the library for this context: blocked and future operations on every
  /// socket fail with `Terminated`, and all sockets are shut down (honouring `LINGER`).
  pub async fn term(&self) {
    if self.inner.terminated.swap(true, Ordering::AcqRel) {
      tracing::debug!("Context termination already in progress");
    }
    tracing::info!("Context termination initiated");
    self.inner.token.cancel();
    let sockets = self.inner.live_sockets();
    let count = sockets.len();
    futures::future::join_all(sockets.iter().map(|core| core.shutdown())).await;
    tracing::info!(sockets = count, "Context terminated");
  }

  pub fn is_terminated(&self) -> bool {
    self.inner.terminated.load(Ordering::Acquire)
  }

  pub(crate) fn inner(&self) -> &Arc<ContextInner> {
    &self.inner
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("open_sockets", &self.inner.sockets.lock().len())
      .field("terminated", &self.is_terminated())
      .finish_non_exhaustive()
  }
}

/// Creates a new library context.
pub fn context() -> SpResult<Context> {
  Context::new()
}
