// tests/common.rs
#![allow(dead_code)]

use rnano::{Context, Domain, Msg, Protocol, Socket, SpError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use tokio::time::timeout;

static IPC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

// Can be overridden by RUST_LOG.
fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "rnano=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    // Another test binary thread may have won the race.
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

pub fn test_context() -> Context {
  setup_tracing();
  Context::new().expect("Failed to create test context")
}

pub fn socket(ctx: &Context, protocol: Protocol) -> Socket {
  ctx.socket(Domain::Sp, protocol).expect("Failed to create socket")
}

pub fn raw_socket(ctx: &Context, protocol: Protocol) -> Socket {
  ctx.socket(Domain::SpRaw, protocol).expect("Failed to create raw socket")
}

pub fn unique_ipc_endpoint() -> String {
  let pid = std::process::id();
  let count = IPC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("ipc:///tmp/rnano_test_{}_{}", pid, count)
}

pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://rnano_test_{}_{}", pid, count)
}

/// Binds an ephemeral loopback TCP port and returns the address peers should connect to.
pub async fn bind_ephemeral(socket: &Socket) -> Result<String, SpError> {
  let eid = socket.bind("tcp://127.0.0.1:0").await?;
  socket.endpoint(eid)
}

pub async fn recv_timeout(socket: &Socket, duration: Duration) -> Result<Msg, SpError> {
  match timeout(duration, socket.recv()).await {
    Ok(result) => result,
    Err(_) => Err(SpError::Timeout),
  }
}

pub async fn send_timeout(socket: &Socket, msg: Msg, duration: Duration) -> Result<(), SpError> {
  match timeout(duration, socket.send(msg)).await {
    Ok(result) => result,
    Err(_) => Err(SpError::Timeout),
  }
}

/// Waits until `socket` reports `count` live connections.
pub async fn wait_for_connections(socket: &Socket, count: u64, within: Duration) {
  let deadline = tokio::time::Instant::now() + within;
  loop {
    let current = socket.statistic(rnano::Statistic::CurrentConnections).unwrap();
    if current >= count {
      return;
    }
    assert!(
      tokio::time::Instant::now() < deadline,
      "expected {} connections, have {}",
      count,
      current
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}
