// tests/ipc.rs
#![cfg(unix)]

use rnano::{Msg, Protocol, SpError};
use std::path::Path;
use std::time::Duration;
mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(2);

fn socket_path(endpoint: &str) -> &Path {
  Path::new(endpoint.trim_start_matches("ipc://"))
}

#[tokio::test]
async fn test_ipc_pair_exchange() -> Result<(), SpError> {
  let ctx = common::test_context();
  let a = common::socket(&ctx, Protocol::Pair);
  let b = common::socket(&ctx, Protocol::Pair);
  let endpoint = common::unique_ipc_endpoint();

  a.bind(&endpoint).await?;
  b.connect(&endpoint).await?;

  a.send(Msg::from_static(b"over ipc")).await?;
  assert_eq!(common::recv_timeout(&b, LONG_TIMEOUT).await?.data(), b"over ipc");
  b.send(Msg::from_static(b"and back")).await?;
  assert_eq!(common::recv_timeout(&a, LONG_TIMEOUT).await?.data(), b"and back");

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_ipc_bind_replaces_stale_file_and_removes_it() -> Result<(), SpError> {
  let ctx = common::test_context();
  let endpoint = common::unique_ipc_endpoint();
  let path = socket_path(&endpoint).to_path_buf();
  std::fs::write(&path, b"stale").map_err(SpError::Transport)?;

  let pull = common::socket(&ctx, Protocol::Pull);
  let eid = pull.bind(&endpoint).await?;
  assert!(path.exists());

  let push = common::socket(&ctx, Protocol::Push);
  push.connect(&endpoint).await?;
  push.send(Msg::from_static(b"fresh")).await?;
  assert_eq!(common::recv_timeout(&pull, LONG_TIMEOUT).await?.data(), b"fresh");

  pull.shutdown(eid).await?;
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(!path.exists(), "socket file left behind at {:?}", path);

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_ipc_connect_before_bind() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  push.set_option(rnano::options::SOL_SOCKET, rnano::options::RECONNECT_IVL, 20i32)?;
  let pull = common::socket(&ctx, Protocol::Pull);
  let endpoint = common::unique_ipc_endpoint();

  push.connect(&endpoint).await?;
  tokio::time::sleep(Duration::from_millis(100)).await;
  pull.bind(&endpoint).await?;

  push.send(Msg::from_static(b"retry worked")).await?;
  assert_eq!(common::recv_timeout(&pull, LONG_TIMEOUT).await?.data(), b"retry worked");

  ctx.term().await;
  Ok(())
}
