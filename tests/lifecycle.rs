// tests/lifecycle.rs

use rnano::{Msg, Protocol, SpError, Statistic};
use std::sync::Arc;
use std::time::Duration;
mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_close_twice_is_rejected() -> Result<(), SpError> {
  let ctx = common::test_context();
  let socket = common::socket(&ctx, Protocol::Pair);
  socket.close().await?;
  assert!(matches!(socket.close().await, Err(SpError::BadHandle)));
  assert!(matches!(socket.send(Msg::from_static(b"x")).await, Err(SpError::BadHandle)));
  assert!(matches!(socket.recv().await, Err(SpError::BadHandle)));
  assert!(matches!(socket.bind("tcp://127.0.0.1:0").await, Err(SpError::BadHandle)));
  assert!(matches!(socket.statistic(Statistic::MessagesSent), Err(SpError::BadHandle)));
  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_term_unblocks_pending_recv() -> Result<(), SpError> {
  let ctx = common::test_context();
  let pull = Arc::new(common::socket(&ctx, Protocol::Pull));

  let waiter = {
    let pull = pull.clone();
    tokio::spawn(async move { pull.recv().await })
  };
  tokio::time::sleep(Duration::from_millis(50)).await;
  ctx.term().await;

  let result = tokio::time::timeout(LONG_TIMEOUT, waiter)
    .await
    .expect("recv was not unblocked by term")
    .expect("recv task panicked");
  assert!(matches!(result, Err(SpError::Terminated)));
  assert!(matches!(pull.send(Msg::from_static(b"x")).await, Err(SpError::Terminated)));
  assert!(ctx.is_terminated());
  Ok(())
}

#[tokio::test]
async fn test_close_unblocks_pending_recv_with_bad_handle() -> Result<(), SpError> {
  let ctx = common::test_context();
  let pull = Arc::new(common::socket(&ctx, Protocol::Pull));

  let waiter = {
    let pull = pull.clone();
    tokio::spawn(async move { pull.recv().await })
  };
  tokio::time::sleep(Duration::from_millis(50)).await;
  pull.close().await?;

  let result = tokio::time::timeout(LONG_TIMEOUT, waiter).await.expect("recv hung").expect("task panicked");
  assert!(matches!(result, Err(SpError::BadHandle)));
  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_socket_close_stops_connection() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let pull = common::socket(&ctx, Protocol::Pull);
  let endpoint = common::bind_ephemeral(&pull).await?;
  push.connect(&endpoint).await?;
  common::wait_for_connections(&pull, 1, LONG_TIMEOUT).await;

  push.close().await?;
  tokio::time::sleep(Duration::from_millis(200)).await;
  assert_eq!(pull.statistic(Statistic::CurrentConnections)?, 0);
  assert_eq!(pull.statistic(Statistic::BrokenConnections)?, 1);

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_dropped_socket_releases_its_endpoint() -> Result<(), SpError> {
  let ctx = common::test_context();
  let endpoint = {
    let pull = common::socket(&ctx, Protocol::Pull);
    common::bind_ephemeral(&pull).await?
  };
  tokio::time::sleep(Duration::from_millis(100)).await;

  // Listener is gone, so the port can be bound again.
  let again = common::socket(&ctx, Protocol::Pull);
  again.bind(&endpoint).await?;

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_linger_flushes_queued_messages_on_close() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let pull = common::socket(&ctx, Protocol::Pull);
  let endpoint = common::bind_ephemeral(&pull).await?;
  push.connect(&endpoint).await?;
  common::wait_for_connections(&push, 1, LONG_TIMEOUT).await;

  for i in 0..50 {
    push.send(Msg::from(format!("queued {}", i))).await?;
  }
  push.close().await?;

  for i in 0..50 {
    let msg = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
    assert_eq!(msg.data(), format!("queued {}", i).as_bytes());
  }

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_endpoint_shutdown() -> Result<(), SpError> {
  let ctx = common::test_context();
  let pull = common::socket(&ctx, Protocol::Pull);
  let eid = pull.bind("tcp://127.0.0.1:0").await?;
  let resolved = pull.endpoint(eid)?;
  assert!(resolved.starts_with("tcp://127.0.0.1:"));
  assert!(!resolved.ends_with(":0"));

  pull.shutdown(eid).await?;
  assert!(matches!(pull.endpoint(eid), Err(SpError::UnknownEndpoint(_))));
  assert!(matches!(pull.shutdown(eid).await, Err(SpError::UnknownEndpoint(_))));

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_bind_errors() -> Result<(), SpError> {
  let ctx = common::test_context();
  let first = common::socket(&ctx, Protocol::Pull);
  let second = common::socket(&ctx, Protocol::Pull);

  let endpoint = common::bind_ephemeral(&first).await?;
  assert!(matches!(second.bind(&endpoint).await, Err(SpError::Bind { .. })));
  assert_eq!(second.statistic(Statistic::BindErrors)?, 1);

  assert!(matches!(second.bind("tcp://127.0.0.1").await, Err(SpError::InvalidEndpoint(_))));
  assert!(matches!(second.bind("udp://127.0.0.1:1").await, Err(SpError::UnsupportedTransport(_))));
  assert!(matches!(
    second.connect("tcp://no-such-host.invalid:5555").await,
    Err(SpError::Connect { .. })
  ));

  ctx.term().await;
  Ok(())
}
