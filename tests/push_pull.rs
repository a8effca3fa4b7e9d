// tests/push_pull.rs

use rnano::{Flags, Msg, Protocol, SpError};
use std::collections::HashMap;
use std::time::Duration;
mod common;

const SHORT_TIMEOUT: Duration = Duration::from_millis(200);
const LONG_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_push_pull_tcp_multiple_messages() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let pull = common::socket(&ctx, Protocol::Pull);

  let endpoint = common::bind_ephemeral(&pull).await?;
  push.connect(&endpoint).await?;

  let count = 5;
  for i in 0..count {
    push.send(Msg::from(format!("Message {}", i))).await?;
  }
  for i in 0..count {
    let received = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
    assert_eq!(received.data(), format!("Message {}", i).as_bytes());
  }
  assert!(matches!(
    common::recv_timeout(&pull, SHORT_TIMEOUT).await,
    Err(SpError::Timeout)
  ));

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_push_pull_tcp_connect_before_bind() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let pull = common::socket(&ctx, Protocol::Pull);

  // Reserve a free port, release it, then connect before anyone listens there.
  let reserved = std::net::TcpListener::bind("127.0.0.1:0").map_err(SpError::Transport)?;
  let port = reserved.local_addr().map_err(SpError::Transport)?.port();
  drop(reserved);
  let endpoint = format!("tcp://127.0.0.1:{}", port);

  push.connect(&endpoint).await?;
  tokio::time::sleep(Duration::from_millis(250)).await;
  assert!(push.statistic(rnano::Statistic::ConnectErrors)? >= 1);

  pull.bind(&endpoint).await?;
  push.send(Msg::from_static(b"late binder")).await?;
  let received = common::recv_timeout(&pull, LONG_TIMEOUT).await?;
  assert_eq!(received.data(), b"late binder");

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_push_round_robins_between_pullers() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let endpoint = common::bind_ephemeral(&push).await?;

  let pulls = [common::socket(&ctx, Protocol::Pull), common::socket(&ctx, Protocol::Pull)];
  for pull in &pulls {
    pull.connect(&endpoint).await?;
  }
  common::wait_for_connections(&push, 2, LONG_TIMEOUT).await;

  for i in 0..10 {
    push.send(Msg::from(format!("job {}", i))).await?;
  }
  let mut per_puller = HashMap::new();
  for pull in &pulls {
    while let Ok(msg) = common::recv_timeout(pull, SHORT_TIMEOUT).await {
      assert!(msg.data().starts_with(b"job "));
      *per_puller.entry(pull.handle()).or_insert(0) += 1;
    }
  }
  assert_eq!(per_puller.values().sum::<i32>(), 10);
  assert_eq!(per_puller.len(), 2, "both pullers should get work: {:?}", per_puller);

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_push_without_peers_would_block() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);

  assert!(matches!(
    push.send_with_flags(Msg::from_static(b"x"), Flags::DONTWAIT).await,
    Err(SpError::WouldBlock)
  ));
  push.set_send_timeout(Some(Duration::from_millis(50)))?;
  assert!(matches!(push.send(Msg::from_static(b"x")).await, Err(SpError::Timeout)));

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_push_backpressure_at_high_water_mark() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let pull = common::socket(&ctx, Protocol::Pull);
  push.set_option(rnano::options::SOL_SOCKET, rnano::options::SNDHWM, 4i32)?;
  pull.set_option(rnano::options::SOL_SOCKET, rnano::options::RCVHWM, 4i32)?;

  let endpoint = common::bind_ephemeral(&pull).await?;
  push.connect(&endpoint).await?;
  common::wait_for_connections(&push, 1, LONG_TIMEOUT).await;

  // Large frames fill the kernel buffers, then the queues, then the sender blocks.
  let payload = vec![0u8; 256 * 1024];
  let mut sent = 0;
  loop {
    match push.send_with_flags(Msg::from_vec(payload.clone()), Flags::DONTWAIT).await {
      Ok(()) => sent += 1,
      Err(SpError::WouldBlock) => break,
      Err(e) => return Err(e),
    }
    assert!(sent < 10_000, "sender never saw backpressure");
    tokio::task::yield_now().await;
  }
  println!("PUSH blocked after {} messages", sent);

  for _ in 0..sent {
    common::recv_timeout(&pull, LONG_TIMEOUT).await?;
  }

  ctx.term().await;
  Ok(())
}
