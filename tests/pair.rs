// tests/pair.rs

use rnano::{Msg, Protocol, SpError, Statistic};
use std::time::Duration;
mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pair_round_trip_sizes() -> Result<(), SpError> {
  let ctx = common::test_context();
  let a = common::socket(&ctx, Protocol::Pair);
  let b = common::socket(&ctx, Protocol::Pair);

  let endpoint = common::bind_ephemeral(&a).await?;
  b.connect(&endpoint).await?;
  common::wait_for_connections(&a, 1, LONG_TIMEOUT).await;

  for size in [0usize, 1, 255, 256, 4096, 65_535, 65_536, 1 << 20] {
    let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    b.send(Msg::from_vec(payload.clone())).await?;
    let echoed = common::recv_timeout(&a, LONG_TIMEOUT).await?;
    assert_eq!(echoed.size(), size);
    assert_eq!(echoed.data(), payload.as_slice());

    a.send(echoed).await?;
    let back = common::recv_timeout(&b, LONG_TIMEOUT).await?;
    assert_eq!(back.data(), payload.as_slice());
    println!("PAIR round trip of {} bytes ok", size);
  }

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_pair_refuses_second_peer() -> Result<(), SpError> {
  let ctx = common::test_context();
  let a = common::socket(&ctx, Protocol::Pair);
  let b = common::socket(&ctx, Protocol::Pair);
  let c = common::socket(&ctx, Protocol::Pair);

  let endpoint = common::bind_ephemeral(&a).await?;
  b.connect(&endpoint).await?;
  common::wait_for_connections(&a, 1, LONG_TIMEOUT).await;
  c.connect(&endpoint).await?;
  tokio::time::sleep(Duration::from_millis(300)).await;

  assert_eq!(a.statistic(Statistic::CurrentConnections)?, 1);
  assert!(a.statistic(Statistic::DroppedConnections)? >= 1);

  b.send(Msg::from_static(b"first peer")).await?;
  assert_eq!(common::recv_timeout(&a, LONG_TIMEOUT).await?.data(), b"first peer");

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_pair_oversized_message_drops_connection() -> Result<(), SpError> {
  let ctx = common::test_context();
  let a = common::socket(&ctx, Protocol::Pair);
  let b = common::socket(&ctx, Protocol::Pair);
  a.set_option(rnano::options::SOL_SOCKET, rnano::options::RCVMAXSIZE, 1024i32)?;

  let endpoint = common::bind_ephemeral(&a).await?;
  b.connect(&endpoint).await?;
  common::wait_for_connections(&a, 1, LONG_TIMEOUT).await;

  b.send(Msg::from_vec(vec![7u8; 2048])).await?;
  let result = common::recv_timeout(&a, Duration::from_millis(300)).await;
  assert!(matches!(result, Err(SpError::Timeout)));
  assert!(a.statistic(Statistic::BrokenConnections)? >= 1);

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_pair_rejects_mismatched_protocol() -> Result<(), SpError> {
  let ctx = common::test_context();
  let pair = common::socket(&ctx, Protocol::Pair);
  let push = common::socket(&ctx, Protocol::Push);

  let endpoint = common::bind_ephemeral(&pair).await?;
  push.connect(&endpoint).await?;
  tokio::time::sleep(Duration::from_millis(300)).await;

  assert_eq!(pair.statistic(Statistic::CurrentConnections)?, 0);
  assert!(pair.statistic(Statistic::DroppedConnections)? >= 1);

  ctx.term().await;
  Ok(())
}
