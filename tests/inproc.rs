// tests/inproc.rs

use rnano::{Msg, Protocol, SpError};
use std::time::Duration;
mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_inproc_req_rep() -> Result<(), SpError> {
  let ctx = common::test_context();
  let rep = common::socket(&ctx, Protocol::Rep);
  let req = common::socket(&ctx, Protocol::Req);
  let endpoint = common::unique_inproc_endpoint();

  rep.bind(&endpoint).await?;
  req.connect(&endpoint).await?;

  for i in 0..3 {
    req.send(Msg::from(format!("question {}", i))).await?;
    let question = common::recv_timeout(&rep, LONG_TIMEOUT).await?;
    assert_eq!(question.data(), format!("question {}", i).as_bytes());
    rep.send(Msg::from(format!("answer {}", i))).await?;
    let answer = common::recv_timeout(&req, LONG_TIMEOUT).await?;
    assert_eq!(answer.data(), format!("answer {}", i).as_bytes());
  }

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_inproc_connect_before_bind() -> Result<(), SpError> {
  let ctx = common::test_context();
  let push = common::socket(&ctx, Protocol::Push);
  let pull = common::socket(&ctx, Protocol::Pull);
  let endpoint = common::unique_inproc_endpoint();

  push.connect(&endpoint).await?;
  tokio::time::sleep(Duration::from_millis(50)).await;
  pull.bind(&endpoint).await?;

  push.send(Msg::from_static(b"waited for binder")).await?;
  assert_eq!(common::recv_timeout(&pull, LONG_TIMEOUT).await?.data(), b"waited for binder");

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_inproc_name_is_exclusive_until_shutdown() -> Result<(), SpError> {
  let ctx = common::test_context();
  let first = common::socket(&ctx, Protocol::Pair);
  let second = common::socket(&ctx, Protocol::Pair);
  let endpoint = common::unique_inproc_endpoint();

  let eid = first.bind(&endpoint).await?;
  assert!(matches!(second.bind(&endpoint).await, Err(SpError::Bind { .. })));

  first.shutdown(eid).await?;
  second.bind(&endpoint).await?;

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_inproc_names_are_per_context() -> Result<(), SpError> {
  let ctx_a = common::test_context();
  let ctx_b = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let a = common::socket(&ctx_a, Protocol::Pair);
  let b = common::socket(&ctx_b, Protocol::Pair);
  a.bind(&endpoint).await?;
  b.bind(&endpoint).await?;

  ctx_a.term().await;
  ctx_b.term().await;
  Ok(())
}
