// benches/req_rep_throughput.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rnano::{
  options::{RCVHWM, SNDHWM, SOL_SOCKET},
  Context, Domain, Msg, Protocol, Socket, SpError, Statistic,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout};

// --- Benchmarking Constants ---
const ROUND_TRIPS: usize = 2_000;
const PIPELINED_MESSAGES: usize = 10_000;
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);
const BENCH_HWM: i32 = 100_000;

async fn wait_connected(socket: &Socket) -> Result<(), SpError> {
  while socket.statistic(Statistic::CurrentConnections)? == 0 {
    sleep(Duration::from_millis(5)).await;
  }
  Ok(())
}

async fn setup_pair(ctx: &Context, server: Protocol, client: Protocol) -> Result<(Socket, Socket), SpError> {
  let server = ctx.socket(Domain::Sp, server)?;
  let client = ctx.socket(Domain::Sp, client)?;
  server.set_option(SOL_SOCKET, RCVHWM, BENCH_HWM)?;
  client.set_option(SOL_SOCKET, SNDHWM, BENCH_HWM)?;

  let eid = server.bind("tcp://127.0.0.1:0").await?;
  let endpoint = server.endpoint(eid)?;
  client.connect(&endpoint).await?;
  timeout(SETUP_TIMEOUT, wait_connected(&client))
    .await
    .map_err(|_| SpError::Timeout)??;
  Ok((server, client))
}

/// Lock-step REQ/REP latency: one request in flight at a time.
fn req_rep_round_trip(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let mut group = c.benchmark_group("REQ_REP_TCP_RoundTrip");

  for size in [16usize, 1024, 16384] {
    group.throughput(Throughput::Elements(ROUND_TRIPS as u64));
    group.bench_with_input(BenchmarkId::from_parameter(format!("{}B", size)), &size, |b, &msg_size| {
      b.to_async(&rt).iter_custom(|iters| async move {
        let ctx = Context::new().expect("Bench context creation failed");
        let (rep, req) = setup_pair(&ctx, Protocol::Rep, Protocol::Req)
          .await
          .expect("Bench socket setup failed");
        let rep = Arc::new(rep);

        let echo = {
          let rep = rep.clone();
          tokio::spawn(async move {
            while let Ok(msg) = rep.recv().await {
              if rep.send(msg).await.is_err() {
                break;
              }
            }
          })
        };

        let payload = vec![0u8; msg_size];
        let mut total = Duration::ZERO;
        for _ in 0..iters {
          let start = Instant::now();
          for _ in 0..ROUND_TRIPS {
            req.send(Msg::from_vec(black_box(payload.clone()))).await.expect("send failed");
            black_box(req.recv().await.expect("recv failed"));
          }
          total += start.elapsed();
        }

        ctx.term().await;
        let _ = echo.await;
        total
      });
    });
  }
  group.finish();
}

/// Pipelined PUSH/PULL throughput as a baseline for the framing path.
fn push_pull_throughput(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let mut group = c.benchmark_group("PUSH_PULL_TCP_Throughput");

  for size in [16usize, 1024, 16384] {
    group.throughput(Throughput::Bytes((PIPELINED_MESSAGES * size) as u64));
    group.bench_with_input(BenchmarkId::from_parameter(format!("{}B", size)), &size, |b, &msg_size| {
      b.to_async(&rt).iter_custom(|iters| async move {
        let ctx = Context::new().expect("Bench context creation failed");
        let (pull, push) = setup_pair(&ctx, Protocol::Pull, Protocol::Push)
          .await
          .expect("Bench socket setup failed");
        let push = Arc::new(push);

        let payload = vec![0u8; msg_size];
        let mut total = Duration::ZERO;
        for _ in 0..iters {
          let start = Instant::now();
          let sender = {
            let push = push.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
              for _ in 0..PIPELINED_MESSAGES {
                push.send(Msg::from_vec(payload.clone())).await?;
              }
              Ok::<(), SpError>(())
            })
          };
          for _ in 0..PIPELINED_MESSAGES {
            black_box(pull.recv().await.expect("recv failed").data());
          }
          sender.await.expect("Sender task panicked").expect("send failed");
          total += start.elapsed();
        }

        ctx.term().await;
        total
      });
    });
  }
  group.finish();
}

criterion_group!(benches, req_rep_round_trip, push_pull_throughput);
criterion_main!(benches);
