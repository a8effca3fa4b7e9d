// demos/raw_rep_workers.rs
//
// A raw REP socket served by a pool of workers that each reply on the
// backtrace of the request they picked up, driven by a set of REQ clients.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use rand::Rng;
use rnano::{Context, Domain, Flags, Msg, Protocol, Socket};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "raw_rep_workers", about = "Raw REP worker pool demo")]
struct Args {
  /// Endpoint the raw REP socket binds to
  #[clap(long, default_value = "tcp://127.0.0.1:0")]
  bind: String,

  /// Number of worker tasks sharing the raw REP socket
  #[clap(long, short, default_value_t = 4)]
  workers: usize,

  /// Number of REQ clients
  #[clap(long, short, default_value_t = 5)]
  clients: usize,

  /// Requests sent by each client
  #[clap(long, short, default_value_t = 20)]
  requests: usize,

  /// Upper bound of the simulated work per request, in milliseconds
  #[clap(long, default_value_t = 10)]
  max_delay_ms: u64,
}

async fn worker(id: usize, rep: Arc<Socket>, max_delay_ms: u64) -> Result<usize> {
  let mut served = 0;
  loop {
    let (request, control) = match rep.recv_with_control(Flags::empty()).await {
      Ok(received) => received,
      Err(e) if e.is_fatal() => return Ok(served),
      Err(e) => return Err(e).context("worker recv"),
    };
    let delay = rand::rng().random_range(0..=max_delay_ms);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let mut reply = b"ret ".to_vec();
    reply.extend_from_slice(request.data());
    match rep.send_with_control(Msg::from_vec(reply), control, Flags::empty()).await {
      Ok(()) => served += 1,
      Err(e) if e.is_fatal() => return Ok(served),
      Err(e) => tracing::warn!(worker = id, error = %e, "Reply dropped"),
    }
  }
}

async fn client(id: usize, ctx: Context, endpoint: String, requests: usize) -> Result<()> {
  let req = ctx.socket(Domain::Sp, Protocol::Req)?;
  req.set_recv_timeout(Some(Duration::from_secs(5)))?;
  req.connect(&endpoint).await?;
  for i in 0..requests {
    let body = format!("hello {} from client {}", i, id);
    req.send(Msg::from(body.clone())).await?;
    let reply = req.recv().await.with_context(|| format!("client {} waiting for reply {}", id, i))?;
    if reply.data() != format!("ret {}", body).as_bytes() {
      bail!("client {} got a mismatched reply: {:?}", id, String::from_utf8_lossy(reply.data()));
    }
  }
  req.close().await?;
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();
  let args = Args::parse();

  let ctx = Context::new()?;
  let rep = Arc::new(ctx.socket(Domain::SpRaw, Protocol::Rep)?);
  let eid = rep.bind(&args.bind).await?;
  let endpoint = rep.endpoint(eid)?;
  tracing::info!(%endpoint, workers = args.workers, clients = args.clients, "Serving");

  let workers: Vec<_> = (0..args.workers)
    .map(|id| tokio::spawn(worker(id, rep.clone(), args.max_delay_ms)))
    .collect();

  let started = Instant::now();
  let clients: Vec<_> = (0..args.clients)
    .map(|id| tokio::spawn(client(id, ctx.clone(), endpoint.clone(), args.requests)))
    .collect();
  for handle in clients {
    handle.await??;
  }
  let elapsed = started.elapsed();

  rep.close().await?;
  for (id, handle) in workers.into_iter().enumerate() {
    let served = handle.await??;
    tracing::info!(worker = id, served, "Worker finished");
  }
  ctx.term().await;

  let total = args.clients * args.requests;
  println!("{} requests answered in {:?}", total, elapsed);
  Ok(())
}
