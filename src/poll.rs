// src/poll.rs

use crate::error::{SpError, SpResult};
use crate::socket::Socket;

use bitflags::bitflags;
use futures::future::select_all;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::time::Instant;

bitflags! {
  /// Readiness conditions a poll can wait for.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct PollEvents: i16 {
    /// A `recv` would complete without waiting.
    const IN = 1;
    /// A `send` would complete without waiting.
    const OUT = 2;
  }
}

/// One socket in a [`poll`] set. `revents` is filled in by the poll.
#[derive(Debug)]
pub struct PollItem<'a> {
  pub socket: &'a Socket,
  pub events: PollEvents,
  pub revents: PollEvents,
}

impl<'a> PollItem<'a> {
  pub fn new(socket: &'a Socket, events: PollEvents) -> Self {
    Self {
      socket,
      events,
      revents: PollEvents::empty(),
    }
  }
}

/// Waits until at least one item is ready or `timeout_ms` passes, and returns the
/// number of ready items. `0` checks once without waiting; a negative timeout waits
/// indefinitely. No message is consumed.
pub async fn poll(items: &mut [PollItem<'_>], timeout_ms: i32) -> SpResult<usize> {
  if items.is_empty() {
    return Err(SpError::InvalidState("poll set is empty"));
  }
  let deadline = u64::try_from(timeout_ms)
    .ok()
    .map(|ms| Instant::now() + Duration::from_millis(ms));
  let sockets: Vec<&Socket> = items.iter().map(|item| item.socket).collect();

  loop {
    let mut wakers: Vec<Pin<Box<Notified<'_>>>> = sockets
      .iter()
      .map(|socket| Box::pin(socket.socket_core().activity().notified()))
      .collect();
    for waker in wakers.iter_mut() {
      waker.as_mut().enable();
    }

    let ready = scan(items)?;
    if ready > 0 || timeout_ms == 0 {
      return Ok(ready);
    }
    if matches!(deadline, Some(d) if d <= Instant::now()) {
      return Ok(0);
    }
    tokio::select! {
      _ = select_all(wakers) => {}
      _ = sleep_until_opt(deadline) => return scan(items),
    }
  }
}

fn scan(items: &mut [PollItem<'_>]) -> SpResult<usize> {
  let mut ready = 0;
  for item in items.iter_mut() {
    item.socket.socket_core().check_open()?;
    item.revents = item.socket.readiness() & item.events;
    if !item.revents.is_empty() {
      ready += 1;
    }
  }
  Ok(ready)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}
