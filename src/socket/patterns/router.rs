// src/socket/patterns/router.rs

use crate::message::Msg;
use crate::protocol::sp::backtrace::WORD;
use async_channel::{Sender, TrySendError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Unanswered headers kept per connection before the oldest is retired.
pub(crate) const IN_FLIGHT_PER_PIPE: usize = 1024;
/// Retired headers remembered so that late replies to them are dropped quietly.
pub(crate) const RETIRED_CAPACITY: usize = 4096;

/// Outcome of routing a reply back towards its requester.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RouteOutcome {
  Sent,
  /// The connection the request arrived on has gone away.
  PipeGone,
  /// The connection's outbound queue is at its high water mark.
  PipeFull,
}

/// What a raw responder may do with a control header it is asked to reply along.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeaderState {
  /// Handed out by a receive and not answered yet.
  InFlight,
  /// Handed out, but its requester left or moved on. The reply is dropped.
  Retired,
  /// Never handed out by this socket, or already answered.
  Unknown,
}

#[derive(Debug, Default)]
struct HeaderBook {
  // Oldest first. A resent request appears once per receive.
  in_flight: HashMap<u32, VecDeque<Bytes>>,
  retired: VecDeque<Bytes>,
}

impl HeaderBook {
  fn retire(&mut self, header: Bytes) {
    if self.retired.len() == RETIRED_CAPACITY {
      self.retired.pop_front();
    }
    self.retired.push_back(header);
  }
}

/// Header of a request that came straight from a requester: pipe id plus the request id.
fn is_direct(header: &Bytes) -> bool {
  header.len() == 2 * WORD
}

/// Maps connection ids to their outbound queues and tracks the routing headers
/// handed out by a raw responder that have not been answered yet.
#[derive(Debug, Default)]
pub(crate) struct ReplyRouter {
  pipes: Mutex<HashMap<u32, Sender<Msg>>>,
  headers: Mutex<HeaderBook>,
}

impl ReplyRouter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_pipe(&self, pipe_id: u32, tx: Sender<Msg>) {
    self.pipes.lock().insert(pipe_id, tx);
    tracing::trace!(pipe_id, "ReplyRouter added pipe");
  }

  /// Drops the connection and retires every header that arrived on it.
  pub fn remove_pipe(&self, pipe_id: u32) {
    if self.pipes.lock().remove(&pipe_id).is_some() {
      tracing::trace!(pipe_id, "ReplyRouter removed pipe");
    }
    let mut book = self.headers.lock();
    if let Some(pending) = book.in_flight.remove(&pipe_id) {
      for header in pending {
        book.retire(header);
      }
    }
  }

  /// Records a header handed to the caller by a raw receive.
  ///
  /// A requester talking to us directly has one request outstanding, so a new
  /// request id from it retires the ids it abandoned.
  pub fn track(&self, pipe_id: u32, header: Bytes) {
    let live = self.pipes.lock().contains_key(&pipe_id);
    let mut book = self.headers.lock();
    if !live {
      book.retire(header);
      return;
    }
    let pending = book.in_flight.entry(pipe_id).or_default();
    let mut retired = Vec::new();
    if is_direct(&header) {
      pending.retain(|old| {
        let stale = is_direct(old) && *old != header;
        if stale {
          retired.push(old.clone());
        }
        !stale
      });
    }
    pending.push_back(header);
    if pending.len() > IN_FLIGHT_PER_PIPE {
      retired.extend(pending.pop_front());
    }
    for old in retired {
      book.retire(old);
    }
  }

  /// Consumes one use of `header`, which names `pipe_id` as its connection.
  pub fn untrack(&self, pipe_id: u32, header: &Bytes) -> HeaderState {
    let mut book = self.headers.lock();
    if let Some(pending) = book.in_flight.get_mut(&pipe_id) {
      if let Some(pos) = pending.iter().position(|h| h == header) {
        pending.remove(pos);
        if pending.is_empty() {
          book.in_flight.remove(&pipe_id);
        }
        return HeaderState::InFlight;
      }
    }
    match book.retired.iter().position(|h| h == header) {
      Some(pos) => {
        book.retired.remove(pos);
        HeaderState::Retired
      }
      None => HeaderState::Unknown,
    }
  }

  /// Queues `msg` on the connection `pipe_id` without blocking.
  pub fn route(&self, pipe_id: u32, msg: Msg) -> RouteOutcome {
    let pipes = self.pipes.lock();
    let Some(tx) = pipes.get(&pipe_id) else {
      return RouteOutcome::PipeGone;
    };
    match tx.try_send(msg) {
      Ok(()) => RouteOutcome::Sent,
      Err(TrySendError::Full(_)) => RouteOutcome::PipeFull,
      Err(TrySendError::Closed(_)) => RouteOutcome::PipeGone,
    }
  }

  #[cfg(test)]
  fn in_flight_len(&self) -> usize {
    self.headers.lock().in_flight.values().map(VecDeque::len).sum()
  }
}
