// src/socket/patterns/load_balancer.rs

use crate::message::Msg;
use async_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Distributes messages to attached pipes in a round-robin fashion, skipping
/// pipes whose outbound queue is at its high water mark.
#[derive(Debug, Default)]
pub(crate) struct LoadBalancer {
  pipes: Mutex<VecDeque<(u32, Sender<Msg>)>>,
}

impl LoadBalancer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_pipe(&self, pipe_id: u32, tx: Sender<Msg>) {
    let mut pipes = self.pipes.lock();
    if !pipes.iter().any(|(id, _)| *id == pipe_id) {
      pipes.push_back((pipe_id, tx));
      tracing::trace!(pipe_id, "LoadBalancer added pipe");
    }
  }

  pub fn remove_pipe(&self, pipe_id: u32) {
    let mut pipes = self.pipes.lock();
    if let Some(pos) = pipes.iter().position(|(id, _)| *id == pipe_id) {
      pipes.remove(pos);
      tracing::trace!(pipe_id, "LoadBalancer removed pipe");
    }
  }

  /// Hands `msg` to the next pipe with spare capacity.
  /// Returns the chosen pipe id, or the message back if every pipe is full (or none exist).
  pub fn try_send(&self, msg: Msg) -> Result<u32, Msg> {
    let mut pipes = self.pipes.lock();
    let mut msg = msg;
    for _ in 0..pipes.len() {
      let Some((pipe_id, tx)) = pipes.pop_front() else {
        break;
      };
      match tx.try_send(msg) {
        Ok(()) => {
          pipes.push_back((pipe_id, tx));
          return Ok(pipe_id);
        }
        Err(TrySendError::Full(back)) => {
          pipes.push_back((pipe_id, tx));
          msg = back;
        }
        Err(TrySendError::Closed(back)) => {
          // Writer is gone; the detach hook will follow.
          tracing::trace!(pipe_id, "LoadBalancer skipped closed pipe");
          msg = back;
        }
      }
    }
    Err(msg)
  }

  /// True if some pipe could accept a message right now.
  pub fn has_capacity(&self) -> bool {
    self.pipes.lock().iter().any(|(_, tx)| !tx.is_closed() && !tx.is_full())
  }
}
