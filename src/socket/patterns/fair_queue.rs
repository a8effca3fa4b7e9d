// src/socket/patterns/fair_queue.rs

use async_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Round-robins reads across one bounded inbound channel per connection.
///
/// Each connection's reader task owns the `Sender` half; a full channel suspends
/// that reader, which in turn stops reading from the stream. A channel that is
/// closed and drained is pruned on the next pop.
#[derive(Debug)]
pub(crate) struct FairQueue<T: Send + 'static> {
  pipes: Mutex<VecDeque<(u32, Receiver<T>)>>,
}

impl<T: Send + 'static> Default for FairQueue<T> {
  fn default() -> Self {
    Self {
      pipes: Mutex::new(VecDeque::new()),
    }
  }
}

impl<T: Send + 'static> FairQueue<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a new connection and returns the sender its reader pushes into.
  pub fn pipe_attached(&self, pipe_id: u32, capacity: usize) -> Sender<T> {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    self.pipes.lock().push_back((pipe_id, rx));
    tracing::trace!(pipe_id, hwm = capacity, "FairQueue pipe attached");
    tx
  }

  /// Pops the next item, visiting connections in turn.
  pub fn try_pop(&self) -> Option<T> {
    let mut pipes = self.pipes.lock();
    for _ in 0..pipes.len() {
      let Some((pipe_id, rx)) = pipes.pop_front() else {
        break;
      };
      match rx.try_recv() {
        Ok(item) => {
          pipes.push_back((pipe_id, rx));
          return Some(item);
        }
        Err(TryRecvError::Empty) => pipes.push_back((pipe_id, rx)),
        Err(TryRecvError::Closed) => {
          tracing::trace!(pipe_id, "FairQueue pipe drained and removed");
        }
      }
    }
    None
  }

  /// True if a pop would currently return an item.
  pub fn has_items(&self) -> bool {
    self.pipes.lock().iter().any(|(_, rx)| !rx.is_empty())
  }

  /// Closes every inbound channel, releasing readers blocked on a full queue.
  pub fn close(&self) {
    for (_, rx) in self.pipes.lock().drain(..) {
      rx.close();
    }
  }
}
