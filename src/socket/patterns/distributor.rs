// src/socket/patterns/distributor.rs

use crate::message::Msg;
use async_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Sends each message to every attached pipe. A pipe at its high water mark
/// misses the message rather than stalling the others.
#[derive(Debug, Default)]
pub(crate) struct Distributor {
  peers: Mutex<HashMap<u32, Sender<Msg>>>,
}

impl Distributor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_pipe(&self, pipe_id: u32, tx: Sender<Msg>) {
    if self.peers.lock().insert(pipe_id, tx).is_none() {
      tracing::trace!(pipe_id, "Distributor added pipe");
    }
  }

  pub fn remove_pipe(&self, pipe_id: u32) {
    if self.peers.lock().remove(&pipe_id).is_some() {
      tracing::trace!(pipe_id, "Distributor removed pipe");
    }
  }

  /// Returns how many peers accepted the message.
  pub fn send_to_all(&self, msg: &Msg) -> usize {
    let peers = self.peers.lock();
    let mut delivered = 0;
    for (&pipe_id, tx) in peers.iter() {
      match tx.try_send(msg.clone()) {
        Ok(()) => delivered += 1,
        Err(TrySendError::Full(_)) => {
          tracing::trace!(pipe_id, "Distributor dropped message for full pipe");
        }
        Err(TrySendError::Closed(_)) => {}
      }
    }
    delivered
  }
}
