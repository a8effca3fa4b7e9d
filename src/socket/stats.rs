// src/socket/stats.rs

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-socket counters readable through `Socket::statistic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Statistic {
  /// Outgoing connections that completed the handshake.
  EstablishedConnections = 101,
  /// Incoming connections that completed the handshake.
  AcceptedConnections = 102,
  /// Connections rejected during the handshake or by the pattern.
  DroppedConnections = 103,
  /// Established connections that failed or were closed by the peer.
  BrokenConnections = 104,
  ConnectErrors = 105,
  BindErrors = 106,
  AcceptErrors = 107,
  CurrentConnections = 201,
  MessagesSent = 301,
  MessagesReceived = 302,
  BytesSent = 303,
  BytesReceived = 304,
}

impl Statistic {
  pub fn from_i32(value: i32) -> Option<Self> {
    use Statistic::*;
    Some(match value {
      101 => EstablishedConnections,
      102 => AcceptedConnections,
      103 => DroppedConnections,
      104 => BrokenConnections,
      105 => ConnectErrors,
      106 => BindErrors,
      107 => AcceptErrors,
      201 => CurrentConnections,
      301 => MessagesSent,
      302 => MessagesReceived,
      303 => BytesSent,
      304 => BytesReceived,
      _ => return None,
    })
  }
}

#[derive(Debug, Default)]
pub(crate) struct SocketStats {
  established: AtomicU64,
  accepted: AtomicU64,
  dropped: AtomicU64,
  broken: AtomicU64,
  connect_errors: AtomicU64,
  bind_errors: AtomicU64,
  accept_errors: AtomicU64,
  current: AtomicU64,
  messages_sent: AtomicU64,
  messages_received: AtomicU64,
  bytes_sent: AtomicU64,
  bytes_received: AtomicU64,
}

impl SocketStats {
  fn counter(&self, stat: Statistic) -> &AtomicU64 {
    match stat {
      Statistic::EstablishedConnections => &self.established,
      Statistic::AcceptedConnections => &self.accepted,
      Statistic::DroppedConnections => &self.dropped,
      Statistic::BrokenConnections => &self.broken,
      Statistic::ConnectErrors => &self.connect_errors,
      Statistic::BindErrors => &self.bind_errors,
      Statistic::AcceptErrors => &self.accept_errors,
      Statistic::CurrentConnections => &self.current,
      Statistic::MessagesSent => &self.messages_sent,
      Statistic::MessagesReceived => &self.messages_received,
      Statistic::BytesSent => &self.bytes_sent,
      Statistic::BytesReceived => &self.bytes_received,
    }
  }

  pub fn incr(&self, stat: Statistic) {
    self.counter(stat).fetch_add(1, Ordering::Relaxed);
  }

  pub fn decr(&self, stat: Statistic) {
    let _ = self
      .counter(stat)
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
  }

  pub fn get(&self, stat: Statistic) -> u64 {
    self.counter(stat).load(Ordering::Relaxed)
  }

  pub fn message_sent(&self, bytes: usize) {
    self.messages_sent.fetch_add(1, Ordering::Relaxed);
    self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
  }

  pub fn message_received(&self, bytes: usize) {
    self.messages_received.fetch_add(1, Ordering::Relaxed);
    self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_connections_never_underflow() {
    let stats = SocketStats::default();
    stats.decr(Statistic::CurrentConnections);
    assert_eq!(stats.get(Statistic::CurrentConnections), 0);
    stats.incr(Statistic::CurrentConnections);
    stats.incr(Statistic::CurrentConnections);
    stats.decr(Statistic::CurrentConnections);
    assert_eq!(stats.get(Statistic::CurrentConnections), 1);
  }

  #[test]
  fn byte_counters_accumulate() {
    let stats = SocketStats::default();
    stats.message_sent(10);
    stats.message_sent(5);
    stats.message_received(3);
    assert_eq!(stats.get(Statistic::MessagesSent), 2);
    assert_eq!(stats.get(Statistic::BytesSent), 15);
    assert_eq!(stats.get(Statistic::BytesReceived), 3);
    assert_eq!(Statistic::from_i32(201), Some(Statistic::CurrentConnections));
    assert_eq!(Statistic::from_i32(999), None);
  }
}
